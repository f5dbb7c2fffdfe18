use crate::{
    api::responses::ErrorResponse,
    upload::{PART_REQUEST_TIMEOUT, PartError, PartUploader},
};
use bytes::Bytes;
use quick_xml::de::from_str;
use reqwest::{
    Client, Response,
    header::{ETAG, HeaderMap, HeaderName, HeaderValue},
};
use std::collections::BTreeMap;

/// PUTs parts straight to object storage through presigned URLs
#[derive(Debug, Clone, Default)]
pub struct StorageClient {
    client: Client,
}

impl StorageClient {
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

/// # Errors
///
/// Will return `Err` if a name or a value is not a valid HTTP header
pub fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, PartError> {
    let mut map = HeaderMap::with_capacity(headers.len());

    for (k, v) in headers {
        let name = k.parse::<HeaderName>().map_err(|e| PartError::Header {
            name: k.to_string(),
            reason: e.to_string(),
        })?;
        let value = v.parse::<HeaderValue>().map_err(|e| PartError::Header {
            name: k.to_string(),
            reason: e.to_string(),
        })?;

        // names are case insensitive, the last spelling wins
        map.insert(name, value);
    }

    Ok(map)
}

/// Status and error document of a failed storage request
pub async fn response_error(response: Response) -> PartError {
    let status = response.status();

    let body = response.text().await.unwrap_or_default();

    let message = match from_str::<ErrorResponse>(&body) {
        Ok(e) if !e.code.is_empty() => format!("{}: {}", e.code, e.message),
        _ => body,
    };

    PartError::Status { status, message }
}

impl PartUploader for StorageClient {
    async fn put_part(
        &self,
        url: &str,
        body: Bytes,
        headers: &BTreeMap<String, String>,
    ) -> Result<Option<String>, PartError> {
        let headers = header_map(headers)?;

        let response = self
            .client
            .put(url)
            .headers(headers)
            .timeout(PART_REQUEST_TIMEOUT)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(response_error(response).await);
        }

        Ok(response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string))
    }
}

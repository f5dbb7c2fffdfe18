//! Client of the coordinating API, it hands out presigned URLs and commits
//! or aborts uploads, and of the object storage the URLs point to.

pub mod request;
pub mod responses;
pub mod storage;

pub use self::{
    responses::{MultipartTicket, SingleTicket, UploadTicket},
    storage::StorageClient,
};

use crate::upload::{Completion, CompletionGateway, PartResult};
use anyhow::{Context, Result};
use base64ct::{Base64, Encoding};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;

/// Retries of every API call, on top of the first attempt
pub const API_RETRIES: u32 = 3;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const COMPLETE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct ApiClient {
    base_url: String,
    client: Client,
    token: Option<SecretString>,
    retries: u32,
    backoff_unit: Duration,
}

/// Metadata of the file to upload
#[derive(Debug, Clone, Copy)]
pub struct NewUpload<'a> {
    pub filename: &'a str,
    pub file_size: u64,
    pub bucket_code: &'a str,
    pub content_type: &'a str,
    pub note: &'a str,
}

#[derive(Serialize)]
struct InitiateRequest<'a> {
    filename: &'a str,
    file_size: u64,
    bucket_code: &'a str,
    content_type: &'a str,
    note: String,
    token: Option<&'a str>,
}

#[derive(Serialize)]
struct CompleteRequest<'a> {
    completion_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parts: Option<&'a [PartResult]>,
    token: Option<&'a str>,
}

#[derive(Serialize)]
struct AbortRequest<'a> {
    completion_token: &'a str,
}

impl ApiClient {
    #[must_use]
    pub fn new(base_url: &str, client: Client, token: Option<SecretString>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            token,
            retries: API_RETRIES,
            backoff_unit: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff_unit: Duration) -> Self {
        self.backoff_unit = backoff_unit;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.expose_secret())
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{action}/", self.base_url)
    }

    async fn post<T: Serialize>(
        &self,
        action: &str,
        payload: &T,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let url = self.endpoint(action);

        log::debug!("POST {url}");

        let response = request::post_json(
            &self.client,
            &url,
            payload,
            timeout,
            self.retries,
            self.backoff_unit,
        )
        .await?;

        request::check_status(response).await
    }

    /// Ask the API where and how to upload a file
    ///
    /// # Errors
    ///
    /// Will return `Err` if the API refuses the upload or answers with an
    /// unknown ticket
    pub async fn initiate_upload(&self, upload: &NewUpload<'_>) -> Result<UploadTicket> {
        let payload = InitiateRequest {
            filename: upload.filename,
            file_size: upload.file_size,
            bucket_code: upload.bucket_code,
            content_type: upload.content_type,
            note: Base64::encode_string(upload.note.as_bytes()),
            token: self.token(),
        };

        let response = self
            .post("initiate-upload", &payload, REQUEST_TIMEOUT)
            .await
            .context("Failed to initiate upload")?;

        let body = response.bytes().await?;

        serde_json::from_slice(&body).context("Failed to parse the upload ticket")
    }

    /// # Errors
    ///
    /// Will return `Err` if the API does not commit the parts
    pub async fn complete_multipart_upload(
        &self,
        completion_token: &str,
        parts: &[PartResult],
    ) -> Result<Completion> {
        let payload = CompleteRequest {
            completion_token,
            parts: Some(parts),
            token: self.token(),
        };

        let response = self
            .post("complete-multipart-upload", &payload, COMPLETE_TIMEOUT)
            .await
            .context("Failed to complete multipart upload")?;

        Ok(serde_json::from_slice(&response.bytes().await?)?)
    }

    /// # Errors
    ///
    /// Will return `Err` if the API could not be told to discard the upload
    pub async fn abort_multipart_upload(&self, completion_token: &str) -> Result<()> {
        self.post(
            "abort-multipart-upload",
            &AbortRequest { completion_token },
            REQUEST_TIMEOUT,
        )
        .await
        .context("Failed to abort multipart upload")?;

        Ok(())
    }

    /// # Errors
    ///
    /// Will return `Err` if the API does not commit the upload
    pub async fn complete_single_upload(&self, completion_token: &str) -> Result<Completion> {
        let payload = CompleteRequest {
            completion_token,
            parts: None,
            token: self.token(),
        };

        let response = self
            .post("complete-single-upload", &payload, REQUEST_TIMEOUT)
            .await
            .context("Failed to complete single upload")?;

        Ok(serde_json::from_slice(&response.bytes().await?)?)
    }
}

impl CompletionGateway for ApiClient {
    async fn complete(&self, completion_token: &str, parts: &[PartResult]) -> Result<Completion> {
        self.complete_multipart_upload(completion_token, parts).await
    }

    async fn complete_single(&self, completion_token: &str) -> Result<Completion> {
        self.complete_single_upload(completion_token).await
    }

    async fn abort(&self, completion_token: &str) -> Result<()> {
        self.abort_multipart_upload(completion_token).await
    }
}

use crate::upload::{PartUrl, PlanError, UploadDescriptor};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::BTreeMap;

pub const SSE_C_ALGORITHM: &str = "x-amz-server-side-encryption-customer-algorithm";
pub const SSE_C_KEY: &str = "x-amz-server-side-encryption-customer-key";
pub const SSE_C_KEY_MD5: &str = "x-amz-server-side-encryption-customer-key-md5";

/// Answer to `initiate-upload`, tells how the file must be sent
#[derive(Deserialize, Debug)]
#[serde(tag = "upload_type", rename_all = "lowercase")]
pub enum UploadTicket {
    Single(SingleTicket),
    Multipart(MultipartTicket),
}

impl UploadTicket {
    #[must_use]
    pub const fn upload_type(&self) -> &'static str {
        match self {
            Self::Single(_) => "single",
            Self::Multipart(_) => "multipart",
        }
    }

    #[must_use]
    pub fn completion_token(&self) -> &str {
        match self {
            Self::Single(t) => &t.completion_token,
            Self::Multipart(t) => &t.completion_token,
        }
    }

    #[must_use]
    pub fn download_url(&self) -> Option<&str> {
        match self {
            Self::Single(t) => t.download_url.as_deref(),
            Self::Multipart(t) => t.download_url.as_deref(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SingleTicket {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub completion_token: String,
    #[serde(default)]
    pub download_url: Option<String>,
}

/// The SSE-C key and its digest never show up in `Debug` output
#[derive(Deserialize, Debug)]
pub struct MultipartTicket {
    pub chunk_size: u64,
    pub part_urls: Vec<PartUrl>,
    pub completion_token: String,
    #[serde(default)]
    pub ssec_key: Option<SecretString>,
    #[serde(default)]
    pub ssec_key_md5: Option<SecretString>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub download_url: Option<String>,
}

impl MultipartTicket {
    /// Headers sent with every part: the SSE-C key handed out by the API plus
    /// any extra header it asked for
    #[must_use]
    pub fn side_channel_headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();

        if let Some(key) = &self.ssec_key {
            headers.insert(SSE_C_ALGORITHM.to_string(), "AES256".to_string());
            headers.insert(SSE_C_KEY.to_string(), key.expose_secret().to_string());

            if let Some(md5) = &self.ssec_key_md5 {
                headers.insert(SSE_C_KEY_MD5.to_string(), md5.expose_secret().to_string());
            }
        }

        headers.extend(self.headers.clone());

        headers
    }

    /// # Errors
    ///
    /// Will return `Err` if the part URLs do not cover `file_size`
    pub fn descriptor(&self, file_size: u64) -> Result<UploadDescriptor, PlanError> {
        UploadDescriptor::new(
            file_size,
            self.chunk_size,
            &self.part_urls,
            &self.completion_token,
            self.side_channel_headers(),
        )
    }
}

/// S3 error document
#[derive(Deserialize, Debug, Default)]
pub struct ErrorResponse {
    #[serde(rename = "Code", default)]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}

/// Error answer of the API, `detail` for most frameworks, `error` otherwise
#[derive(Deserialize, Debug, Default)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ApiErrorResponse {
    #[must_use]
    pub fn reason(self) -> Option<String> {
        self.detail.or(self.error)
    }
}

use crate::upload::PartResult;
use anyhow::Result;
use serde::{
    Deserialize,
    de::{Deserializer, Error},
};
use std::future::Future;

/// Response of the API once an upload is committed
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Completion {
    #[serde(default, deserialize_with = "file_id_deserializer")]
    pub file_id: Option<String>,
}

impl Completion {
    #[must_use]
    pub fn new(file_id: &str) -> Self {
        Self {
            file_id: Some(file_id.to_string()),
        }
    }
}

/// The API may send the file id as a string or a number
///
/// # Errors
///
/// Will return `Err` if the value is neither
pub fn file_id_deserializer<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(d)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "got {other}, but expected a string or a number"
        ))),
    }
}

/// Commits or discards an upload on the coordinating API
pub trait CompletionGateway: Sync {
    /// Commit a multipart upload, `parts` are sorted by part number
    fn complete(
        &self,
        completion_token: &str,
        parts: &[PartResult],
    ) -> impl Future<Output = Result<Completion>> + Send;

    /// Commit an upload sent in a single request
    fn complete_single(
        &self,
        completion_token: &str,
    ) -> impl Future<Output = Result<Completion>> + Send;

    /// Release the server side resources of a failed multipart upload
    fn abort(&self, completion_token: &str) -> impl Future<Output = Result<()>> + Send;
}

impl<T: CompletionGateway> CompletionGateway for &T {
    fn complete(
        &self,
        completion_token: &str,
        parts: &[PartResult],
    ) -> impl Future<Output = Result<Completion>> + Send {
        (**self).complete(completion_token, parts)
    }

    fn complete_single(
        &self,
        completion_token: &str,
    ) -> impl Future<Output = Result<Completion>> + Send {
        (**self).complete_single(completion_token)
    }

    fn abort(&self, completion_token: &str) -> impl Future<Output = Result<()>> + Send {
        (**self).abort(completion_token)
    }
}

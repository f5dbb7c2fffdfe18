use crate::upload::{PartSlot, ProgressAggregator, TransferConfig};
use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    future::Future,
    io::SeekFrom,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
    time::sleep,
};
use tokio_util::sync::CancellationToken;

/// A part accepted by storage, sent back to the API when completing the upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartResult {
    pub part_number: u16,
    #[serde(rename = "etag")]
    pub entity_tag: String,
}

impl PartResult {
    #[must_use]
    pub fn new(part_number: u16, entity_tag: &str) -> Self {
        Self {
            part_number,
            entity_tag: entity_tag.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PartError {
    #[error("could not read {chunk} bytes at offset {seek} from {path:?}: {source}")]
    Read {
        path: PathBuf,
        seek: u64,
        chunk: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid header {name}: {reason}")]
    Header { name: String, reason: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("storage responded with {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("worker stopped unexpectedly: {0}")]
    Worker(String),

    #[error("upload cancelled")]
    Cancelled,
}

impl PartError {
    /// Errors reported by the HTTP layer are worth another attempt, local ones are not
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Status { .. })
    }
}

/// Sends the bytes of one part to its presigned URL
pub trait PartUploader: Send + Sync + 'static {
    /// Returns the raw `ETag` response header, if storage sent one
    fn put_part(
        &self,
        url: &str,
        body: Bytes,
        headers: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<Option<String>, PartError>> + Send;
}

/// Uploads parts of one file, retrying each one with exponential backoff.
///
/// Every attempt opens the file on its own, so concurrent parts never share
/// a cursor, and the same range is re-read on every retry.
pub struct PartTransfer<U> {
    uploader: Arc<U>,
    file: Arc<Path>,
    headers: Arc<BTreeMap<String, String>>,
    progress: ProgressAggregator,
    config: TransferConfig,
    cancel: CancellationToken,
}

impl<U> Clone for PartTransfer<U> {
    fn clone(&self) -> Self {
        Self {
            uploader: Arc::clone(&self.uploader),
            file: Arc::clone(&self.file),
            headers: Arc::clone(&self.headers),
            progress: self.progress.clone(),
            config: self.config,
            cancel: self.cancel.clone(),
        }
    }
}

impl<U: PartUploader> PartTransfer<U> {
    #[must_use]
    pub fn new(
        uploader: Arc<U>,
        file: &Path,
        headers: &BTreeMap<String, String>,
        progress: ProgressAggregator,
        config: TransferConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            uploader,
            file: Arc::from(file),
            headers: Arc::new(headers.clone()),
            progress,
            config: config.normalized(),
            cancel,
        }
    }

    /// Upload one part, retrying transient errors.
    ///
    /// # Errors
    ///
    /// Will return `Err` with the last error once the attempts are exhausted,
    /// on the first non transient error, or [`PartError::Cancelled`] if the
    /// upload was cancelled before a new attempt could start.
    pub async fn upload(&self, slot: &PartSlot) -> Result<PartResult, PartError> {
        let part_number = slot.get_number();
        let retries = self.config.max_retries;

        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(PartError::Cancelled);
            }

            match self.try_upload(slot).await {
                Ok(etag) => {
                    self.progress.advance(slot.get_chunk());

                    log::info!("Uploaded part: {part_number}, etag: {etag}");

                    return Ok(PartResult::new(part_number, &etag));
                }

                Err(e) => {
                    log::error!(
                        "Error uploading part: {}, attempt {}/{} failed: {}",
                        part_number,
                        attempt + 1,
                        retries,
                        e
                    );

                    if !e.is_transient() || attempt + 1 >= retries {
                        return Err(e);
                    }
                }
            }

            let backoff = self.config.backoff(attempt);

            log::warn!("Error uploading part: {part_number}, retrying in {backoff:?}");

            tokio::select! {
                () = sleep(backoff) => {},
                () = self.cancel.cancelled() => return Err(PartError::Cancelled),
            }

            attempt += 1;
        }
    }

    async fn try_upload(&self, slot: &PartSlot) -> Result<String, PartError> {
        let body = read_part(&self.file, slot.get_seek(), slot.get_chunk()).await?;

        // the length always comes from the slot, whatever the case of the key
        let mut headers: BTreeMap<String, String> = self
            .headers
            .iter()
            .filter(|(k, _)| !k.eq_ignore_ascii_case("content-length"))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        headers.insert("Content-Length".to_string(), slot.get_chunk().to_string());

        log::debug!("Uploading part: {}", slot.get_number());

        let etag = self
            .uploader
            .put_part(slot.get_url(), body, &headers)
            .await?;

        Ok(etag.map_or_else(
            || {
                log::warn!("missing ETag for part: {}", slot.get_number());
                String::new()
            },
            |etag| etag.trim_matches('"').to_string(),
        ))
    }
}

/// Read exactly `chunk` bytes starting at `seek`
///
/// # Errors
///
/// Will return `Err` if the file can not be opened or is shorter than expected
pub async fn read_part(file: &Path, seek: u64, chunk: u64) -> Result<Bytes, PartError> {
    let err = |source| PartError::Read {
        path: file.to_path_buf(),
        seek,
        chunk,
        source,
    };

    let len = usize::try_from(chunk)
        .map_err(|e| err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

    let mut fd = File::open(file).await.map_err(err)?;
    fd.seek(SeekFrom::Start(seek)).await.map_err(err)?;

    let mut buf = vec![0; len];
    fd.read_exact(&mut buf).await.map_err(err)?;

    Ok(Bytes::from(buf))
}

use crate::upload::{
    CompletionGateway, PartError, PartSlot, PartTransfer, PartUploader, ProgressAggregator,
    TransferConfig, UploadError, Uploaded,
};
use std::{collections::BTreeMap, path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;

/// Upload `file` in one request, the whole file is part 1, then commit it.
///
/// The request is retried like any other part. There is nothing to abort if
/// it fails.
///
/// # Errors
///
/// Will return `Err` if the file can not be read, the request fails, the
/// upload is interrupted or the API refuses to complete it.
#[allow(clippy::too_many_arguments)]
pub async fn upload_single<U: PartUploader, G: CompletionGateway>(
    uploader: Arc<U>,
    gateway: &G,
    file: &Path,
    url: &str,
    headers: &BTreeMap<String, String>,
    completion_token: &str,
    config: TransferConfig,
    progress: ProgressAggregator,
    interrupt: CancellationToken,
) -> Result<Uploaded, UploadError> {
    let file_size = match tokio::fs::metadata(file).await {
        Ok(metadata) => metadata.len(),
        Err(source) => {
            progress.finish();
            return Err(UploadError::Io {
                path: file.to_path_buf(),
                source,
            });
        }
    };

    let slot = PartSlot::new(1, url, 0, file_size);

    let transfer = PartTransfer::new(uploader, file, headers, progress.clone(), config, interrupt);

    let rs = transfer.upload(&slot).await;

    progress.finish();

    match rs {
        Ok(part) => {
            let completion = gateway
                .complete_single(completion_token)
                .await
                .map_err(|source| UploadError::CompletionFailed { source })?;

            Ok(Uploaded {
                file_id: completion.file_id,
                parts: vec![part],
            })
        }

        Err(PartError::Cancelled) => Err(UploadError::Interrupted),

        Err(source) => Err(UploadError::PartUploadFailed {
            part_number: 1,
            source,
        }),
    }
}

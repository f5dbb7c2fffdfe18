use crate::upload::{PartError, PlanError};
use std::path::PathBuf;

/// Why an upload did not complete
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The ticket does not describe the file, nothing was sent
    #[error("invalid upload plan: {0}")]
    InvalidPlan(#[from] PlanError),

    /// A part ran out of attempts, the whole upload was aborted
    #[error("part {part_number} failed: {source}")]
    PartUploadFailed {
        part_number: u16,
        #[source]
        source: PartError,
    },

    /// Every part is in storage but the API did not commit them
    #[error("all parts were uploaded but the upload could not be completed: {source}")]
    CompletionFailed {
        #[source]
        source: anyhow::Error,
    },

    /// Only logged, the part failure is what gets reported
    #[error("could not abort the upload: {0}")]
    AbortNotificationFailed(#[source] anyhow::Error),

    #[error("upload interrupted")]
    Interrupted,

    #[error("could not read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl UploadError {
    /// Part that caused the upload to fail, if any
    #[must_use]
    pub const fn part_number(&self) -> Option<u16> {
        match self {
            Self::PartUploadFailed { part_number, .. } => Some(*part_number),
            _ => None,
        }
    }
}

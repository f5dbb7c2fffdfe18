//! Multipart upload engine
//!
//! * [`plan`] splits a file into numbered byte ranges
//! * [`part`] uploads one range with retries
//! * [`progress`] aggregates bytes sent by concurrent parts
//! * [`orchestrator`] dispatches parts and commits or aborts the upload
//! * [`single`] uploads a file in one request

pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod part;
pub mod plan;
pub mod progress;
pub mod single;

#[cfg(test)]
pub(crate) mod testing;

pub use self::{
    error::UploadError,
    gateway::{Completion, CompletionGateway},
    orchestrator::{State, UploadOrchestrator, UploadOutcome, Uploaded},
    part::{PartError, PartResult, PartTransfer, PartUploader},
    plan::{PartSlot, PartUrl, PlanError, UploadDescriptor},
    progress::ProgressAggregator,
    single::upload_single,
};

use std::time::Duration;

/// Attempts per part, including the first one
pub const MAX_RETRIES: u32 = 5;

/// Exponential backoff base, waits are `BASE^attempt` backoff units
pub const RETRY_BACKOFF_BASE: u32 = 2;

/// Parts uploaded at the same time
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Timeout for a single part request, parts can be large and links slow
pub const PART_REQUEST_TIMEOUT: Duration = Duration::from_secs(3600);

/// Tunables for the part workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    /// max number of in-flight part uploads
    pub concurrency: usize,
    /// total attempts per part
    pub max_retries: u32,
    pub backoff_base: u32,
    /// duration of one backoff step, one second unless testing
    pub backoff_unit: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: MAX_RETRIES,
            backoff_base: RETRY_BACKOFF_BASE,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl TransferConfig {
    /// Wait before retrying a part whose attempt `attempt` (zero based) failed
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit
            .saturating_mul(self.backoff_base.saturating_pow(attempt))
    }

    /// At least one attempt and one worker, whatever the caller asked for
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            concurrency: self.concurrency.max(1),
            max_retries: self.max_retries.max(1),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backoff_schedule() {
        let config = TransferConfig::default();
        let waits: Vec<u64> = (0..5).map(|a| config.backoff(a).as_secs()).collect();
        assert_eq!(waits, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn test_scaled_backoff() {
        let config = TransferConfig {
            backoff_unit: Duration::from_millis(10),
            ..TransferConfig::default()
        };
        assert_eq!(config.backoff(0), Duration::from_millis(10));
        assert_eq!(config.backoff(3), Duration::from_millis(80));
    }

    #[test]
    fn test_backoff_saturates() {
        let config = TransferConfig::default();
        assert_eq!(
            config.backoff(u32::MAX),
            Duration::from_secs(u64::from(u32::MAX))
        );
    }

    #[test]
    fn test_normalized() {
        let config = TransferConfig {
            concurrency: 0,
            max_retries: 0,
            ..TransferConfig::default()
        }
        .normalized();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.max_retries, 1);
    }
}

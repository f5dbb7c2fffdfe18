use crate::upload::{
    CompletionGateway, PartError, PartResult, PartTransfer, PartUploader, PlanError,
    ProgressAggregator, TransferConfig, UploadDescriptor, UploadError,
};
use std::{collections::HashMap, path::Path, sync::Arc};
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Planning,
    Dispatching,
    Collecting,
    Finalizing,
    Aborting,
    Done,
}

/// Result of dispatching and collecting every part
#[derive(Debug)]
pub enum UploadOutcome {
    /// Every part landed, sorted by part number
    Success(Vec<PartResult>),
    /// The first part that failed for good
    Aborted { part_number: u16, cause: PartError },
    /// The user interrupted the upload
    Interrupted,
}

/// A committed upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uploaded {
    pub file_id: Option<String>,
    pub parts: Vec<PartResult>,
}

/// Uploads the parts of one file concurrently and commits or aborts them as
/// a whole.
///
/// At most `concurrency` parts are in flight. Parts complete in any order,
/// the first one that fails for good stops the dispatching of new parts, the
/// parts already in flight are awaited and their results discarded, then the
/// upload is aborted.
pub struct UploadOrchestrator<U, G> {
    uploader: Arc<U>,
    gateway: G,
    config: TransferConfig,
    progress: ProgressAggregator,
    interrupt: CancellationToken,
    state: State,
}

impl<U: PartUploader, G: CompletionGateway> UploadOrchestrator<U, G> {
    #[must_use]
    pub fn new(uploader: Arc<U>, gateway: G, config: TransferConfig) -> Self {
        Self {
            uploader,
            gateway,
            config: config.normalized(),
            progress: ProgressAggregator::default(),
            interrupt: CancellationToken::new(),
            state: State::Planning,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressAggregator) -> Self {
        self.progress = progress;
        self
    }

    /// Cancelling `interrupt` aborts the upload as if a part had failed
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: CancellationToken) -> Self {
        self.interrupt = interrupt;
        self
    }

    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    fn transition(&mut self, next: State) {
        log::debug!("upload state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Plan and upload `file` using the part URLs handed out by the API.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file can not be read, the plan does not match
    /// the file, a part fails, the upload is interrupted or the API refuses to
    /// complete it.
    pub async fn upload(
        mut self,
        file: &Path,
        plan: impl FnOnce(u64) -> Result<UploadDescriptor, PlanError>,
    ) -> Result<Uploaded, UploadError> {
        let file_size = match tokio::fs::metadata(file).await {
            Ok(metadata) => metadata.len(),
            Err(source) => {
                self.progress.finish();
                self.transition(State::Done);
                return Err(UploadError::Io {
                    path: file.to_path_buf(),
                    source,
                });
            }
        };

        let descriptor = match plan(file_size) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                self.progress.finish();
                self.transition(State::Done);
                return Err(e.into());
            }
        };

        self.execute(file, &descriptor).await
    }

    /// Upload every part of `descriptor` and commit them, or abort the upload
    /// if any of them fails.
    ///
    /// # Errors
    ///
    /// Will return `Err` if a part fails, the upload is interrupted or the API
    /// refuses to complete it.
    pub async fn execute(
        mut self,
        file: &Path,
        descriptor: &UploadDescriptor,
    ) -> Result<Uploaded, UploadError> {
        let outcome = self.collect(file, descriptor).await;

        // every worker is done, nothing else touches the progress bar
        self.progress.finish();

        let token = descriptor.completion_token();

        let rs = match outcome {
            UploadOutcome::Success(parts) => {
                self.transition(State::Finalizing);

                log::info!("completing upload with {} parts", parts.len());

                match self.gateway.complete(token, &parts).await {
                    Ok(completion) => Ok(Uploaded {
                        file_id: completion.file_id,
                        parts,
                    }),
                    Err(source) => Err(UploadError::CompletionFailed { source }),
                }
            }

            UploadOutcome::Aborted { part_number, cause } => {
                self.abort(token).await;
                Err(UploadError::PartUploadFailed {
                    part_number,
                    source: cause,
                })
            }

            UploadOutcome::Interrupted => {
                self.abort(token).await;
                Err(UploadError::Interrupted)
            }
        };

        self.transition(State::Done);

        rs
    }

    async fn abort(&mut self, token: &str) {
        self.transition(State::Aborting);

        if let Err(e) = self.gateway.abort(token).await {
            log::warn!("{}", UploadError::AbortNotificationFailed(e));
        }
    }

    /// Dispatch the parts and collect their results in completion order
    pub async fn collect(&mut self, file: &Path, descriptor: &UploadDescriptor) -> UploadOutcome {
        // cancelled on the first failure, or with the interrupt
        let cancel = self.interrupt.child_token();

        let transfer = PartTransfer::new(
            Arc::clone(&self.uploader),
            file,
            descriptor.headers(),
            self.progress.clone(),
            self.config,
            cancel.clone(),
        );

        let max_requests = self.config.concurrency;

        log::info!("Max concurrent requests: {max_requests}");

        let mut tasks: JoinSet<Result<PartResult, PartError>> = JoinSet::new();
        let mut running: HashMap<Id, u16> = HashMap::new();
        let mut slots = descriptor.parts().iter();
        let mut results: Vec<PartResult> = Vec::with_capacity(slots.len());
        let mut failure: Option<(u16, PartError)> = None;
        let mut interrupted = false;

        self.transition(State::Dispatching);

        loop {
            // throttling tasks
            while !cancel.is_cancelled() && tasks.len() < max_requests {
                let Some(slot) = slots.next() else {
                    break;
                };

                log::info!("Task push part: {}", slot.get_number());

                let part_number = slot.get_number();
                let transfer = transfer.clone();
                let slot = slot.clone();
                let handle = tasks.spawn(async move { transfer.upload(&slot).await });

                running.insert(handle.id(), part_number);
            }

            if self.state == State::Dispatching && (slots.len() == 0 || cancel.is_cancelled()) {
                self.transition(State::Collecting);
            }

            if tasks.is_empty() {
                break;
            }

            let joined = tokio::select! {
                joined = tasks.join_next_with_id() => joined,
                () = self.interrupt.cancelled(), if !interrupted => {
                    log::warn!(
                        "upload interrupted, waiting for {} running parts",
                        tasks.len()
                    );
                    interrupted = true;
                    continue;
                }
            };

            let Some(joined) = joined else {
                break;
            };

            let (part_number, rs) = match joined {
                Ok((id, rs)) => (running.remove(&id).unwrap_or_default(), rs),
                Err(e) => (
                    running.remove(&e.id()).unwrap_or_default(),
                    Err(PartError::Worker(e.to_string())),
                ),
            };

            // abort decided, whatever arrives now is only drained
            let aborting = failure.is_some() || self.interrupt.is_cancelled();

            match rs {
                Ok(part) if !aborting => {
                    log::debug!("Remaining tasks: {}", tasks.len());
                    results.push(part);
                }

                Ok(part) => {
                    log::debug!("discarding part {} uploaded after abort", part.part_number);
                }

                Err(PartError::Cancelled) => {
                    log::debug!("part {part_number} cancelled");
                }

                Err(e) if !aborting => {
                    log::error!("Part {part_number} failed: {e}");
                    cancel.cancel();
                    failure = Some((part_number, e));
                }

                Err(e) => {
                    log::warn!("Part {part_number} failed after abort: {e}");
                }
            }
        }

        if let Some((part_number, cause)) = failure {
            UploadOutcome::Aborted { part_number, cause }
        } else if self.interrupt.is_cancelled() {
            UploadOutcome::Interrupted
        } else {
            results.sort_by_key(|part| part.part_number);
            UploadOutcome::Success(results)
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::cast_possible_truncation
)]
mod tests {
    use super::*;
    use crate::upload::{
        PartUrl,
        testing::{MockGateway, MockUploader, temp_file},
    };
    use std::{collections::BTreeMap, time::Duration};

    fn config() -> TransferConfig {
        TransferConfig {
            backoff_unit: Duration::from_millis(1),
            ..TransferConfig::default()
        }
    }

    fn descriptor(total_size: u64, chunk_size: u64) -> UploadDescriptor {
        let n = u16::try_from(total_size.div_ceil(chunk_size)).unwrap();
        let urls: Vec<PartUrl> = (1..=n).map(|i| PartUrl::new(i, &format!("u{i}"))).collect();
        UploadDescriptor::new(total_size, chunk_size, &urls, "token", BTreeMap::new()).unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_three_parts_any_completion_order() {
        let content: Vec<u8> = (0..25_000_000_u32).map(|i| (i % 251) as u8).collect();
        let file = temp_file(&content);

        // part 1 finishes last, part 3 first
        let uploader = Arc::new(
            MockUploader::new()
                .respond("u1", "\"a\"")
                .respond("u2", "\"b\"")
                .respond("u3", "\"c\"")
                .delay("u1", Duration::from_millis(150))
                .delay("u2", Duration::from_millis(75)),
        );
        let gateway = MockGateway::new();
        let progress = ProgressAggregator::default();

        let orchestrator = UploadOrchestrator::new(Arc::clone(&uploader), &gateway, config())
            .with_progress(progress.clone());

        let uploaded = orchestrator
            .execute(file.path(), &descriptor(25_000_000, 10_000_000))
            .await
            .unwrap();

        assert_eq!(
            uploaded.parts,
            vec![
                PartResult::new(1, "a"),
                PartResult::new(2, "b"),
                PartResult::new(3, "c")
            ]
        );
        assert_eq!(uploaded.file_id.as_deref(), Some("file-42"));
        assert_eq!(uploader.completed(), vec!["u3", "u2", "u1"]);

        let completed = gateway.completed();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].0, "token");
        assert_eq!(completed[0].1, uploaded.parts);
        assert!(gateway.aborted().is_empty());

        assert_eq!(progress.total(), 25_000_000);
        assert!(progress.is_finished());

        // every part carried its own range
        for call in uploader.calls() {
            let (start, len) = match call.url.as_str() {
                "u1" => (0, 10_000_000),
                "u2" => (10_000_000, 10_000_000),
                _ => (20_000_000, 5_000_000),
            };
            assert_eq!(call.body.len(), len);
            assert_eq!(&call.body[..], &content[start..start + len]);
            assert_eq!(
                call.headers.get("Content-Length"),
                Some(&len.to_string())
            );
        }
    }

    #[tokio::test]
    async fn test_results_sorted_with_random_completion_order() {
        let file = temp_file(&[7; 100]);
        let delays = [40, 5, 25, 0, 35, 10, 30, 15, 20, 1];
        let mut uploader = MockUploader::new();
        for (i, delay) in delays.iter().enumerate() {
            uploader = uploader.delay(&format!("u{}", i + 1), Duration::from_millis(*delay));
        }
        let uploader = Arc::new(uploader);
        let gateway = MockGateway::new();

        let uploaded = UploadOrchestrator::new(Arc::clone(&uploader), &gateway, config())
            .execute(file.path(), &descriptor(100, 10))
            .await
            .unwrap();

        let numbers: Vec<u16> = uploaded.parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, (1..=10).collect::<Vec<u16>>());
        assert_eq!(uploaded.parts[4].entity_tag, "etag-u5");
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let file = temp_file(&[1; 80]);
        let mut uploader = MockUploader::new();
        for i in 1..=8 {
            uploader = uploader.delay(&format!("u{i}"), Duration::from_millis(20));
        }
        let uploader = Arc::new(uploader);
        let gateway = MockGateway::new();

        let config = TransferConfig {
            concurrency: 3,
            ..config()
        };

        UploadOrchestrator::new(Arc::clone(&uploader), &gateway, config)
            .execute(file.path(), &descriptor(80, 10))
            .await
            .unwrap();

        assert_eq!(uploader.calls().len(), 8);
        assert!(uploader.max_in_flight() <= 3);
        assert!(uploader.max_in_flight() >= 2);
    }

    #[tokio::test]
    async fn test_first_failure_aborts() {
        let file = temp_file(&[0; 50]);
        let uploader = Arc::new(
            MockUploader::new()
                .fail("u3", u32::MAX)
                .delay("u1", Duration::from_millis(30))
                .delay("u2", Duration::from_millis(30))
                .delay("u4", Duration::from_millis(30))
                .delay("u5", Duration::from_millis(30)),
        );
        let gateway = MockGateway::new();
        let progress = ProgressAggregator::default();

        let config = TransferConfig {
            concurrency: 5,
            max_retries: 2,
            ..config()
        };

        let err = UploadOrchestrator::new(Arc::clone(&uploader), &gateway, config)
            .with_progress(progress.clone())
            .execute(file.path(), &descriptor(50, 10))
            .await
            .unwrap_err();

        match err {
            UploadError::PartUploadFailed {
                part_number,
                source,
            } => {
                assert_eq!(part_number, 3);
                assert!(matches!(source, PartError::Status { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(uploader.calls_to("u3"), 2);
        assert_eq!(gateway.aborted(), vec!["token"]);
        assert!(gateway.completed().is_empty());
        assert!(progress.is_finished());
    }

    #[tokio::test]
    async fn test_failure_stops_dispatching() {
        let file = temp_file(&[0; 60]);
        let uploader = Arc::new(
            MockUploader::new()
                .fail("u1", u32::MAX)
                .delay("u2", Duration::from_millis(50)),
        );
        let gateway = MockGateway::new();

        let config = TransferConfig {
            concurrency: 2,
            max_retries: 1,
            ..config()
        };

        let err = UploadOrchestrator::new(Arc::clone(&uploader), &gateway, config)
            .execute(file.path(), &descriptor(60, 10))
            .await
            .unwrap_err();

        assert_eq!(err.part_number(), Some(1));

        // part 2 was in flight and drained, parts 3 to 6 never started
        assert_eq!(uploader.calls_to("u2"), 1);
        assert_eq!(uploader.completed(), vec!["u2"]);
        for i in 3..=6 {
            assert_eq!(uploader.calls_to(&format!("u{i}")), 0);
        }
        assert_eq!(gateway.aborted().len(), 1);
    }

    #[tokio::test]
    async fn test_abort_failure_is_not_escalated() {
        let file = temp_file(&[0; 20]);
        let uploader = Arc::new(MockUploader::new().fail("u2", u32::MAX));
        let gateway = MockGateway::new().with_failing_abort();

        let config = TransferConfig {
            max_retries: 1,
            ..config()
        };

        let err = UploadOrchestrator::new(uploader, &gateway, config)
            .execute(file.path(), &descriptor(20, 10))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::PartUploadFailed { part_number: 2, .. }
        ));
        assert_eq!(gateway.aborted().len(), 1);
    }

    #[tokio::test]
    async fn test_completion_failure() {
        let file = temp_file(&[0; 20]);
        let uploader = Arc::new(MockUploader::new());
        let gateway = MockGateway::new().with_failing_complete();

        let err = UploadOrchestrator::new(uploader, &gateway, config())
            .execute(file.path(), &descriptor(20, 10))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::CompletionFailed { .. }));
        assert_eq!(gateway.completed().len(), 1);
        assert!(gateway.aborted().is_empty());
    }

    #[tokio::test]
    async fn test_interrupt_before_dispatch() {
        let file = temp_file(&[0; 20]);
        let uploader = Arc::new(MockUploader::new());
        let gateway = MockGateway::new();
        let interrupt = CancellationToken::new();
        interrupt.cancel();

        let err = UploadOrchestrator::new(Arc::clone(&uploader), &gateway, config())
            .with_interrupt(interrupt)
            .execute(file.path(), &descriptor(20, 10))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Interrupted));
        assert!(uploader.calls().is_empty());
        assert_eq!(gateway.aborted(), vec!["token"]);
    }

    #[tokio::test]
    async fn test_interrupt_drains_running_parts() {
        let file = temp_file(&[0; 80]);
        let mut uploader = MockUploader::new();
        for i in 1..=8 {
            uploader = uploader.delay(&format!("u{i}"), Duration::from_millis(100));
        }
        let uploader = Arc::new(uploader);
        let gateway = MockGateway::new();
        let progress = ProgressAggregator::default();
        let interrupt = CancellationToken::new();

        let ctrl_c = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            ctrl_c.cancel();
        });

        let config = TransferConfig {
            concurrency: 2,
            ..config()
        };

        let err = UploadOrchestrator::new(Arc::clone(&uploader), &gateway, config)
            .with_progress(progress.clone())
            .with_interrupt(interrupt)
            .execute(file.path(), &descriptor(80, 10))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Interrupted));

        // the two parts in flight finished, nothing else was sent
        assert_eq!(uploader.calls().len(), 2);
        assert_eq!(uploader.completed().len(), 2);
        assert_eq!(gateway.aborted().len(), 1);
        assert!(gateway.completed().is_empty());
        assert!(progress.is_finished());
    }

    #[tokio::test]
    async fn test_invalid_plan_sends_nothing() {
        let file = temp_file(&[0; 25]);
        let uploader = Arc::new(MockUploader::new());
        let gateway = MockGateway::new();
        let urls = vec![PartUrl::new(1, "u1"), PartUrl::new(2, "u2")];

        let err = UploadOrchestrator::new(Arc::clone(&uploader), &gateway, config())
            .upload(file.path(), |size| {
                UploadDescriptor::new(size, 10, &urls, "token", BTreeMap::new())
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::InvalidPlan(PlanError::PartCountMismatch { expected: 3, .. })
        ));
        assert!(uploader.calls().is_empty());
        assert!(gateway.aborted().is_empty());
        assert!(gateway.completed().is_empty());
    }

    #[tokio::test]
    async fn test_upload_plans_from_file_size() {
        let file = temp_file(&[9; 25]);
        let uploader = Arc::new(MockUploader::new());
        let gateway = MockGateway::new();
        let urls: Vec<PartUrl> = (1..=3).map(|i| PartUrl::new(i, &format!("u{i}"))).collect();

        let uploaded = UploadOrchestrator::new(Arc::clone(&uploader), &gateway, config())
            .upload(file.path(), |size| {
                UploadDescriptor::new(size, 10, &urls, "token", BTreeMap::new())
            })
            .await
            .unwrap();

        assert_eq!(uploaded.parts.len(), 3);
        assert_eq!(uploader.calls_to("u3"), 1);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let uploader = Arc::new(MockUploader::new());
        let gateway = MockGateway::new();

        let progress = ProgressAggregator::default();

        let err = UploadOrchestrator::new(uploader, &gateway, config())
            .with_progress(progress.clone())
            .upload(Path::new("/nonexistent/zeroup"), |size| {
                UploadDescriptor::new(size, 10, &[], "token", BTreeMap::new())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Io { .. }));
        assert!(progress.is_finished());
        assert!(gateway.aborted().is_empty());
    }

    #[tokio::test]
    async fn test_collect_success_is_sorted() {
        let file = temp_file(&[0; 30]);
        let uploader = Arc::new(
            MockUploader::new()
                .delay("u1", Duration::from_millis(40))
                .delay("u2", Duration::from_millis(20)),
        );
        let gateway = MockGateway::new();
        let mut orchestrator = UploadOrchestrator::new(uploader, &gateway, config());

        let outcome = orchestrator
            .collect(file.path(), &descriptor(30, 10))
            .await;

        assert_eq!(orchestrator.state(), State::Collecting);
        match outcome {
            UploadOutcome::Success(parts) => {
                let numbers: Vec<u16> = parts.iter().map(|p| p.part_number).collect();
                assert_eq!(numbers, vec![1, 2, 3]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}

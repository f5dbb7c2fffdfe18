//! Test doubles for the storage and API collaborators
#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::upload::{Completion, CompletionGateway, PartError, PartResult, PartUploader};
use anyhow::{Result, anyhow};
use bytes::Bytes;
use http::StatusCode;
use std::{
    collections::{BTreeMap, HashMap},
    io::Write,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tempfile::NamedTempFile;

pub fn temp_file(content: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content).expect("Failed to write temp file");
    file.flush().expect("Failed to flush temp file");
    file
}

#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub body: Bytes,
    pub headers: BTreeMap<String, String>,
}

/// Storage that answers every PUT with a configurable ETag, delay and number
/// of transient failures per URL
#[derive(Debug, Default)]
pub struct MockUploader {
    etags: HashMap<String, Option<String>>,
    delays: HashMap<String, Duration>,
    failures: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<Call>>,
    completed: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, url: &str, etag: &str) -> Self {
        self.etags.insert(url.to_string(), Some(etag.to_string()));
        self
    }

    pub fn without_etag(mut self, url: &str) -> Self {
        self.etags.insert(url.to_string(), None);
        self
    }

    pub fn delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    /// Fail the next `times` requests to `url`, `u32::MAX` fails forever
    pub fn fail(self, url: &str, times: u32) -> Self {
        self.failures.lock().unwrap().insert(url.to_string(), times);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.url == url).count()
    }

    /// URLs in the order their requests finished successfully
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl PartUploader for MockUploader {
    async fn put_part(
        &self,
        url: &str,
        body: Bytes,
        headers: &BTreeMap<String, String>,
    ) -> Result<Option<String>, PartError> {
        self.calls.lock().unwrap().push(Call {
            url: url.to_string(),
            body,
            headers: headers.clone(),
        });

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let fail = {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(url) {
                Some(n) if *n == u32::MAX => true,
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            }
        };

        if fail {
            return Err(PartError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "Code: SlowDown".to_string(),
            });
        }

        self.completed.lock().unwrap().push(url.to_string());

        Ok(self
            .etags
            .get(url)
            .cloned()
            .unwrap_or_else(|| Some(format!("\"etag-{url}\""))))
    }
}

/// Coordinating API that records every completion and abort
#[derive(Debug, Default)]
pub struct MockGateway {
    fail_complete: bool,
    fail_abort: bool,
    completed: Mutex<Vec<(String, Vec<PartResult>)>>,
    completed_single: Mutex<Vec<String>>,
    aborted: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_complete(mut self) -> Self {
        self.fail_complete = true;
        self
    }

    pub fn with_failing_abort(mut self) -> Self {
        self.fail_abort = true;
        self
    }

    pub fn completed(&self) -> Vec<(String, Vec<PartResult>)> {
        self.completed.lock().unwrap().clone()
    }

    pub fn completed_single(&self) -> Vec<String> {
        self.completed_single.lock().unwrap().clone()
    }

    pub fn aborted(&self) -> Vec<String> {
        self.aborted.lock().unwrap().clone()
    }
}

impl CompletionGateway for MockGateway {
    async fn complete(&self, completion_token: &str, parts: &[PartResult]) -> Result<Completion> {
        self.completed
            .lock()
            .unwrap()
            .push((completion_token.to_string(), parts.to_vec()));

        if self.fail_complete {
            return Err(anyhow!("500 Internal Server Error"));
        }

        Ok(Completion::new("file-42"))
    }

    async fn complete_single(&self, completion_token: &str) -> Result<Completion> {
        self.completed_single
            .lock()
            .unwrap()
            .push(completion_token.to_string());

        if self.fail_complete {
            return Err(anyhow!("500 Internal Server Error"));
        }

        Ok(Completion::new("file-1"))
    }

    async fn abort(&self, completion_token: &str) -> Result<()> {
        self.aborted
            .lock()
            .unwrap()
            .push(completion_token.to_string());

        if self.fail_abort {
            return Err(anyhow!("503 Service Unavailable"));
        }

        Ok(())
    }
}

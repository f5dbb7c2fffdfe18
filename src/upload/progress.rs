use indicatif::ProgressBar;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

/// Bytes uploaded so far, shared by every part worker.
///
/// Cloning is cheap and every clone updates the same counter. When a progress
/// bar is attached each advance is mirrored to it.
#[derive(Debug, Clone, Default)]
pub struct ProgressAggregator {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    uploaded: AtomicU64,
    finished: AtomicBool,
    bar: Option<ProgressBar>,
}

impl ProgressAggregator {
    #[must_use]
    pub fn new(bar: Option<ProgressBar>) -> Self {
        Self {
            inner: Arc::new(Inner {
                bar,
                ..Inner::default()
            }),
        }
    }

    pub fn advance(&self, bytes: u64) {
        self.inner.uploaded.fetch_add(bytes, Ordering::Relaxed);

        if let Some(pb) = self.inner.bar.as_ref() {
            pb.inc(bytes);
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.inner.uploaded.load(Ordering::Relaxed)
    }

    /// Close the progress bar, only the first call has an effect
    pub fn finish(&self) {
        if self.inner.finished.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(pb) = self.inner.bar.as_ref() {
            pb.finish();
        }

        log::debug!("progress finished, {} bytes uploaded", self.total());
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }
}

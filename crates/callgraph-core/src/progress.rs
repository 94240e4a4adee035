//! Progress reporting for extraction work

use std::sync::atomic::{AtomicUsize, Ordering};

/// Observer for long-running work. Purely informational.
pub trait ProgressSink: Send + Sync {
    /// A batch of `total` work units is about to start.
    fn begin(&self, total: usize);

    /// One work unit finished.
    fn increment(&self);
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn begin(&self, _total: usize) {}

    fn increment(&self) {}
}

/// Lock-free counters readable from other threads (e.g. an HTTP handler).
#[derive(Debug, Default)]
pub struct AtomicProgress {
    total: AtomicUsize,
    done: AtomicUsize,
}

impl AtomicProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(done, total)` for the current batch.
    pub fn get(&self) -> (usize, usize) {
        (self.done.load(Ordering::Relaxed), self.total.load(Ordering::Relaxed))
    }
}

impl ProgressSink for AtomicProgress {
    fn begin(&self, total: usize) {
        self.done.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    fn increment(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
    }
}

/// Logs a line roughly every tenth of the batch.
#[derive(Debug, Default)]
pub struct LogProgress {
    inner: AtomicProgress,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for LogProgress {
    fn begin(&self, total: usize) {
        self.inner.begin(total);
        if total > 0 {
            tracing::info!("Refreshing dependencies: {} steps", total);
        }
    }

    fn increment(&self) {
        self.inner.increment();
        let (done, total) = self.inner.get();
        let step = (total / 10).max(1);
        if done % step == 0 || done == total {
            tracing::debug!("Refresh progress: {}/{}", done, total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_progress_resets_on_begin() {
        let progress = AtomicProgress::new();
        progress.begin(3);
        progress.increment();
        progress.increment();
        assert_eq!(progress.get(), (2, 3));

        progress.begin(5);
        assert_eq!(progress.get(), (0, 5));
    }
}

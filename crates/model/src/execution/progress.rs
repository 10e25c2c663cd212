use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

/// Current/total counter for one job, in bytes (JSON) or lines (CSV).
///
/// Only the owning reader writes to it; everyone else reads with relaxed
/// atomic loads. `current` starts at -1 to mean "not started".
#[derive(Debug, Clone)]
pub struct JobProgress {
    current: Arc<AtomicI64>,
    total: Arc<AtomicI64>,
}

impl Default for JobProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl JobProgress {
    pub fn new() -> Self {
        Self {
            current: Arc::new(AtomicI64::new(-1)),
            total: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(clamp(total), Ordering::Relaxed);
    }

    pub fn set_current(&self, current: u64) {
        self.current.store(clamp(current), Ordering::Relaxed);
    }

    /// Marks the job as fully read.
    pub fn finish(&self) {
        let total = self.total.load(Ordering::Relaxed);
        self.current.store(total.max(0), Ordering::Relaxed);
    }

    pub fn current(&self) -> i64 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> i64 {
        self.total.load(Ordering::Relaxed)
    }
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

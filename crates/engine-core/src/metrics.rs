use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    rows_written: AtomicU64,
    batches_written: AtomicU64,
    rows_reconciled: AtomicU64,
    reconnects: AtomicU64,
    retries: AtomicU64,
}

/// Run-wide counters shared by every writer. `rows_written` is the
/// RowsWritten total reported in the summary.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rows_written: u64,
    pub batches_written: u64,
    pub rows_reconciled: u64,
    pub reconnects: u64,
    pub retries: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn add_rows_written(&self, count: u64) {
        self.inner.rows_written.fetch_add(count, Ordering::AcqRel);
    }

    pub fn increment_batches(&self) {
        self.inner.batches_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Rows found already committed while resuming a batch.
    pub fn add_rows_reconciled(&self, count: u64) {
        self.inner.rows_reconciled.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_reconnects(&self) {
        self.inner.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retries(&self) {
        self.inner.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rows_written: self.inner.rows_written.load(Ordering::Acquire),
            batches_written: self.inner.batches_written.load(Ordering::Relaxed),
            rows_reconciled: self.inner.rows_reconciled.load(Ordering::Relaxed),
            reconnects: self.inner.reconnects.load(Ordering::Relaxed),
            retries: self.inner.retries.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

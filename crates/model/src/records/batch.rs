use crate::{core::table::TableRef, records::record::Record};

pub const DEFAULT_MAX_ROWS: usize = 200;
pub const DEFAULT_MAX_BYTES: usize = 500_000;

/// A bounded group of records bound for one table, sent as a single insert.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: String,
    pub target: TableRef,
    pub rows: Vec<Record>,
    /// Sum of the serialized sizes of `rows` at the time they were batched.
    pub size_bytes: usize,
}

impl Batch {
    pub fn new(id: String, target: TableRef, rows: Vec<Record>, size_bytes: usize) -> Self {
        Self {
            id,
            target,
            rows,
            size_bytes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Flush thresholds: whichever of the two is reached first closes a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_rows: usize,
    pub max_bytes: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl BatchLimits {
    pub fn new(max_rows: usize, max_bytes: usize) -> Self {
        Self {
            max_rows: max_rows.max(1),
            max_bytes,
        }
    }

    pub fn is_full(&self, rows: usize, bytes: usize) -> bool {
        rows >= self.max_rows || bytes > self.max_bytes
    }

    /// True when adding a record of `next` bytes to a non-empty batch would
    /// push it past the byte limit. A lone oversized record still forms a
    /// batch of its own.
    pub fn would_overflow(&self, rows: usize, bytes: usize, next: usize) -> bool {
        rows > 0 && bytes.saturating_add(next) > self.max_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_limit_closes_batch() {
        let limits = BatchLimits::default();
        assert!(!limits.is_full(199, 10));
        assert!(limits.is_full(200, 10));
    }

    #[test]
    fn byte_limit_is_exclusive() {
        let limits = BatchLimits::new(10, 100);
        assert!(!limits.is_full(1, 100));
        assert!(limits.is_full(1, 101));
    }

    #[test]
    fn overflow_only_applies_to_non_empty_batches() {
        let limits = BatchLimits::new(10, 100);
        assert!(!limits.would_overflow(0, 0, 500));
        assert!(!limits.would_overflow(2, 60, 40));
        assert!(limits.would_overflow(2, 60, 41));
    }
}

use crate::error::ProducerError;
use engine_core::queue::{Task, TaskQueue};
use model::{
    core::{identifiers::RunId, table::TableRef},
    records::{
        batch::{Batch, BatchLimits},
        record::{FieldFilter, Record, encoded_len},
    },
};
use std::mem;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Groups the records of one file into batches and hands them to the task
/// queue.
///
/// Runs on a blocking thread next to the decoder, so queue pushes go
/// through the runtime handle. A push waiting on a full queue gives up as
/// soon as the exit token fires.
pub struct Batcher {
    run_id: RunId,
    target: TableRef,
    fields: Option<FieldFilter>,
    limits: BatchLimits,
    queue: TaskQueue,
    cancel: CancellationToken,
    handle: Handle,
    rows: Vec<Record>,
    bytes: usize,
    seq: u64,
    records: u64,
}

impl Batcher {
    pub fn new(
        run_id: RunId,
        target: TableRef,
        limits: BatchLimits,
        queue: TaskQueue,
        cancel: CancellationToken,
        handle: Handle,
    ) -> Self {
        Self {
            run_id,
            target,
            fields: None,
            limits,
            queue,
            cancel,
            handle,
            rows: Vec::new(),
            bytes: 0,
            seq: 0,
            records: 0,
        }
    }

    pub fn with_fields(mut self, fields: Option<FieldFilter>) -> Self {
        self.fields = fields;
        self
    }

    /// Accepts one decoded record. The allowlist is applied before the
    /// record is sized, since it changes the serialized length.
    pub fn observe(&mut self, mut record: Record) -> Result<(), ProducerError> {
        if self.cancel.is_cancelled() {
            return Err(ProducerError::Interrupted);
        }

        if let Some(fields) = &self.fields {
            fields.apply(&mut record);
        }
        let size = encoded_len(&record)?;

        if self.limits.would_overflow(self.rows.len(), self.bytes, size) {
            self.flush()?;
        }
        self.rows.push(record);
        self.bytes += size;
        self.records += 1;

        if self.limits.is_full(self.rows.len(), self.bytes) {
            self.flush()?;
        }
        Ok(())
    }

    /// Flushes the final partial batch. After cancellation the pending rows
    /// are discarded instead.
    pub fn finish(mut self) -> Result<u64, ProducerError> {
        if self.cancel.is_cancelled() {
            return Err(ProducerError::Interrupted);
        }
        self.flush()?;
        debug!(table = %self.target, records = self.records, batches = self.seq, "Batcher finished");
        Ok(self.records)
    }

    fn flush(&mut self) -> Result<(), ProducerError> {
        if self.rows.is_empty() {
            return Ok(());
        }

        let rows = mem::take(&mut self.rows);
        let bytes = mem::replace(&mut self.bytes, 0);
        let batch = Batch::new(self.next_batch_id(), self.target.clone(), rows, bytes);
        debug!(batch_id = %batch.id, table = %self.target, rows = batch.len(), bytes, "Flushing batch");

        let queue = &self.queue;
        let cancel = &self.cancel;
        self.handle.block_on(async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ProducerError::Interrupted),
                pushed = queue.push(Task::Batch(batch)) => pushed.map_err(|_| ProducerError::QueueClosed),
            }
        })
    }

    fn next_batch_id(&mut self) -> String {
        self.seq += 1;
        let mut h = blake3::Hasher::new();
        h.update(self.run_id.as_str().as_bytes());
        h.update(self.target.to_string().as_bytes());
        h.update(&self.seq.to_le_bytes());
        h.finalize().to_hex().to_string()
    }
}

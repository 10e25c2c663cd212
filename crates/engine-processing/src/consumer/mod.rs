use crate::{consumer::writer::ResumableWriter, error::ConsumerError};
use engine_core::{
    failures::FailureSender,
    queue::{Task, TaskQueue},
};
use model::core::table::TableRef;
use std::{collections::HashMap, path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub mod writer;

/// Source file of each destination table, for failure context.
pub type SourceFiles = Arc<HashMap<TableRef, PathBuf>>;

/// One member of the writer pool. Pulls tasks until it sees a stop
/// sentinel or the exit token, and reports its own failure before dying.
pub struct WriterUnit {
    id: usize,
    queue: TaskQueue,
    writer: ResumableWriter,
    failures: FailureSender,
    sources: SourceFiles,
    cancel: CancellationToken,
}

impl WriterUnit {
    pub fn new(
        id: usize,
        queue: TaskQueue,
        writer: ResumableWriter,
        failures: FailureSender,
        sources: SourceFiles,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            queue,
            writer,
            failures,
            sources,
            cancel,
        }
    }

    /// Returns the number of rows this unit committed.
    pub async fn run(mut self) -> u64 {
        let mut committed = 0u64;
        let mut batches = 0usize;

        loop {
            let task = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(writer = self.id, "Exit requested, writer stopping");
                    break;
                }
                task = self.queue.pull() => task,
            };

            let batch = match task {
                Some(Task::Batch(batch)) => batch,
                Some(Task::Stop) | None => break,
            };

            let table = batch.target.clone();
            match self.writer.write(batch).await {
                Ok(rows) => {
                    committed += rows;
                    batches += 1;
                }
                Err(ConsumerError::Interrupted) => break,
                Err(err) => {
                    let file = self.sources.get(&table).map(PathBuf::as_path);
                    if let Some(failure) = err.to_failure(file) {
                        self.failures.report(failure);
                    }
                    break;
                }
            }
        }

        info!(writer = self.id, batches, rows = committed, "Writer finished");
        committed
    }
}

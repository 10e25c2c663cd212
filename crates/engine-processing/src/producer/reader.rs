use crate::{error::ProducerError, producer::batcher::Batcher, retry::classify_store_error};
use connectors::{
    file::decode_file,
    store::{StoreConnector, error::StoreError},
};
use engine_core::{
    queue::TaskQueue,
    retry::{RetryError, RetryPolicy},
};
use model::{
    core::identifiers::RunId,
    execution::{job::ImportJob, progress::JobProgress},
    records::batch::BatchLimits,
};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Reads one job's file from start to end: makes sure the destination
/// table exists, then decodes and batches every record onto the queue.
pub struct ReaderUnit {
    run_id: RunId,
    job: ImportJob,
    connector: Arc<dyn StoreConnector>,
    queue: TaskQueue,
    limits: BatchLimits,
    retry: RetryPolicy,
    progress: JobProgress,
    cancel: CancellationToken,
}

impl ReaderUnit {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: RunId,
        job: ImportJob,
        connector: Arc<dyn StoreConnector>,
        queue: TaskQueue,
        limits: BatchLimits,
        retry: RetryPolicy,
        progress: JobProgress,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id,
            job,
            connector,
            queue,
            limits,
            retry,
            progress,
            cancel,
        }
    }

    pub fn job(&self) -> &ImportJob {
        &self.job
    }

    /// Returns the number of records read from the file.
    pub async fn run(self) -> Result<u64, ProducerError> {
        self.ensure_table().await?;

        let ReaderUnit {
            run_id,
            job,
            queue,
            limits,
            progress,
            cancel,
            ..
        } = self;
        let handle = Handle::current();

        let job_id = job.id.clone();
        info!(job = %job_id, file = %job.file_name(), format = %job.format, "Reading file");
        let records = tokio::task::spawn_blocking(move || {
            let mut batcher = Batcher::new(run_id, job.target.clone(), limits, queue, cancel, handle)
                .with_fields(job.fields.clone());
            decode_file(&job, &progress, |record| batcher.observe(record))?;
            batcher.finish()
        })
        .await
        .map_err(|e| ProducerError::Join(e.to_string()))??;

        debug!(job = %job_id, records, "Reader finished");
        Ok(records)
    }

    /// Creates the destination table unless it already exists. Done once per
    /// job, reconnecting on transient failures.
    async fn ensure_table(&self) -> Result<(), ProducerError> {
        let target = &self.job.target;
        let primary_key = self.job.primary_key.as_str();
        let connector = &self.connector;

        let created = self
            .retry
            .run(
                &self.cancel,
                || async move {
                    let conn = connector.connect().await?;
                    let tables = conn.list_tables(&target.db).await?;
                    if tables.iter().any(|t| t == &target.table) {
                        return Ok(false);
                    }
                    match conn.create_table(target, primary_key).await {
                        Ok(()) => Ok(true),
                        Err(StoreError::TableExists(_)) => Ok(false),
                        Err(e) => Err(e),
                    }
                },
                classify_store_error,
            )
            .await;

        match created {
            Ok(true) => {
                info!(table = %target, primary_key, "Created table");
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(RetryError::Fatal(source)) => Err(ProducerError::Prepare {
                table: target.clone(),
                source,
            }),
            Err(RetryError::AttemptsExceeded(source)) => Err(ProducerError::RetriesExhausted {
                table: target.clone(),
                source,
            }),
            Err(RetryError::Cancelled) => Err(ProducerError::Interrupted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::store::memory::MemoryStore;
    use model::{
        core::table::TableRef,
        execution::job::{CsvOptions, FileFormat},
    };
    use std::io::Write;
    use tracing_test::traced_test;

    fn unit(store: &MemoryStore, job: ImportJob, queue: &TaskQueue, progress: JobProgress) -> ReaderUnit {
        ReaderUnit::new(
            RunId::new("run-test"),
            job,
            Arc::new(store.clone()),
            queue.clone(),
            BatchLimits::new(2, 1_000_000),
            RetryPolicy::immediate(3),
            progress,
            CancellationToken::new(),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    #[traced_test]
    async fn creates_table_and_queues_batches() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"[{{"id":1}},{{"id":2}},{{"id":3}}]"#).unwrap();

        let store = MemoryStore::new();
        store.ensure_database("test");
        store.refuse_connects(1);
        let target = TableRef::new("test", "items");
        let job = ImportJob::new(file.path(), FileFormat::Json, target.clone());
        let queue = TaskQueue::new(8);
        let progress = JobProgress::new();

        let records = unit(&store, job, &queue, progress.clone()).run().await.unwrap();

        assert_eq!(records, 3);
        assert!(store.has_table(&target));
        assert_eq!(queue.len(), 2);
        assert_eq!(progress.current(), progress.total());
        assert!(logs_contain("Created table"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn format_errors_surface_as_file_errors() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        write!(file, "id,name\n1\n").unwrap();

        let store = MemoryStore::new();
        store.ensure_table(&TableRef::new("test", "people"), "id");
        let job = ImportJob::new(file.path(), FileFormat::Csv, TableRef::new("test", "people"))
            .with_csv_options(CsvOptions::default());
        let queue = TaskQueue::new(8);

        let err = unit(&store, job, &queue, JobProgress::new())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ProducerError::File(_)));
        assert!(queue.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_database_is_a_precondition_failure() {
        let file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        let store = MemoryStore::new();
        let job = ImportJob::new(file.path(), FileFormat::Json, TableRef::new("nope", "t"));

        let err = unit(&store, job, &TaskQueue::new(1), JobProgress::new())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ProducerError::Prepare { .. }));
    }
}

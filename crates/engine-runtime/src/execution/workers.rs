use connectors::store::StoreConnector;
use engine_core::{
    failures::FailureSender, metrics::Metrics, queue::TaskQueue, settings::ImportSettings,
    shutdown::CancellationController,
};
use engine_processing::{
    cb::CircuitBreaker,
    consumer::{SourceFiles, WriterUnit, writer::ResumableWriter},
    producer::reader::ReaderUnit,
};
use model::{
    core::identifiers::RunId,
    execution::{job::ImportJob, progress::JobProgress},
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Everything the worker units share for one run.
pub struct WorkerContext {
    pub run_id: RunId,
    pub settings: ImportSettings,
    pub connector: Arc<dyn StoreConnector>,
    pub queue: TaskQueue,
    pub controller: CancellationController,
    pub metrics: Metrics,
    pub failures: FailureSender,
}

/// Starts the writer pool. Each unit is registered with the controller for
/// as long as its task runs.
pub fn spawn_writers(ctx: &WorkerContext, sources: SourceFiles) -> Vec<JoinHandle<u64>> {
    let clients = ctx.settings.clients.get();
    info!(clients, "Launching writers");

    (0..clients)
        .map(|id| {
            let guard = ctx.controller.writer_started();
            let writer = ResumableWriter::new(
                ctx.connector.clone(),
                ctx.settings.write,
                CircuitBreaker::from_settings(&ctx.settings.reconnect),
                ctx.metrics.clone(),
                ctx.controller.exit_token(),
            );
            let unit = WriterUnit::new(
                id,
                ctx.queue.clone(),
                writer,
                ctx.failures.clone(),
                sources.clone(),
                ctx.controller.exit_token(),
            );
            tokio::spawn(async move {
                let _guard = guard;
                unit.run().await
            })
        })
        .collect()
}

/// Starts one reader per job. Readers report their own failures; an
/// interrupted reader reports nothing.
pub fn spawn_readers(ctx: &WorkerContext, jobs: &[(ImportJob, JobProgress)]) -> Vec<JoinHandle<()>> {
    jobs.iter()
        .map(|(job, progress)| {
            let unit = ReaderUnit::new(
                ctx.run_id.clone(),
                job.clone(),
                ctx.connector.clone(),
                ctx.queue.clone(),
                ctx.settings.batch_limits,
                ctx.settings.retry.clone(),
                progress.clone(),
                ctx.controller.exit_token(),
            );
            let failures = ctx.failures.clone();
            tokio::spawn(async move {
                let path = unit.job().path.clone();
                let table = unit.job().target.clone();
                match unit.run().await {
                    Ok(records) => debug!(table = %table, records, "Reader done"),
                    Err(err) => match err.to_failure(&path) {
                        Some(failure) => failures.report(failure),
                        None => debug!(table = %table, "Reader interrupted"),
                    },
                }
            })
        })
        .collect()
}

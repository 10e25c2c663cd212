use crate::{
    error::ImportError,
    execution::{
        summary::{ImportReport, ImportStatus, ImportSummary},
        workers::{self, WorkerContext},
    },
    preflight::{self, PreflightOptions},
};
use connectors::store::StoreConnector;
use engine_core::{
    failures::{FailureCollector, failure_channel},
    metrics::Metrics,
    progress::ProgressAggregator,
    queue::{Task, TaskQueue},
    retry::RetryError,
    settings::ImportSettings,
    shutdown::{CancelReason, CancellationController},
};
use engine_processing::retry::classify_store_error;
use model::{
    core::identifiers::RunId,
    execution::{
        failure::{FailureKind, ImportFailure},
        job::ImportJob,
        progress::JobProgress,
    },
};
use std::{collections::HashMap, sync::Arc, time::Instant};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{info, warn};

/// One import run: a set of jobs, the writer pool that serves them and the
/// coordinating poll loop.
///
/// The controller and progress view are available before [`execute`] so a
/// caller can wire up signal handling and a progress display.
///
/// [`execute`]: ImportRun::execute
pub struct ImportRun {
    run_id: RunId,
    settings: ImportSettings,
    connector: Arc<dyn StoreConnector>,
    jobs: Vec<(ImportJob, JobProgress)>,
    queue: TaskQueue,
    controller: CancellationController,
    progress: ProgressAggregator,
    metrics: Metrics,
}

impl ImportRun {
    pub fn new(
        settings: ImportSettings,
        connector: Arc<dyn StoreConnector>,
        jobs: Vec<ImportJob>,
    ) -> Self {
        let queue = TaskQueue::new(settings.queue_capacity());
        let controller = CancellationController::new(queue.clone());
        let mut progress = ProgressAggregator::new();
        let jobs = jobs
            .into_iter()
            .map(|job| {
                let p = JobProgress::new();
                progress.register(p.clone());
                (job, p)
            })
            .collect();

        Self {
            run_id: RunId::generate(),
            settings,
            connector,
            jobs,
            queue,
            controller,
            progress,
            metrics: Metrics::new(),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn controller(&self) -> CancellationController {
        self.controller.clone()
    }

    pub fn progress(&self) -> ProgressAggregator {
        self.progress.clone()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &ImportJob> {
        self.jobs.iter().map(|(job, _)| job)
    }

    /// Destination checks. Must succeed before [`ImportRun::execute`].
    pub async fn preflight(&mut self, options: PreflightOptions) -> Result<(), ImportError> {
        let cancel = self.controller.exit_token();
        let connector = &self.connector;
        let conn = self
            .settings
            .retry
            .run(&cancel, || connector.connect(), classify_store_error)
            .await
            .map_err(|e| match e {
                RetryError::Fatal(err) | RetryError::AttemptsExceeded(err) => {
                    ImportError::Unreachable(err)
                }
                RetryError::Cancelled => ImportError::Interrupted,
            })?;

        let mut jobs: Vec<ImportJob> = self.jobs.iter().map(|(job, _)| job.clone()).collect();
        preflight::check(conn.as_ref(), &mut jobs, options).await?;
        for ((job, _), checked) in self.jobs.iter_mut().zip(jobs) {
            *job = checked;
        }
        Ok(())
    }

    pub async fn execute(self) -> ImportReport {
        self.execute_with(|_| {}).await
    }

    /// Runs every job to completion, calling `on_tick` with the overall
    /// progress ratio on every poll.
    pub async fn execute_with<F>(self, mut on_tick: F) -> ImportReport
    where
        F: FnMut(f64),
    {
        let started = Instant::now();
        let (failures_tx, mut failures) = failure_channel();
        let ctx = WorkerContext {
            run_id: self.run_id.clone(),
            settings: self.settings.clone(),
            connector: self.connector.clone(),
            queue: self.queue.clone(),
            controller: self.controller.clone(),
            metrics: self.metrics.clone(),
            failures: failures_tx,
        };

        let sources: HashMap<_, _> = self
            .jobs
            .iter()
            .map(|(job, _)| (job.target.clone(), job.path.clone()))
            .collect();
        info!(run_id = %self.run_id, jobs = self.jobs.len(), "Starting import");

        let writers = workers::spawn_writers(&ctx, Arc::new(sources));
        let readers = workers::spawn_readers(&ctx, &self.jobs);
        drop(ctx);

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !all_finished(&readers) {
            ticker.tick().await;
            self.poll(&mut failures);
            on_tick(self.progress.report());
        }
        collect_panics(readers, "reader", &mut failures).await;

        // Readers are done; tell every live writer to stop once the queue is
        // drained. After cancellation writers leave on the exit token instead.
        let mut stops = if self.controller.is_exit_requested() {
            0
        } else {
            self.controller.alive_writers()
        };
        while !all_finished(&writers) {
            while stops > 0 && self.queue.try_push(Task::Stop) {
                stops -= 1;
            }
            ticker.tick().await;
            if self.poll(&mut failures) {
                stops = 0;
            }
            on_tick(self.progress.report());
        }
        collect_panics(writers, "writer", &mut failures).await;
        failures.drain();

        let interrupted = self.controller.is_interrupted();
        if !interrupted && !failures.has_failures() && !self.queue.is_empty() {
            failures.push(ImportFailure::new(
                FailureKind::Write,
                "Items remaining in the task queue",
            ));
        }
        let leftover = self.queue.drain().await;
        if leftover > 0 {
            warn!(batches = leftover, "Discarded unwritten batches");
        }

        let status = if interrupted {
            ImportStatus::Interrupted
        } else if failures.has_failures() {
            ImportStatus::Failed
        } else {
            on_tick(1.0);
            ImportStatus::Completed
        };

        let metrics = self.metrics.snapshot();
        let summary = ImportSummary {
            rows: metrics.rows_written,
            tables: self.jobs.len(),
            elapsed: started.elapsed(),
            metrics,
        };
        info!(run_id = %self.run_id, %status, %summary, elapsed = ?summary.elapsed, "Import finished");

        ImportReport {
            run_id: self.run_id,
            status,
            summary,
            failures: failures.into_failures(),
        }
    }

    /// Drains new failures; the first one cancels the run. Returns true if
    /// cancellation was triggered by this call.
    fn poll(&self, failures: &mut FailureCollector) -> bool {
        if failures.drain() > 0 {
            return self.controller.trigger(CancelReason::Failure);
        }
        false
    }
}

fn all_finished<T>(handles: &[JoinHandle<T>]) -> bool {
    handles.iter().all(JoinHandle::is_finished)
}

async fn collect_panics<T>(
    handles: Vec<JoinHandle<T>>,
    role: &str,
    failures: &mut FailureCollector,
) {
    for handle in handles {
        if let Err(err) = handle.await {
            failures.push(ImportFailure::new(
                FailureKind::Write,
                format!("{role} task failed: {err}"),
            ));
        }
    }
}

use model::execution::progress::JobProgress;

/// Completion ratio of a single job. A job that has not started counts as
/// zero; a job with nothing to read counts as done.
pub fn job_ratio(current: i64, total: i64) -> f64 {
    if current < 0 {
        0.0
    } else if total <= 0 {
        1.0
    } else {
        (current as f64 / total as f64).clamp(0.0, 1.0)
    }
}

/// Read-only view over every job's progress counter.
///
/// The overall ratio is the minimum across jobs: the slowest file bounds
/// what is shown.
#[derive(Debug, Clone, Default)]
pub struct ProgressAggregator {
    jobs: Vec<JobProgress>,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, progress: JobProgress) {
        self.jobs.push(progress);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Overall completion in `[0, 1]`. With no jobs at all, reports done.
    pub fn report(&self) -> f64 {
        self.jobs
            .iter()
            .map(|p| job_ratio(p.current(), p.total()))
            .reduce(f64::min)
            .unwrap_or(1.0)
    }
}

use engine_core::metrics::MetricsSnapshot;
use model::{core::identifiers::RunId, execution::failure::ImportFailure};
use std::{fmt, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    Completed,
    Failed,
    Interrupted,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Completed => "completed",
            ImportStatus::Failed => "failed",
            ImportStatus::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row/table totals for the final summary line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub rows: u64,
    pub tables: usize,
    pub elapsed: Duration,
    pub metrics: MetricsSnapshot,
}

fn plural(n: u64, word: &str) -> String {
    format!("{n} {word}{}", if n == 1 { "" } else { "s" })
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} imported in {}",
            plural(self.rows, "row"),
            plural(self.tables as u64, "table")
        )
    }
}

#[derive(Debug, Clone)]
pub struct ImportReport {
    pub run_id: RunId,
    pub status: ImportStatus,
    pub summary: ImportSummary,
    /// Every failure reported during the run, in arrival order.
    pub failures: Vec<ImportFailure>,
}

impl ImportReport {
    pub fn is_success(&self) -> bool {
        self.status == ImportStatus::Completed
    }
}

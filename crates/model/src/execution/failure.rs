use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Malformed input file.
    Format,
    /// The store stayed unreachable after reconnect attempts stopped making progress.
    Connection,
    /// Primary key collision that cannot be resolved safely.
    Conflict,
    /// Destination or option mismatch detected before or during setup.
    Precondition,
    /// The store rejected a write for any other reason.
    Write,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Format => "format",
            FailureKind::Connection => "connection",
            FailureKind::Conflict => "conflict",
            FailureKind::Precondition => "precondition",
            FailureKind::Write => "write",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured failure reported by a reader or writer unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Originating source file, when the failure belongs to one job.
    pub file: Option<PathBuf>,
    pub at: DateTime<Utc>,
}

impl ImportFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file: None,
            at: Utc::now(),
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl fmt::Display for ImportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(file) = &self.file {
            write!(f, "\nIn file: {}", file.display())?;
        }
        Ok(())
    }
}

use connectors::{
    file::error::FileError,
    store::{RowError, error::StoreError},
};
use model::{
    core::table::TableRef,
    execution::failure::{FailureKind, ImportFailure},
};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProducerError {
    /// Cancellation was observed. Not a failure; never reported.
    #[error("Interrupted")]
    Interrupted,

    #[error(transparent)]
    File(#[from] FileError),

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("The task queue was closed unexpectedly")]
    QueueClosed,

    #[error("Failed to prepare table `{table}`: {source}")]
    Prepare {
        table: TableRef,
        #[source]
        source: StoreError,
    },

    #[error("Retry attempts exhausted while preparing table `{table}`: {source}")]
    RetriesExhausted {
        table: TableRef,
        #[source]
        source: StoreError,
    },

    #[error("Reader task failed: {0}")]
    Join(String),
}

impl ProducerError {
    /// Structured failure for the error aggregator, or `None` when the
    /// reader merely stopped because of cancellation.
    pub fn to_failure(&self, file: &Path) -> Option<ImportFailure> {
        let kind = match self {
            ProducerError::Interrupted => return None,
            ProducerError::File(_) | ProducerError::Serialize(_) => FailureKind::Format,
            ProducerError::Prepare { .. } => FailureKind::Precondition,
            ProducerError::RetriesExhausted { .. } => FailureKind::Connection,
            ProducerError::QueueClosed | ProducerError::Join(_) => FailureKind::Write,
        };
        Some(ImportFailure::new(kind, self.to_string()).with_file(file))
    }
}

#[derive(Error, Debug)]
pub enum ConsumerError {
    /// Cancellation was observed while waiting to reconnect.
    #[error("Interrupted")]
    Interrupted,

    #[error("{0}")]
    Conflict(RowError),

    #[error(
        "Connection error while importing into `{table}`. Current row has no `{key_field}` field, so cannot guarantee absence of duplicates"
    )]
    MissingKey { table: TableRef, key_field: String },

    #[error("Error when importing into table `{table}`: {reason}")]
    Rejected { table: TableRef, reason: String },

    #[error("Failed to write batch '{batch_id}' to `{table}`: {source}")]
    Store {
        batch_id: String,
        table: TableRef,
        #[source]
        source: StoreError,
    },

    #[error("Circuit breaker opened for `{table}` after {failures} failed attempts: {last_error}")]
    CircuitBreakerOpen {
        table: TableRef,
        failures: u32,
        last_error: String,
    },
}

impl ConsumerError {
    pub fn from_row_error(table: &TableRef, error: RowError) -> Self {
        match error {
            RowError::DuplicateKey { .. } => ConsumerError::Conflict(error),
            RowError::Rejected(reason) => ConsumerError::Rejected {
                table: table.clone(),
                reason,
            },
        }
    }

    pub fn to_failure(&self, file: Option<&Path>) -> Option<ImportFailure> {
        let kind = match self {
            ConsumerError::Interrupted => return None,
            ConsumerError::Conflict(_) | ConsumerError::MissingKey { .. } => FailureKind::Conflict,
            ConsumerError::Rejected { .. } | ConsumerError::Store { .. } => FailureKind::Write,
            ConsumerError::CircuitBreakerOpen { .. } => FailureKind::Connection,
        };
        let failure = ImportFailure::new(kind, self.to_string());
        Some(match file {
            Some(file) => failure.with_file(file),
            None => failure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn interruption_is_not_a_failure() {
        assert!(ProducerError::Interrupted.to_failure(Path::new("a.json")).is_none());
        assert!(ConsumerError::Interrupted.to_failure(None).is_none());
    }

    #[test]
    fn format_errors_carry_the_file() {
        let err = ProducerError::from(FileError::ColumnCount {
            file: "a.csv".into(),
            line: 4,
        });
        let failure = err.to_failure(Path::new("data/a.csv")).unwrap();
        assert_eq!(failure.kind, FailureKind::Format);
        assert_eq!(failure.file, Some(PathBuf::from("data/a.csv")));
        assert!(failure.message.contains("line 4"));
    }

    #[test]
    fn duplicate_rows_map_to_conflicts() {
        let table = TableRef::new("test", "users");
        let err = ConsumerError::from_row_error(
            &table,
            RowError::DuplicateKey {
                key_field: "id".into(),
                stored: json!({"id": 1}),
                incoming: json!({"id": 1, "v": 2}),
            },
        );
        let failure = err.to_failure(None).unwrap();
        assert_eq!(failure.kind, FailureKind::Conflict);
        assert!(failure.message.starts_with("Duplicate primary key `id`"));
    }
}

use connectors::store::error::StoreError;
use model::core::table::TableRef;
use thiserror::Error;

/// Errors that stop a run before any worker starts. Failures during the
/// run itself are collected as `ImportFailure`s instead.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Nothing to import")]
    NoJobs,

    #[error("Cannot import into the system database `{0}`")]
    SystemDatabase(String),

    #[error(
        "The following tables already exist, run with --force to import into the existing tables: {}",
        .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    )]
    TablesExist(Vec<TableRef>),

    #[error(
        "Table `{table}` already exists with a different primary key: `{existing}` (import uses `{requested}`)"
    )]
    PrimaryKeyMismatch {
        table: TableRef,
        existing: String,
        requested: String,
    },

    #[error("Store error during preflight: {0}")]
    Store(#[from] StoreError),

    #[error("Could not reach the store: {0}")]
    Unreachable(StoreError),

    #[error("Interrupted")]
    Interrupted,
}

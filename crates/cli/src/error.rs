use connectors::store::error::StoreError;
use engine_runtime::error::ImportError;
use model::{
    core::table::TableRef,
    execution::job::UnknownFormat,
};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid table info file '{path}': {source}")]
    InfoFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Duplicate db.table found in directory tree: {0}")]
    DuplicateTable(TableRef),

    #[error(transparent)]
    InvalidTable(#[from] model::core::table::TableRefError),

    #[error(transparent)]
    UnknownFormat(#[from] UnknownFormat),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("Connection check failed: {0}")]
    Store(#[from] StoreError),
}

impl CliError {
    pub fn usage(message: impl Into<String>) -> Self {
        CliError::Usage(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CliError::Io {
            path: path.into(),
            source,
        }
    }
}

use model::core::table::TableRef;
use thiserror::Error;

/// Errors raised by a store connection.
///
/// `Connection` is the transient class: the session is gone and the call
/// may be retried on a new one. `Postgres` is split further by the caller
/// using SQLSTATE codes. Everything else is an application error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Database `{0}` does not exist")]
    DatabaseNotFound(String),

    #[error("Database `{0}` already exists")]
    DatabaseExists(String),

    #[error("Table `{0}` does not exist")]
    TableNotFound(TableRef),

    #[error("Table `{0}` already exists")]
    TableExists(TableRef),

    #[error("Query failed: {0}")]
    Application(String),

    #[error("Invalid connection settings: {0}")]
    InvalidSettings(String),

    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("TLS configuration error: {0}")]
    Tls(#[from] native_tls::Error),
}

impl StoreError {
    pub fn connection(message: impl Into<String>) -> Self {
        StoreError::Connection(message.into())
    }
}

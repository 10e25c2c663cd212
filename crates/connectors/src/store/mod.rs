use crate::store::error::StoreError;
use async_trait::async_trait;
use model::{
    core::table::TableRef,
    execution::write::WriteOptions,
    records::record::Record,
};
use serde_json::Value;
use std::fmt;

pub mod error;
pub mod memory;
pub mod postgres;

/// Where and how to reach the target store. Values arrive already
/// validated by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    pub tls: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: None,
            database: "postgres".to_string(),
            tls: false,
        }
    }
}

impl ConnectionSettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }
}

impl fmt::Display for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub primary_key: String,
}

/// Per-row failure reported by an insert. Rows that fail this way are not
/// retried; the store has already made its decision about them.
#[derive(Debug, Clone, PartialEq)]
pub enum RowError {
    DuplicateKey {
        key_field: String,
        stored: Value,
        incoming: Value,
    },
    Rejected(String),
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowError::DuplicateKey {
                key_field,
                stored,
                incoming,
            } => write!(f, "Duplicate primary key `{key_field}`:\n{stored}\n{incoming}"),
            RowError::Rejected(reason) => f.write_str(reason),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertOutcome {
    pub inserted: u64,
    pub replaced: u64,
    pub errors: u64,
    pub first_error: Option<RowError>,
}

impl InsertOutcome {
    pub fn committed(&self) -> u64 {
        self.inserted + self.replaced
    }

    pub(crate) fn record_error(&mut self, error: RowError) {
        self.errors += 1;
        if self.first_error.is_none() {
            self.first_error = Some(error);
        }
    }
}

/// Opens connections to a target store. Shared by every worker, so it must
/// be cheap to call repeatedly.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError>;

    fn describe(&self) -> String;
}

/// One live session with the target store.
///
/// Every call may fail with a connection-class error, after which the
/// connection must be discarded and a new one opened.
#[async_trait]
pub trait StoreConnection: Send + Sync {
    async fn insert(
        &self,
        table: &TableRef,
        rows: &[Record],
        options: WriteOptions,
    ) -> Result<InsertOutcome, StoreError>;

    async fn create_table(&self, table: &TableRef, primary_key: &str) -> Result<(), StoreError>;

    async fn get_row(&self, table: &TableRef, key: &Value) -> Result<Option<Record>, StoreError>;

    async fn list_tables(&self, db: &str) -> Result<Vec<String>, StoreError>;

    async fn list_databases(&self) -> Result<Vec<String>, StoreError>;

    async fn create_database(&self, db: &str) -> Result<(), StoreError>;

    async fn table_info(&self, table: &TableRef) -> Result<TableInfo, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duplicate_key_message_shows_both_rows() {
        let err = RowError::DuplicateKey {
            key_field: "id".into(),
            stored: json!({"id": 1}),
            incoming: json!({"id": 1, "v": "a"}),
        };
        assert_eq!(
            err.to_string(),
            "Duplicate primary key `id`:\n{\"id\":1}\n{\"id\":1,\"v\":\"a\"}"
        );
    }

    #[test]
    fn outcome_keeps_first_error_only() {
        let mut outcome = InsertOutcome::default();
        outcome.record_error(RowError::Rejected("first".into()));
        outcome.record_error(RowError::Rejected("second".into()));
        assert_eq!(outcome.errors, 2);
        assert_eq!(outcome.first_error, Some(RowError::Rejected("first".into())));
    }
}

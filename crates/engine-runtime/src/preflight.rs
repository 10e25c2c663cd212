//! One-time destination checks run before any worker starts.

use crate::error::ImportError;
use connectors::store::StoreConnection;
use model::{core::table::TableRef, execution::job::ImportJob};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Databases that imports may never write into.
pub const RESERVED_DATABASES: &[&str] = &["rethinkdb", "information_schema", "pg_catalog"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreflightOptions {
    /// Allow importing into tables that already exist.
    pub force: bool,
    /// Take the primary key of an existing table instead of insisting on
    /// the job's. Used for single-file imports without an explicit key.
    pub adopt_primary_key: bool,
}

/// Validates every job's destination and creates missing databases.
///
/// Existing tables are refused unless `force` is set, and an existing
/// table's primary key must match the job's (or is adopted, see
/// [`PreflightOptions::adopt_primary_key`]).
pub async fn check(
    conn: &dyn StoreConnection,
    jobs: &mut [ImportJob],
    options: PreflightOptions,
) -> Result<(), ImportError> {
    if jobs.is_empty() {
        return Err(ImportError::NoJobs);
    }

    if let Some(job) = jobs
        .iter()
        .find(|job| RESERVED_DATABASES.contains(&job.target.db.as_str()))
    {
        return Err(ImportError::SystemDatabase(job.target.db.clone()));
    }

    let wanted: BTreeSet<&str> = jobs.iter().map(|job| job.target.db.as_str()).collect();
    let existing: BTreeSet<String> = conn.list_databases().await?.into_iter().collect();
    for db in wanted.iter().filter(|db| !existing.contains(**db)) {
        info!(db, "Creating database");
        conn.create_database(db).await?;
    }

    let mut already_exist: Vec<TableRef> = Vec::new();
    for job in jobs.iter_mut() {
        let tables = conn.list_tables(&job.target.db).await?;
        if !tables.iter().any(|t| t == &job.target.table) {
            debug!(table = %job.target, "Table will be created");
            continue;
        }

        if !options.force {
            already_exist.push(job.target.clone());
            continue;
        }

        let existing_key = conn.table_info(&job.target).await?.primary_key;
        if options.adopt_primary_key {
            job.primary_key = existing_key;
        } else if existing_key != job.primary_key {
            return Err(ImportError::PrimaryKeyMismatch {
                table: job.target.clone(),
                existing: existing_key,
                requested: job.primary_key.clone(),
            });
        }
    }

    if !already_exist.is_empty() {
        return Err(ImportError::TablesExist(already_exist));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::store::{StoreConnector, memory::MemoryStore};
    use model::execution::job::FileFormat;

    fn job(db: &str, table: &str) -> ImportJob {
        ImportJob::new(format!("{table}.json"), FileFormat::Json, TableRef::new(db, table))
    }

    #[tokio::test]
    async fn creates_missing_databases() {
        let store = MemoryStore::new();
        let conn = store.connect().await.unwrap();
        let mut jobs = vec![job("a", "t1"), job("b", "t2"), job("a", "t3")];

        check(conn.as_ref(), &mut jobs, PreflightOptions::default())
            .await
            .unwrap();
        assert!(store.has_database("a"));
        assert!(store.has_database("b"));
    }

    #[tokio::test]
    async fn refuses_system_database() {
        let store = MemoryStore::new();
        let conn = store.connect().await.unwrap();
        let mut jobs = vec![job("rethinkdb", "stats")];
        let err = check(conn.as_ref(), &mut jobs, PreflightOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::SystemDatabase(db) if db == "rethinkdb"));
    }

    #[tokio::test]
    async fn lists_every_existing_table_without_force() {
        let store = MemoryStore::new();
        store.ensure_table(&TableRef::new("a", "t1"), "id");
        store.ensure_table(&TableRef::new("a", "t2"), "id");
        let conn = store.connect().await.unwrap();
        let mut jobs = vec![job("a", "t1"), job("a", "t2"), job("a", "t3")];

        let err = check(conn.as_ref(), &mut jobs, PreflightOptions::default())
            .await
            .unwrap_err();
        match err {
            ImportError::TablesExist(tables) => assert_eq!(tables.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn force_checks_primary_keys() {
        let store = MemoryStore::new();
        store.ensure_table(&TableRef::new("a", "t1"), "uid");
        let conn = store.connect().await.unwrap();
        let force = PreflightOptions {
            force: true,
            adopt_primary_key: false,
        };

        let mut jobs = vec![job("a", "t1")];
        let err = check(conn.as_ref(), &mut jobs, force).await.unwrap_err();
        assert!(matches!(err, ImportError::PrimaryKeyMismatch { ref existing, .. } if existing == "uid"));

        let mut jobs = vec![job("a", "t1").with_primary_key("uid")];
        check(conn.as_ref(), &mut jobs, force).await.unwrap();
    }

    #[tokio::test]
    async fn single_file_adopts_existing_key() {
        let store = MemoryStore::new();
        store.ensure_table(&TableRef::new("a", "t1"), "uid");
        let conn = store.connect().await.unwrap();
        let mut jobs = vec![job("a", "t1")];

        check(
            conn.as_ref(),
            &mut jobs,
            PreflightOptions {
                force: true,
                adopt_primary_key: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(jobs[0].primary_key, "uid");
    }
}

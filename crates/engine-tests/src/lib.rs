#![allow(dead_code)]

use connectors::store::{ConnectionSettings, StoreConnector, memory::MemoryStore};
use engine_core::{
    retry::RetryPolicy,
    settings::{ImportSettings, ReconnectSettings},
};
use engine_runtime::{
    error::ImportError,
    execution::{executor::ImportRun, summary::ImportReport},
    preflight::PreflightOptions,
};
use model::execution::job::ImportJob;
use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

pub mod integration;
pub mod postgres;
pub mod utils;

pub use utils::rec;

// Local database used by the ignored Postgres tests.
const TEST_PG_HOST: &str = "localhost";
const TEST_PG_PORT: u16 = 5432;
const TEST_PG_USER: &str = "user";
const TEST_PG_PASSWORD: &str = "password";
const TEST_PG_DATABASE: &str = "testdb";

fn pg_settings() -> ConnectionSettings {
    ConnectionSettings::new(TEST_PG_HOST, TEST_PG_PORT)
        .with_user(TEST_PG_USER)
        .with_password(Some(TEST_PG_PASSWORD.to_string()))
        .with_database(TEST_PG_DATABASE)
}

/// Settings tuned for tests: no backoff, fast polling, a small pool.
pub fn test_settings(clients: usize) -> ImportSettings {
    ImportSettings::default()
        .with_clients(NonZeroUsize::new(clients).unwrap_or(NonZeroUsize::MIN))
        .with_poll_interval(Duration::from_millis(10))
        .with_retry(RetryPolicy::immediate(3))
        .with_reconnect(ReconnectSettings {
            threshold: 5,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        })
}

/// Writes `contents` to `dir/name` and returns the full path.
pub fn write_fixture(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture dir");
    }
    fs::write(&path, contents).expect("write fixture");
    path
}

/// Preflight and execute, panicking on preflight errors.
pub async fn import(
    connector: Arc<dyn StoreConnector>,
    settings: ImportSettings,
    jobs: Vec<ImportJob>,
    options: PreflightOptions,
) -> ImportReport {
    try_import(connector, settings, jobs, options)
        .await
        .expect("preflight")
}

pub async fn try_import(
    connector: Arc<dyn StoreConnector>,
    settings: ImportSettings,
    jobs: Vec<ImportJob>,
    options: PreflightOptions,
) -> Result<ImportReport, ImportError> {
    let mut run = ImportRun::new(settings, connector, jobs);
    run.preflight(options).await?;
    Ok(run.execute().await)
}

/// Executes without preflight, for scenarios that start from a table the
/// checks would refuse.
pub async fn import_unchecked(
    store: &MemoryStore,
    settings: ImportSettings,
    jobs: Vec<ImportJob>,
) -> ImportReport {
    ImportRun::new(settings, Arc::new(store.clone()), jobs)
        .execute()
        .await
}

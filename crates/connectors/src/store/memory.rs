//! In-process store used by tests and dry runs.
//!
//! Behaves like the real backend where it matters to the pipeline: rows are
//! keyed by primary key, rows without one get a generated key, duplicate
//! keys are reported per row, and faults can be injected to exercise the
//! reconnect and resume paths.

use crate::store::{
    InsertOutcome, RowError, StoreConnection, StoreConnector, TableInfo, error::StoreError,
};
use async_trait::async_trait;
use model::{
    core::table::TableRef,
    execution::write::{ConflictPolicy, WriteOptions},
    records::record::Record,
};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct MemoryTable {
    primary_key: String,
    rows: BTreeMap<String, Record>,
}

#[derive(Debug, Default)]
struct Faults {
    refuse_connects: u32,
    disconnect_after_rows: Option<u64>,
    insert_latency: Option<Duration>,
}

/// Counters describing what the store has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub connects: u64,
    pub refused_connects: u64,
    pub disconnects: u64,
    pub insert_calls: u64,
    pub rows_written: u64,
}

#[derive(Debug, Default)]
struct State {
    databases: BTreeMap<String, BTreeMap<String, MemoryTable>>,
    faults: Faults,
    stats: MemoryStats,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

fn key_of(value: &Value) -> String {
    value.to_string()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates the database and table if missing. Existing tables keep
    /// their rows and primary key.
    pub fn ensure_table(&self, table: &TableRef, primary_key: &str) {
        let mut state = self.lock();
        state
            .databases
            .entry(table.db.clone())
            .or_default()
            .entry(table.table.clone())
            .or_insert_with(|| MemoryTable {
                primary_key: primary_key.to_string(),
                rows: BTreeMap::new(),
            });
    }

    pub fn ensure_database(&self, db: &str) {
        self.lock().databases.entry(db.to_string()).or_default();
    }

    /// Stores a row directly, bypassing faults and conflict checks.
    pub fn put_row(&self, table: &TableRef, record: Record) -> Result<(), StoreError> {
        let mut state = self.lock();
        let entry = table_mut(&mut state, table)?;
        let key = match record.get(&entry.primary_key) {
            Some(value) => key_of(value),
            None => {
                return Err(StoreError::Application(format!(
                    "row has no `{}` field",
                    entry.primary_key
                )));
            }
        };
        entry.rows.insert(key, record);
        Ok(())
    }

    /// All rows of a table ordered by key.
    pub fn rows(&self, table: &TableRef) -> Vec<Record> {
        let state = self.lock();
        state
            .databases
            .get(&table.db)
            .and_then(|tables| tables.get(&table.table))
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &TableRef) -> usize {
        let state = self.lock();
        state
            .databases
            .get(&table.db)
            .and_then(|tables| tables.get(&table.table))
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    pub fn has_table(&self, table: &TableRef) -> bool {
        let state = self.lock();
        state
            .databases
            .get(&table.db)
            .is_some_and(|tables| tables.contains_key(&table.table))
    }

    pub fn has_database(&self, db: &str) -> bool {
        self.lock().databases.contains_key(db)
    }

    /// The next `count` connection attempts fail with a connection error.
    pub fn refuse_connects(&self, count: u32) {
        self.lock().faults.refuse_connects = count;
    }

    /// After `rows` more rows are committed, the connection that committed
    /// them drops in the middle of its insert. Fires once.
    pub fn disconnect_after_rows(&self, rows: u64) {
        self.lock().faults.disconnect_after_rows = Some(rows);
    }

    /// Every insert sleeps this long before touching the tables.
    pub fn set_insert_latency(&self, latency: Duration) {
        self.lock().faults.insert_latency = Some(latency);
    }

    pub fn stats(&self) -> MemoryStats {
        self.lock().stats
    }
}

fn table_mut<'a>(state: &'a mut State, table: &TableRef) -> Result<&'a mut MemoryTable, StoreError> {
    let tables = state
        .databases
        .get_mut(&table.db)
        .ok_or_else(|| StoreError::DatabaseNotFound(table.db.clone()))?;
    tables
        .get_mut(&table.table)
        .ok_or_else(|| StoreError::TableNotFound(table.clone()))
}

fn table_ref<'a>(state: &'a State, table: &TableRef) -> Result<&'a MemoryTable, StoreError> {
    let tables = state
        .databases
        .get(&table.db)
        .ok_or_else(|| StoreError::DatabaseNotFound(table.db.clone()))?;
    tables
        .get(&table.table)
        .ok_or_else(|| StoreError::TableNotFound(table.clone()))
}

#[async_trait]
impl StoreConnector for MemoryStore {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        let mut state = self.lock();
        if state.faults.refuse_connects > 0 {
            state.faults.refuse_connects -= 1;
            state.stats.refused_connects += 1;
            return Err(StoreError::connection("connection refused"));
        }
        state.stats.connects += 1;
        Ok(Box::new(MemoryConnection {
            store: self.clone(),
            broken: AtomicBool::new(false),
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

pub struct MemoryConnection {
    store: MemoryStore,
    broken: AtomicBool,
}

impl MemoryConnection {
    fn check(&self) -> Result<(), StoreError> {
        if self.broken.load(Ordering::Acquire) {
            Err(StoreError::connection("connection closed"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn insert(
        &self,
        table: &TableRef,
        rows: &[Record],
        options: WriteOptions,
    ) -> Result<InsertOutcome, StoreError> {
        self.check()?;
        let latency = self.store.lock().faults.insert_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.store.lock();
        state.stats.insert_calls += 1;
        let mut disconnect_after = state.faults.disconnect_after_rows;
        let mut outcome = InsertOutcome::default();
        let mut written = 0u64;
        let mut dropped = false;

        {
            let entry = table_mut(&mut state, table)?;
            for row in rows {
                if disconnect_after == Some(0) {
                    dropped = true;
                    break;
                }

                let mut row = row.clone();
                let key = match row.get(&entry.primary_key) {
                    Some(value) => key_of(value),
                    None => {
                        let generated = Value::String(Uuid::new_v4().to_string());
                        let key = key_of(&generated);
                        row.insert(entry.primary_key.clone(), generated);
                        key
                    }
                };

                match (entry.rows.get(&key), options.conflict) {
                    (Some(stored), ConflictPolicy::Error) => {
                        outcome.record_error(RowError::DuplicateKey {
                            key_field: entry.primary_key.clone(),
                            stored: Value::Object(stored.clone()),
                            incoming: Value::Object(row),
                        });
                        continue;
                    }
                    (Some(_), ConflictPolicy::Replace) => outcome.replaced += 1,
                    (None, _) => outcome.inserted += 1,
                }
                entry.rows.insert(key, row);
                written += 1;
                disconnect_after = disconnect_after.map(|n| n.saturating_sub(1));
            }
        }

        state.stats.rows_written += written;
        if dropped {
            state.faults.disconnect_after_rows = None;
            state.stats.disconnects += 1;
            self.broken.store(true, Ordering::Release);
            debug!(table = %table, committed = written, "Injected disconnect mid-insert");
            return Err(StoreError::connection("connection reset during insert"));
        }
        state.faults.disconnect_after_rows = disconnect_after;
        Ok(outcome)
    }

    async fn create_table(&self, table: &TableRef, primary_key: &str) -> Result<(), StoreError> {
        self.check()?;
        let mut state = self.store.lock();
        let tables = state
            .databases
            .get_mut(&table.db)
            .ok_or_else(|| StoreError::DatabaseNotFound(table.db.clone()))?;
        if tables.contains_key(&table.table) {
            return Err(StoreError::TableExists(table.clone()));
        }
        tables.insert(
            table.table.clone(),
            MemoryTable {
                primary_key: primary_key.to_string(),
                rows: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn get_row(&self, table: &TableRef, key: &Value) -> Result<Option<Record>, StoreError> {
        self.check()?;
        let state = self.store.lock();
        let entry = table_ref(&state, table)?;
        Ok(entry.rows.get(&key_of(key)).cloned())
    }

    async fn list_tables(&self, db: &str) -> Result<Vec<String>, StoreError> {
        self.check()?;
        let state = self.store.lock();
        state
            .databases
            .get(db)
            .map(|tables| tables.keys().cloned().collect())
            .ok_or_else(|| StoreError::DatabaseNotFound(db.to_string()))
    }

    async fn list_databases(&self) -> Result<Vec<String>, StoreError> {
        self.check()?;
        Ok(self.store.lock().databases.keys().cloned().collect())
    }

    async fn create_database(&self, db: &str) -> Result<(), StoreError> {
        self.check()?;
        let mut state = self.store.lock();
        if state.databases.contains_key(db) {
            return Err(StoreError::DatabaseExists(db.to_string()));
        }
        state.databases.insert(db.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn table_info(&self, table: &TableRef) -> Result<TableInfo, StoreError> {
        self.check()?;
        let state = self.store.lock();
        let entry = table_ref(&state, table)?;
        Ok(TableInfo {
            primary_key: entry.primary_key.clone(),
        })
    }
}

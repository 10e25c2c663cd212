//! Postgres backend. A database maps to a schema and every table stores
//! whole documents as `jsonb`, keyed by a `jsonb` primary-key column named
//! after the document's primary-key field.

use crate::store::{
    ConnectionSettings, InsertOutcome, RowError, StoreConnection, StoreConnector, TableInfo,
    error::StoreError,
};
use async_trait::async_trait;
use model::{
    core::table::TableRef,
    execution::write::{ConflictPolicy, Durability, WriteOptions},
    records::record::Record,
};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{self, PoisonError},
};
use tokio::sync::Mutex;
use tokio_postgres::{Client, Config, NoTls, config::SslMode};
use tracing::{debug, error, warn};
use uuid::Uuid;

const SYSTEM_SCHEMAS: &[&str] = &["information_schema", "public"];

const QUERY_LIST_SCHEMAS: &str = "SELECT nspname FROM pg_namespace \
     WHERE nspname NOT LIKE 'pg\\_%' ORDER BY nspname";

const QUERY_LIST_TABLES: &str = "SELECT table_name FROM information_schema.tables \
     WHERE table_schema = $1 AND table_type = 'BASE TABLE' ORDER BY table_name";

const QUERY_SCHEMA_EXISTS: &str = "SELECT 1 FROM pg_namespace WHERE nspname = $1";

const QUERY_PRIMARY_KEY: &str = "SELECT a.attname::text FROM pg_index i \
     JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
     WHERE i.indrelid = to_regclass($1::text) AND i.indisprimary";

pub struct PgConnector {
    settings: ConnectionSettings,
}

impl PgConnector {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings }
    }

    fn config(&self) -> Config {
        let mut config = Config::new();
        config
            .host(&self.settings.host)
            .port(self.settings.port)
            .user(&self.settings.user)
            .dbname(&self.settings.database)
            .application_name("bulkload")
            .ssl_mode(if self.settings.tls {
                SslMode::Prefer
            } else {
                SslMode::Disable
            });
        if let Some(password) = &self.settings.password {
            config.password(password);
        }
        config
    }
}

#[async_trait]
impl StoreConnector for PgConnector {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        let client = connect_client(self.config()).await?;
        debug!(target = %self.settings, "Connected to Postgres");
        Ok(Box::new(PgConnection {
            client: Mutex::new(client),
            keys: KeyCache::default(),
        }))
    }

    fn describe(&self) -> String {
        self.settings.to_string()
    }
}

async fn connect_client(config: Config) -> Result<Client, StoreError> {
    match config.get_ssl_mode() {
        SslMode::Disable => connect_without_tls(config).await,
        SslMode::Prefer => match connect_with_tls(config.clone()).await {
            Ok(client) => Ok(client),
            Err(error) => {
                warn!(%error, "Postgres TLS handshake failed, retrying without TLS");
                connect_without_tls(config).await
            }
        },
        _ => connect_with_tls(config).await,
    }
}

async fn connect_with_tls(config: Config) -> Result<Client, StoreError> {
    let connector = TlsConnector::builder().build()?;
    let tls = MakeTlsConnector::new(connector);
    let (client, connection) = config
        .connect(tls)
        .await
        .map_err(|e| StoreError::connection(e.to_string()))?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, "Postgres connection error");
        }
    });
    Ok(client)
}

async fn connect_without_tls(config: Config) -> Result<Client, StoreError> {
    let (client, connection) = config
        .connect(NoTls)
        .await
        .map_err(|e| StoreError::connection(e.to_string()))?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, "Postgres connection error");
        }
    });
    Ok(client)
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn qualified(table: &TableRef) -> String {
    format!("{}.{}", quote_ident(&table.db), quote_ident(&table.table))
}

/// Ensures every row carries its primary key, generating one when absent.
fn keyed_rows(rows: &[Record], primary_key: &str) -> Vec<(Value, Record)> {
    rows.iter()
        .map(|row| {
            let mut row = row.clone();
            let key = row
                .entry(primary_key.to_string())
                .or_insert_with(|| Value::String(Uuid::new_v4().to_string()))
                .clone();
            (key, row)
        })
        .collect()
}

/// Primary-key field per table, looked up at most once per connection.
/// Only successful lookups are kept.
#[derive(Debug, Default)]
struct KeyCache {
    keys: sync::Mutex<HashMap<TableRef, String>>,
}

impl KeyCache {
    fn get(&self, table: &TableRef) -> Option<String> {
        let keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        keys.get(table).cloned()
    }

    fn insert(&self, table: &TableRef, primary_key: &str) {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        keys.insert(table.clone(), primary_key.to_string());
    }

    async fn get_or_fetch<F, Fut>(&self, table: &TableRef, fetch: F) -> Result<String, StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, StoreError>>,
    {
        if let Some(primary_key) = self.get(table) {
            return Ok(primary_key);
        }
        let primary_key = fetch().await?;
        self.insert(table, &primary_key);
        Ok(primary_key)
    }
}

pub struct PgConnection {
    client: Mutex<Client>,
    keys: KeyCache,
}

impl PgConnection {
    async fn primary_key(&self, table: &TableRef) -> Result<String, StoreError> {
        self.keys
            .get_or_fetch(table, move || async move {
                let client = self.client.lock().await;
                let rows = client.query(QUERY_PRIMARY_KEY, &[&qualified(table)]).await?;
                match rows.first() {
                    Some(row) => Ok(row.try_get(0)?),
                    None => Err(StoreError::TableNotFound(table.clone())),
                }
            })
            .await
    }
}

#[async_trait]
impl StoreConnection for PgConnection {
    async fn insert(
        &self,
        table: &TableRef,
        rows: &[Record],
        options: WriteOptions,
    ) -> Result<InsertOutcome, StoreError> {
        let primary_key = self.primary_key(table).await?;
        let pk = quote_ident(&primary_key);
        let mut keyed = keyed_rows(rows, &primary_key);

        if options.conflict.overwrites() {
            // A single statement cannot update the same key twice; the last
            // occurrence wins, as it would with row-by-row replaces.
            let mut last: HashMap<String, usize> = HashMap::new();
            for (i, (key, _)) in keyed.iter().enumerate() {
                last.insert(key.to_string(), i);
            }
            let mut index = 0;
            keyed.retain(|(key, _)| {
                let keep = last.get(&key.to_string()) == Some(&index);
                index += 1;
                keep
            });
        }

        let docs = Value::Array(keyed.iter().map(|(_, r)| Value::Object(r.clone())).collect());
        let statement = match options.conflict {
            ConflictPolicy::Replace => format!(
                "INSERT INTO {t} ({pk}, doc) SELECT e->$2::text, e FROM jsonb_array_elements($1::jsonb) AS e \
                 ON CONFLICT ({pk}) DO UPDATE SET doc = EXCLUDED.doc RETURNING {pk}, (xmax = 0)",
                t = qualified(table),
            ),
            ConflictPolicy::Error => format!(
                "INSERT INTO {t} ({pk}, doc) SELECT e->$2::text, e FROM jsonb_array_elements($1::jsonb) AS e \
                 ON CONFLICT ({pk}) DO NOTHING RETURNING {pk}, true",
                t = qualified(table),
            ),
        };

        let returned = {
            let mut client = self.client.lock().await;
            let tx = client.transaction().await?;
            if options.durability == Durability::Soft {
                tx.execute("SET LOCAL synchronous_commit TO OFF", &[]).await?;
            }
            let returned = tx.query(statement.as_str(), &[&docs, &primary_key]).await?;
            tx.commit().await?;
            returned
        };

        let mut outcome = InsertOutcome::default();
        let mut committed: HashMap<String, usize> = HashMap::new();
        for row in &returned {
            let key: Value = row.try_get(0)?;
            let fresh: bool = row.try_get(1)?;
            if fresh {
                outcome.inserted += 1;
            } else {
                outcome.replaced += 1;
            }
            *committed.entry(key.to_string()).or_default() += 1;
        }

        for (key, row) in keyed {
            let slot = committed.get_mut(&key.to_string());
            match slot {
                Some(n) if *n > 0 => *n -= 1,
                _ => {
                    let stored = self
                        .get_row(table, &key)
                        .await?
                        .map(Value::Object)
                        .unwrap_or(Value::Null);
                    outcome.record_error(RowError::DuplicateKey {
                        key_field: primary_key.clone(),
                        stored,
                        incoming: Value::Object(row),
                    });
                }
            }
        }

        debug!(table = %table, inserted = outcome.inserted, replaced = outcome.replaced, errors = outcome.errors, "Insert applied");
        Ok(outcome)
    }

    async fn create_table(&self, table: &TableRef, primary_key: &str) -> Result<(), StoreError> {
        let client = self.client.lock().await;
        let statement = format!(
            "CREATE TABLE {} ({} jsonb PRIMARY KEY, doc jsonb NOT NULL)",
            qualified(table),
            quote_ident(primary_key)
        );
        client.batch_execute(&statement).await?;
        self.keys.insert(table, primary_key);
        Ok(())
    }

    async fn get_row(&self, table: &TableRef, key: &Value) -> Result<Option<Record>, StoreError> {
        let primary_key = self.primary_key(table).await?;
        let statement = format!(
            "SELECT doc FROM {} WHERE {} = $1::jsonb",
            qualified(table),
            quote_ident(&primary_key)
        );
        let client = self.client.lock().await;
        let row = client.query_opt(statement.as_str(), &[key]).await?;
        match row {
            Some(row) => match row.try_get::<_, Value>(0)? {
                Value::Object(doc) => Ok(Some(doc)),
                other => Err(StoreError::Application(format!(
                    "stored document in {table} is not an object: {other}"
                ))),
            },
            None => Ok(None),
        }
    }

    async fn list_tables(&self, db: &str) -> Result<Vec<String>, StoreError> {
        let client = self.client.lock().await;
        if client.query_opt(QUERY_SCHEMA_EXISTS, &[&db]).await?.is_none() {
            return Err(StoreError::DatabaseNotFound(db.to_string()));
        }
        let rows = client.query(QUERY_LIST_TABLES, &[&db]).await?;
        rows.iter()
            .map(|row| row.try_get(0).map_err(StoreError::from))
            .collect()
    }

    async fn list_databases(&self) -> Result<Vec<String>, StoreError> {
        let client = self.client.lock().await;
        let rows = client.query(QUERY_LIST_SCHEMAS, &[]).await?;
        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get(0)?;
            if !SYSTEM_SCHEMAS.contains(&name.as_str()) {
                names.push(name);
            }
        }
        Ok(names)
    }

    async fn create_database(&self, db: &str) -> Result<(), StoreError> {
        let client = self.client.lock().await;
        if client.query_opt(QUERY_SCHEMA_EXISTS, &[&db]).await?.is_some() {
            return Err(StoreError::DatabaseExists(db.to_string()));
        }
        client
            .batch_execute(&format!("CREATE SCHEMA {}", quote_ident(db)))
            .await?;
        Ok(())
    }

    async fn table_info(&self, table: &TableRef) -> Result<TableInfo, StoreError> {
        Ok(TableInfo {
            primary_key: self.primary_key(table).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(
            qualified(&TableRef::new("test", "users")),
            "\"test\".\"users\""
        );
    }

    #[test]
    fn rows_without_key_get_one() {
        let rows = vec![
            json!({"id": 7}).as_object().cloned().unwrap(),
            json!({"v": 1}).as_object().cloned().unwrap(),
        ];
        let keyed = keyed_rows(&rows, "id");
        assert_eq!(keyed[0].0, json!(7));
        assert!(keyed[1].0.is_string());
        assert_eq!(keyed[1].1.get("id"), Some(&keyed[1].0));
    }

    #[tokio::test]
    async fn primary_keys_are_fetched_once_per_table() {
        let cache = KeyCache::default();
        let users = TableRef::new("test", "users");
        let counter = AtomicUsize::new(0);
        let fetches = &counter;
        let fetch = move || async move {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok("uid".to_string())
        };

        assert_eq!(cache.get_or_fetch(&users, fetch).await.unwrap(), "uid");
        assert_eq!(cache.get_or_fetch(&users, fetch).await.unwrap(), "uid");
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        cache.insert(&TableRef::new("test", "orders"), "id");
        let orders = cache
            .get_or_fetch(&TableRef::new("test", "orders"), || async {
                Err(StoreError::Application("unexpected lookup".into()))
            })
            .await
            .unwrap();
        assert_eq!(orders, "id");
    }

    #[tokio::test]
    async fn failed_lookups_are_not_cached() {
        let cache = KeyCache::default();
        let missing = TableRef::new("test", "missing");

        let err = cache
            .get_or_fetch(&missing, || async {
                Err(StoreError::TableNotFound(TableRef::new("test", "missing")))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TableNotFound(_)));
        assert_eq!(cache.get(&missing), None);
    }

    #[test]
    fn config_follows_settings() {
        let settings = ConnectionSettings::new("db.internal", 6543)
            .with_user("loader")
            .with_password(Some("secret".into()))
            .with_tls(true);
        let config = PgConnector::new(settings).config();
        assert_eq!(config.get_ports(), &[6543]);
        assert_eq!(config.get_user(), Some("loader"));
        assert_eq!(config.get_ssl_mode(), SslMode::Prefer);
    }
}

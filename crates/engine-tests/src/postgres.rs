//! Round trips against a local Postgres. Run with `--ignored` once the
//! database from `pg_settings` is up.

use crate::pg_settings;
use tokio_postgres::NoTls;

/// Drops the schema backing `db` so each test starts from scratch.
pub async fn reset_database(db: &str) {
    let settings = pg_settings();
    let conn_str = format!(
        "host={} port={} user={} password={} dbname={}",
        settings.host,
        settings.port,
        settings.user,
        settings.password.as_deref().unwrap_or_default(),
        settings.database
    );
    let (client, connection) = tokio_postgres::connect(&conn_str, NoTls)
        .await
        .expect("connect to test database");
    tokio::spawn(connection);
    client
        .batch_execute(&format!("DROP SCHEMA IF EXISTS \"{db}\" CASCADE"))
        .await
        .expect("drop schema");
}

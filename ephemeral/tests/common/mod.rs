//! Shared helpers for the Postgres-backed integration tests

#![allow(dead_code)]

use ephemeral_pg::config::{env_optional, load_dotenv};
use ephemeral_pg::database::ConnectionConfig;
use ephemeral_pg::sea_orm::{ConnectionTrait, DbBackend, Statement};
use ephemeral_pg::{DbConnection, EphemeralConfig, SqlMigration};
use rand::Rng;
use std::path::Path;

pub const KV_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
  key TEXT PRIMARY KEY NOT NULL,
  value TEXT NOT NULL
);";

/// Connection string of the test server, or None to skip
pub fn database_url() -> Option<String> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let workspace = Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap_or_else(|| Path::new("."));
    load_dotenv(workspace);

    let url = env_optional::<String>("TEST_DATABASE_URL");
    if url.is_none() {
        eprintln!("TEST_DATABASE_URL is not set, skipping");
    }
    url
}

/// The kv schema under a fingerprint no other test shares
pub fn kv_migration() -> SqlMigration {
    let tag = format!("kv{}", rand::thread_rng().gen::<u64>());
    SqlMigration::new(tag, KV_SCHEMA)
}

pub fn settings() -> EphemeralConfig {
    EphemeralConfig::from_env()
}

pub async fn insert(conn: &impl ConnectionTrait, key: &str, value: &str) {
    conn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "INSERT INTO kv (key, value) VALUES ($1, $2)",
        [key.into(), value.into()],
    ))
    .await
    .unwrap();
}

pub async fn rows(conn: &impl ConnectionTrait) -> Vec<(String, String)> {
    conn.query_all(Statement::from_string(
        DbBackend::Postgres,
        "SELECT key, value FROM kv ORDER BY key",
    ))
    .await
    .unwrap()
    .into_iter()
    .map(|row| {
        (
            row.try_get::<String>("", "key").unwrap(),
            row.try_get::<String>("", "value").unwrap(),
        )
    })
    .collect()
}

/// Whether a database called `name` exists on the server
pub async fn database_exists(url: &str, name: &str) -> bool {
    let config = ConnectionConfig::parse(url).unwrap();
    let conn = DbConnection::maintenance(&config, &settings()).await.unwrap();

    let row = conn
        .query_one(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT exists(SELECT 1 FROM pg_database WHERE datname = $1) AS present",
            [name.into()],
        ))
        .await
        .unwrap()
        .unwrap();
    conn.close().await;

    row.try_get::<bool>("", "present").unwrap()
}

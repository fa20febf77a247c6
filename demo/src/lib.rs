//! A small schema used to exercise `ephemeral-pg` end to end
//!
//! The tests under `tests/` show the three ways of wiring it up: one cloned
//! database per test, one rollback-only transaction per test, and a
//! provisioner shared by every test in a binary.

pub mod migrations;
pub mod models;

use ephemeral_pg::{Provisioner, Result, SeaOrmMigrations, SharedProvisioner};

/// Migration spec for this crate's schema
pub fn schema() -> SeaOrmMigrations<migrations::Migrator> {
    SeaOrmMigrations::new()
}

static SHARED: SharedProvisioner = SharedProvisioner::new();

/// Provisioner for this crate's schema, built on first use from the environment
pub async fn provisioner() -> Result<&'static Provisioner> {
    SHARED
        .get_or_try_init(|| async { Provisioner::from_env(&schema()).await })
        .await
}

//! Disposable PostgreSQL databases for parallel tests
//!
//! Two isolation strategies over one migrated schema:
//!
//! - [`Provisioner`] clones a template database into a private database per
//!   test. Passed tests drop theirs; failed tests keep it for inspection.
//! - [`TxIsolator`] runs each test inside a transaction that is rolled back
//!   when the test ends.
//!
//! The template is built once per (user, password, migration fingerprint)
//! and reused by every process pointing at the same server.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ephemeral_pg::{Provisioner, SeaOrmMigrations, SharedProvisioner, TestScope};
//!
//! static SHARED: SharedProvisioner = SharedProvisioner::new();
//!
//! #[tokio::test]
//! async fn stores_values() {
//!     let provisioner = SHARED
//!         .get_or_try_init(|| Provisioner::from_env(&SeaOrmMigrations::<Migrator>::new()))
//!         .await
//!         .unwrap();
//!
//!     TestScope::run("stores_values", |t| async move {
//!         let db = provisioner.database(&t).await.unwrap();
//!         db.execute_unprepared("INSERT INTO kv VALUES ('k', 'v')").await.unwrap();
//!     })
//!     .await;
//! }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod identity;
pub mod isolator;
pub mod lock;
pub mod migration;
pub mod naming;
pub mod provisioner;
pub mod template;
pub mod testing;

pub use config::{EphemeralConfig, EphemeralConfigBuilder};
pub use database::{ConnectionConfig, DbConnection};
pub use error::{Error, Result};
pub use identity::TemplateIdentity;
pub use isolator::{Isolation, TestTransaction, TxIsolator};
pub use lock::{AdvisoryLock, LockGuard, NamedLock, ProcessLock};
pub use migration::{MigrationSpec, SeaOrmMigrations, SqlMigration};
pub use naming::{UniqueNameGenerator, WordPairNames};
pub use provisioner::{EphemeralDatabase, Provisioner, SharedProvisioner};
pub use template::{TemplateCatalog, TemplateManager};
pub use testing::{TestContext, TestScope};

// Re-export for entity definitions and migrations in consuming crates
pub use async_trait::async_trait;
pub use sea_orm;
pub use sea_orm_migration;

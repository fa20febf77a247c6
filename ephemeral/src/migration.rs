//! Migration capability
//!
//! The provisioner never decides what a schema looks like; it asks a
//! [`MigrationSpec`] to build it once on the template database and copies
//! the result for every test.

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use sha2::{Digest, Sha256};
use std::marker::PhantomData;

/// Applies a schema to a freshly created template database
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use ephemeral_pg::MigrationSpec;
/// use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr};
///
/// struct Schema;
///
/// #[async_trait]
/// impl MigrationSpec for Schema {
///     async fn migrate(&self, conn: &DatabaseConnection) -> Result<(), DbErr> {
///         conn.execute_unprepared("CREATE TABLE kv (key TEXT PRIMARY KEY, value TEXT)").await?;
///         Ok(())
///     }
///
///     fn fingerprint(&self) -> String {
///         "kv-v1".to_string()
///     }
/// }
/// ```
#[async_trait]
pub trait MigrationSpec: Send + Sync {
    /// Apply the schema through a direct connection to the template
    ///
    /// Runs at most once per template, under the template lock.
    async fn migrate(&self, conn: &DatabaseConnection) -> Result<(), DbErr>;

    /// Identifier of this migration set
    ///
    /// Changing the schema must change the fingerprint, otherwise a stale
    /// template from an earlier run is reused.
    fn fingerprint(&self) -> String;
}

/// [`MigrationSpec`] backed by a SeaORM migrator
///
/// The fingerprint is derived from the ordered migration names, so adding a
/// migration produces a new template. Use [`SeaOrmMigrations::salted`] when
/// an existing migration is edited in place.
///
/// # Example
///
/// ```rust,ignore
/// let migrations = SeaOrmMigrations::<Migrator>::new();
/// let provisioner = Provisioner::from_env(&migrations).await?;
/// ```
pub struct SeaOrmMigrations<M> {
    salt: String,
    _migrator: PhantomData<fn() -> M>,
}

impl<M: MigratorTrait> SeaOrmMigrations<M> {
    /// Migrations of `M`, fingerprinted by name only
    pub fn new() -> Self {
        Self::salted("")
    }

    /// Migrations of `M`, fingerprinted by name and `salt`
    pub fn salted(salt: impl Into<String>) -> Self {
        Self {
            salt: salt.into(),
            _migrator: PhantomData,
        }
    }
}

impl<M: MigratorTrait> Default for SeaOrmMigrations<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M: MigratorTrait + 'static> MigrationSpec for SeaOrmMigrations<M> {
    async fn migrate(&self, conn: &DatabaseConnection) -> Result<(), DbErr> {
        M::up(conn, None).await
    }

    fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for migration in M::migrations() {
            hasher.update(migration.name().as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(self.salt.as_bytes());
        format!("seaorm:{}", hex::encode(hasher.finalize()))
    }
}

/// [`MigrationSpec`] that runs a raw SQL script
///
/// # Example
///
/// ```rust
/// use ephemeral_pg::{MigrationSpec, SqlMigration};
///
/// let schema = SqlMigration::new(
///     "kv-v1",
///     "CREATE TABLE kv (key TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL);",
/// );
/// assert_eq!(schema.fingerprint(), "kv-v1");
/// ```
#[derive(Debug, Clone)]
pub struct SqlMigration {
    tag: String,
    script: String,
}

impl SqlMigration {
    /// Script identified by `tag`
    pub fn new(tag: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            script: script.into(),
        }
    }

    /// The SQL this migration runs
    pub fn script(&self) -> &str {
        &self.script
    }
}

#[async_trait]
impl MigrationSpec for SqlMigration {
    async fn migrate(&self, conn: &DatabaseConnection) -> Result<(), DbErr> {
        conn.execute_unprepared(&self.script).await?;
        Ok(())
    }

    fn fingerprint(&self) -> String {
        self.tag.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};
    use sea_orm_migration::prelude::*;

    mod first {
        use sea_orm_migration::prelude::*;
        use sea_orm_migration::MigrationName;

        pub struct Migration;

        impl MigrationName for Migration {
            fn name(&self) -> &str {
                "m20240101_000001_create_kv"
            }
        }

        #[async_trait::async_trait]
        impl MigrationTrait for Migration {
            async fn up(&self, _manager: &SchemaManager) -> Result<(), DbErr> {
                Ok(())
            }
        }
    }

    mod second {
        use sea_orm_migration::prelude::*;
        use sea_orm_migration::MigrationName;

        pub struct Migration;

        impl MigrationName for Migration {
            fn name(&self) -> &str {
                "m20240102_000001_add_index"
            }
        }

        #[async_trait::async_trait]
        impl MigrationTrait for Migration {
            async fn up(&self, _manager: &SchemaManager) -> Result<(), DbErr> {
                Ok(())
            }
        }
    }

    struct OneMigration;

    #[async_trait::async_trait]
    impl MigratorTrait for OneMigration {
        fn migrations() -> Vec<Box<dyn MigrationTrait>> {
            vec![Box::new(first::Migration)]
        }
    }

    struct TwoMigrations;

    #[async_trait::async_trait]
    impl MigratorTrait for TwoMigrations {
        fn migrations() -> Vec<Box<dyn MigrationTrait>> {
            vec![Box::new(first::Migration), Box::new(second::Migration)]
        }
    }

    #[test]
    fn test_seaorm_fingerprint_is_stable() {
        assert_eq!(
            SeaOrmMigrations::<OneMigration>::new().fingerprint(),
            SeaOrmMigrations::<OneMigration>::new().fingerprint()
        );
    }

    #[test]
    fn test_seaorm_fingerprint_tracks_migration_list() {
        assert_ne!(
            SeaOrmMigrations::<OneMigration>::new().fingerprint(),
            SeaOrmMigrations::<TwoMigrations>::new().fingerprint()
        );
    }

    #[test]
    fn test_seaorm_fingerprint_tracks_salt() {
        assert_ne!(
            SeaOrmMigrations::<OneMigration>::new().fingerprint(),
            SeaOrmMigrations::<OneMigration>::salted("edited").fingerprint()
        );
    }

    #[test]
    fn test_sql_migration_fingerprint_is_tag() {
        let migration = SqlMigration::new("tag", "SELECT 1");
        assert_eq!(migration.fingerprint(), "tag");
        assert_eq!(migration.script(), "SELECT 1");
    }
}

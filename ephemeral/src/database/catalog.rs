//! Administrative statements against `pg_database`
//!
//! All of these run on a maintenance connection. Database names are quoted
//! with [`quote_ident`]; values are bound as parameters.

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseBackend, DbErr, Statement};

use crate::config::EphemeralConfig;
use crate::database::connection::{ConnectionConfig, DbConnection};
use crate::database::ident::quote_ident;
use crate::error::{Error, Result};
use crate::migration::MigrationSpec;
use crate::template::TemplateCatalog;

/// Whether `name` exists and is flagged as a template
pub async fn is_template(conn: &DbConnection, name: &str) -> Result<bool, DbErr> {
    let stmt = Statement::from_sql_and_values(
        DatabaseBackend::Postgres,
        "SELECT exists(SELECT 1 FROM pg_database WHERE datname = $1 AND datistemplate = true) AS flagged",
        [name.into()],
    );

    match conn.query_one(stmt).await? {
        Some(row) => row.try_get("", "flagged"),
        None => Ok(false),
    }
}

/// `DROP DATABASE IF EXISTS name`
pub async fn drop_database(conn: &DbConnection, name: &str) -> Result<(), DbErr> {
    conn.execute_unprepared(&format!("DROP DATABASE IF EXISTS {}", quote_ident(name)))
        .await?;
    Ok(())
}

/// `CREATE DATABASE name OWNER owner`
pub async fn create_database(conn: &DbConnection, name: &str, owner: &str) -> Result<(), DbErr> {
    conn.execute_unprepared(&format!(
        "CREATE DATABASE {} OWNER {}",
        quote_ident(name),
        quote_ident(owner)
    ))
    .await?;
    Ok(())
}

/// `CREATE DATABASE name TEMPLATE template OWNER owner`
pub async fn clone_database(
    conn: &DbConnection,
    name: &str,
    template: &str,
    owner: &str,
) -> Result<(), DbErr> {
    conn.execute_unprepared(&format!(
        "CREATE DATABASE {} TEMPLATE {} OWNER {}",
        quote_ident(name),
        quote_ident(template),
        quote_ident(owner)
    ))
    .await?;
    Ok(())
}

/// Flag `name` as a template in `pg_database`
pub async fn mark_template(conn: &DbConnection, name: &str) -> Result<(), DbErr> {
    let stmt = Statement::from_sql_and_values(
        DatabaseBackend::Postgres,
        "UPDATE pg_database SET datistemplate = true WHERE datname = $1",
        [name.into()],
    );

    let result = conn.execute(stmt).await?;
    if result.rows_affected() == 0 {
        return Err(DbErr::RecordNotUpdated);
    }
    Ok(())
}

/// [`TemplateCatalog`] on a live server
pub struct PgCatalog<'a> {
    maintenance: &'a DbConnection,
    connection: &'a ConnectionConfig,
    settings: &'a EphemeralConfig,
}

impl<'a> PgCatalog<'a> {
    /// Catalog operating through `maintenance`
    pub fn new(
        maintenance: &'a DbConnection,
        connection: &'a ConnectionConfig,
        settings: &'a EphemeralConfig,
    ) -> Self {
        Self {
            maintenance,
            connection,
            settings,
        }
    }
}

#[async_trait]
impl TemplateCatalog for PgCatalog<'_> {
    async fn is_template(&self, name: &str) -> Result<bool> {
        is_template(self.maintenance, name)
            .await
            .map_err(|e| Error::template(name, "check", e))
    }

    async fn drop_database(&self, name: &str) -> Result<()> {
        drop_database(self.maintenance, name)
            .await
            .map_err(|e| Error::template(name, "drop", e))
    }

    async fn create_database(&self, name: &str, owner: &str) -> Result<()> {
        create_database(self.maintenance, name, owner)
            .await
            .map_err(|e| Error::template(name, "create", e))
    }

    async fn migrate(&self, name: &str, spec: &dyn MigrationSpec) -> Result<()> {
        let conn = DbConnection::single(self.connection, name, self.settings).await?;
        let migrated = spec.migrate(conn.inner()).await;
        conn.close().await;

        migrated.map_err(|source| Error::Migration {
            template: name.to_string(),
            source,
        })
    }

    async fn mark_template(&self, name: &str) -> Result<()> {
        mark_template(self.maintenance, name)
            .await
            .map_err(|e| Error::template(name, "mark", e))
    }
}

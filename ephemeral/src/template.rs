//! Template database lifecycle
//!
//! [`TemplateManager::ensure`] guarantees that exactly one fully migrated
//! template exists for an identity, no matter how many processes race to
//! build it. The algorithm only talks to a [`TemplateCatalog`] and a
//! [`NamedLock`]; the Postgres implementations live in
//! [`crate::database::catalog`] and [`crate::lock`].
//!
//! A template moves through four states:
//!
//! ```text
//! absent -> created -> migrated -> flagged
//! ```
//!
//! Only `flagged` counts as ready. Flagging is the very last step, so any
//! other state found under the lock is the remains of a crashed initializer
//! and is rebuilt from scratch.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::identity::TemplateIdentity;
use crate::lock::NamedLock;
use crate::migration::MigrationSpec;

/// Catalog operations the template algorithm needs
#[async_trait]
pub trait TemplateCatalog: Send + Sync {
    /// Whether `name` exists and is flagged as a template
    async fn is_template(&self, name: &str) -> Result<bool>;

    /// Drop `name` if it exists
    async fn drop_database(&self, name: &str) -> Result<()>;

    /// Create an empty database `name` owned by `owner`
    async fn create_database(&self, name: &str, owner: &str) -> Result<()>;

    /// Run `spec` through a direct connection to `name`
    ///
    /// The connection must be closed before this returns, since a database
    /// with open sessions cannot be used as a clone source.
    async fn migrate(&self, name: &str, spec: &dyn MigrationSpec) -> Result<()>;

    /// Flag `name` as a template
    async fn mark_template(&self, name: &str) -> Result<()>;
}

/// Builds template databases
pub struct TemplateManager<'a> {
    catalog: &'a dyn TemplateCatalog,
    lock: &'a dyn NamedLock,
    lock_timeout: Duration,
}

impl<'a> TemplateManager<'a> {
    /// Manager over `catalog`, serialized through `lock`
    pub fn new(catalog: &'a dyn TemplateCatalog, lock: &'a dyn NamedLock, lock_timeout: Duration) -> Self {
        Self {
            catalog,
            lock,
            lock_timeout,
        }
    }

    /// Make sure the template for `identity` exists and is flagged
    ///
    /// Returns the template name. Safe to call concurrently from any number
    /// of tasks or processes sharing the lock; the migration runs at most
    /// once per identity.
    pub async fn ensure(
        &self,
        identity: &TemplateIdentity,
        owner: &str,
        spec: &dyn MigrationSpec,
    ) -> Result<String> {
        let template = identity.name();

        let guard = tokio::time::timeout(self.lock_timeout, self.lock.acquire(template))
            .await
            .map_err(|_| {
                Error::lock(
                    template,
                    format!("timed out after {:?} waiting for another initializer", self.lock_timeout),
                )
            })??;

        let built = self.build(template, owner, spec).await;
        let released = guard.release().await;

        Error::merge(built, released).map(|()| template.to_string())
    }

    async fn build(&self, template: &str, owner: &str, spec: &dyn MigrationSpec) -> Result<()> {
        if self.catalog.is_template(template).await? {
            tracing::debug!(template, "template already flagged, reusing");
            return Ok(());
        }

        // An unflagged database here was left by an initializer that died
        // between create and flag
        self.catalog.drop_database(template).await?;
        self.catalog.create_database(template, owner).await?;

        tracing::info!(template, fingerprint = %spec.fingerprint(), "migrating template database");
        self.catalog.migrate(template, spec).await?;
        self.catalog.mark_template(template).await?;

        tracing::info!(template, "template database ready");
        Ok(())
    }
}

//! One cloned database per test
//!
//! A [`Provisioner`] is built once per migration set. Construction makes
//! sure the template exists; every [`Provisioner::database`] call then
//! clones it into a fresh database that is dropped when the test passes and
//! kept for inspection when it fails.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::config::{load_dotenv, EphemeralConfig};
use crate::database::catalog::{clone_database, drop_database};
use crate::database::{ConnectionConfig, DbConnection, PgCatalog};
use crate::error::{Error, Result};
use crate::identity::TemplateIdentity;
use crate::lock::AdvisoryLock;
use crate::migration::MigrationSpec;
use crate::naming::{UniqueNameGenerator, WordPairNames};
use crate::template::TemplateManager;
use crate::testing::{cleanup, TestContext};

/// Hands out a private, fully migrated database to each test
///
/// Holds only immutable settings once built, so it can be shared across
/// tasks by reference or through an `Arc`.
///
/// # Example
///
/// ```rust,ignore
/// use ephemeral_pg::{Provisioner, SeaOrmMigrations, TestScope};
///
/// #[tokio::test]
/// async fn creates_a_user() {
///     let migrations = SeaOrmMigrations::<Migrator>::new();
///     let provisioner = Provisioner::from_env(&migrations).await.unwrap();
///
///     TestScope::run("creates_a_user", |t| async move {
///         let db = provisioner.database(&t).await.unwrap();
///         // db derefs to sea_orm::DatabaseConnection
///     })
///     .await;
/// }
/// ```
pub struct Provisioner {
    connection: ConnectionConfig,
    config: EphemeralConfig,
    template: String,
    names: Arc<dyn UniqueNameGenerator>,
}

impl Provisioner {
    /// Prepare the template for `spec` on the server behind `connection`
    ///
    /// Connects, takes the template lock, builds the template if needed and
    /// disconnects. Any failure is returned as is; nothing is retried.
    pub async fn new(
        connection: ConnectionConfig,
        spec: &dyn MigrationSpec,
        config: EphemeralConfig,
    ) -> Result<Self> {
        let identity = TemplateIdentity::derive(
            connection.user(),
            connection.password(),
            &spec.fingerprint(),
        );

        let maintenance = DbConnection::maintenance(&connection, &config).await?;
        let lock = AdvisoryLock::new(maintenance.clone());
        let catalog = PgCatalog::new(&maintenance, &connection, &config);

        let ensured = TemplateManager::new(&catalog, &lock, config.lock_timeout)
            .ensure(&identity, connection.user(), spec)
            .await;
        maintenance.close().await;

        let template = ensured?;
        tracing::info!(template = %template, "provisioner ready");

        Ok(Self {
            connection,
            config,
            template,
            names: Arc::new(WordPairNames::new()),
        })
    }

    /// Parse `url` and build a provisioner on it
    pub async fn connect(
        url: &str,
        spec: &dyn MigrationSpec,
        config: EphemeralConfig,
    ) -> Result<Self> {
        let connection = ConnectionConfig::parse(url)?;
        Self::new(connection, spec, config).await
    }

    /// Build a provisioner from `TEST_DATABASE_URL` and the `EPHEMERAL_*`
    /// variables, loading `.env` files from the working directory first
    pub async fn from_env(spec: &dyn MigrationSpec) -> Result<Self> {
        load_dotenv(Path::new("."));
        let config = EphemeralConfig::from_env();
        let url = config
            .database_url
            .clone()
            .ok_or_else(|| Error::config("TEST_DATABASE_URL is not set"))?;

        Self::connect(&url, spec, config).await
    }

    /// Replace the generator used to name ephemeral databases
    pub fn with_name_generator(mut self, names: impl UniqueNameGenerator + 'static) -> Self {
        self.names = Arc::new(names);
        self
    }

    /// Name of the template every database is cloned from
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Settings this provisioner was built with
    pub fn config(&self) -> &EphemeralConfig {
        &self.config
    }

    /// Clone the template into a new database owned by `ctx`
    ///
    /// The database is released through a cleanup registered on `ctx`:
    /// dropped if the test passed, retained if it failed. Provisioning stops
    /// with [`Error::Canceled`] when the test's token fires first.
    pub async fn database<C: TestContext>(&self, ctx: &C) -> Result<EphemeralDatabase> {
        let token = ctx.cancellation();
        let maintenance = cancellable(
            &token,
            DbConnection::maintenance(&self.connection, &self.config),
        )
        .await?;

        let name = self.names.generate();

        if token.is_cancelled() {
            maintenance.close().await;
            return Err(Error::Canceled);
        }

        // Runs to completion so a failure here is never followed by a drop:
        // the name may belong to a database this call did not create
        let cloned = clone_database(&maintenance, &name, &self.template, self.connection.user()).await;
        if let Err(e) = cloned {
            maintenance.close().await;
            return Err(Error::ephemeral(&name, e));
        }

        let opened = cancellable(&token, self.connect_clone(&name)).await;
        let pool = match opened {
            Ok(pool) => pool,
            Err(e) => {
                let dropped = tokio::time::timeout(
                    self.config.cleanup_timeout,
                    drop_database(&maintenance, &name),
                )
                .await;
                if !matches!(dropped, Ok(Ok(()))) {
                    tracing::warn!(database = %name, "could not remove unreachable ephemeral database");
                }
                maintenance.close().await;
                return Err(e);
            }
        };

        tracing::debug!(database = %name, template = %self.template, "ephemeral database created");
        ctx.log(&format!("spun up ephemeral database {}", name));

        let owner = ctx.clone();
        let released = pool.clone();
        let timeout = self.config.cleanup_timeout;
        ctx.cleanup(cleanup(move || release(owner, maintenance, released, timeout)));

        Ok(EphemeralDatabase {
            name,
            connection: pool,
        })
    }

    async fn connect_clone(&self, name: &str) -> Result<DbConnection> {
        DbConnection::connect(&self.connection, name, &self.config)
            .await
            .map_err(|e| match e {
                Error::Connection { source, .. } => Error::ephemeral(name, source),
                other => other,
            })
    }
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("connection", &self.connection)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

/// Post-test release of an ephemeral database
async fn release<C: TestContext>(
    ctx: C,
    maintenance: DbConnection,
    pool: DbConnection,
    timeout: Duration,
) {
    let name = pool.database().to_string();

    let outcome = tokio::time::timeout(timeout, async {
        pool.close().await;

        if ctx.failed() {
            return Ok(false);
        }
        drop_database(&maintenance, &name).await.map(|()| true)
    })
    .await;

    match outcome {
        Ok(Ok(true)) => {
            tracing::debug!(database = %name, "ephemeral database dropped");
            ctx.log(&format!("dropped ephemeral database {}", name));
        }
        Ok(Ok(false)) => {
            tracing::info!(database = %name, "test failed, retaining ephemeral database");
            ctx.log(&format!("failed test, leaving database intact: {}", name));
        }
        Ok(Err(source)) => {
            let err = Error::Cleanup {
                database: name.clone(),
                source,
            };
            tracing::warn!(database = %name, error = %err, "cleanup failed");
            ctx.log(&err.to_string());
        }
        Err(_) => {
            tracing::warn!(database = %name, ?timeout, "cleanup timed out");
            ctx.log(&format!("timed out releasing ephemeral database {}", name));
        }
    }

    if tokio::time::timeout(timeout, maintenance.close()).await.is_err() {
        tracing::warn!(database = %name, "maintenance connection did not close in time");
    }
}

/// Run `fut` unless `token` fires first
pub(crate) async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Canceled),
        out = fut => out,
    }
}

/// A database cloned for one test
///
/// Derefs to [`sea_orm::DatabaseConnection`], so entities and raw statements
/// run against it directly. The pool is closed by the test's cleanup.
#[derive(Debug, Clone)]
pub struct EphemeralDatabase {
    name: String,
    connection: DbConnection,
}

impl EphemeralDatabase {
    /// Database name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pool bound to this database
    pub fn connection(&self) -> &DbConnection {
        &self.connection
    }
}

impl std::ops::Deref for EphemeralDatabase {
    type Target = sea_orm::DatabaseConnection;

    fn deref(&self) -> &Self::Target {
        self.connection.inner()
    }
}

impl AsRef<sea_orm::DatabaseConnection> for EphemeralDatabase {
    fn as_ref(&self) -> &sea_orm::DatabaseConnection {
        self.connection.inner()
    }
}

/// A provisioner initialized on first use and shared afterwards
///
/// Declare one in a `static` and initialize it from each test. The first
/// caller builds the provisioner; a failed build is returned to that caller
/// and not remembered, so the next caller tries again.
///
/// ```rust,ignore
/// static SHARED: SharedProvisioner = SharedProvisioner::new();
///
/// async fn provisioner() -> &'static Provisioner {
///     SHARED
///         .get_or_try_init(|| Provisioner::from_env(&SeaOrmMigrations::<Migrator>::new()))
///         .await
///         .unwrap()
/// }
/// ```
#[derive(Debug, Default)]
pub struct SharedProvisioner {
    cell: OnceCell<Provisioner>,
}

impl SharedProvisioner {
    /// Create an empty cell
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
        }
    }

    /// The provisioner, building it with `init` if nobody has yet
    pub async fn get_or_try_init<F, Fut>(&self, init: F) -> Result<&Provisioner>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Provisioner>>,
    {
        self.cell.get_or_try_init(init).await
    }

    /// The provisioner if it has been built
    pub fn get(&self) -> Option<&Provisioner> {
        self.cell.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_cancellable_passes_through_result() {
        let token = CancellationToken::new();
        let out = cancellable(&token, async { Ok::<_, Error>(5) }).await;
        assert_eq!(out.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_cancellable_stops_on_canceled_token() {
        let token = CancellationToken::new();
        token.cancel();

        let out = cancellable(&token, std::future::pending::<Result<()>>()).await;
        assert!(matches!(out, Err(Error::Canceled)));
    }

    #[tokio::test]
    async fn test_cancellable_interrupts_pending_work() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let out = cancellable(&token, std::future::pending::<Result<()>>()).await;
        assert!(matches!(out, Err(Error::Canceled)));
    }

    #[tokio::test]
    async fn test_shared_provisioner_does_not_cache_errors() {
        static SHARED: SharedProvisioner = SharedProvisioner::new();
        let attempts = AtomicUsize::new(0);

        for _ in 0..2 {
            let out = SHARED
                .get_or_try_init(|| async {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(Error::config("TEST_DATABASE_URL is not set"))
                })
                .await;
            assert!(out.is_err());
        }

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(SHARED.get().is_none());
    }
}

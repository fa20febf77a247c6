//! Rollback-only transactions over a shared database
//!
//! Cheaper than a cloned database: every test runs inside its own
//! transaction on one shared pool, and the transaction is rolled back when
//! the test ends. Tests cannot see each other's uncommitted writes, but they
//! do share whatever was committed before them.

use async_trait::async_trait;
use sea_orm::{
    ConnectionTrait, DatabaseTransaction, DbBackend, DbErr, ExecResult, IsolationLevel,
    QueryResult, Statement, TransactionTrait,
};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::EphemeralConfig;
use crate::database::{ConnectionConfig, DbConnection};
use crate::error::{Error, Result};
use crate::provisioner::cancellable;
use crate::testing::{cleanup, TestContext};

/// Transaction isolation level
///
/// Levels below read committed are deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isolation {
    /// Each statement sees data committed before it began
    #[default]
    ReadCommitted,
    /// Statements see a snapshot taken at the first statement
    RepeatableRead,
    /// Transactions behave as if run one after another
    Serializable,
}

impl Isolation {
    /// Name as accepted by `EPHEMERAL_ISOLATION`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadCommitted => "read_committed",
            Self::RepeatableRead => "repeatable_read",
            Self::Serializable => "serializable",
        }
    }
}

impl From<Isolation> for IsolationLevel {
    fn from(isolation: Isolation) -> Self {
        match isolation {
            Isolation::ReadCommitted => IsolationLevel::ReadCommitted,
            Isolation::RepeatableRead => IsolationLevel::RepeatableRead,
            Isolation::Serializable => IsolationLevel::Serializable,
        }
    }
}

impl FromStr for Isolation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "read_committed" => Ok(Self::ReadCommitted),
            "repeatable_read" => Ok(Self::RepeatableRead),
            "serializable" => Ok(Self::Serializable),
            _ => Err(Error::config(format!("unsupported isolation level '{}'", s))),
        }
    }
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hands out one rollback-only transaction per test
///
/// # Example
///
/// ```rust,ignore
/// let isolator = TxIsolator::connect(&url, EphemeralConfig::from_env()).await?;
///
/// TestScope::run("reads_its_own_writes", |t| async move {
///     let tx = isolator.begin(&t).await.unwrap();
///     tx.execute_unprepared("INSERT INTO kv VALUES ('k', 'v')").await.unwrap();
/// })
/// .await;
/// ```
#[derive(Debug, Clone)]
pub struct TxIsolator {
    conn: DbConnection,
    config: EphemeralConfig,
}

impl TxIsolator {
    /// Isolator over an existing pool
    pub fn new(conn: DbConnection, config: EphemeralConfig) -> Self {
        Self { conn, config }
    }

    /// Open a pool on the database named in `url`
    pub async fn connect(url: &str, config: EphemeralConfig) -> Result<Self> {
        let connection = ConnectionConfig::parse(url)?;
        let conn = DbConnection::connect(&connection, &connection.database(), &config).await?;
        Ok(Self::new(conn, config))
    }

    /// Underlying pool
    pub fn connection(&self) -> &DbConnection {
        &self.conn
    }

    /// Begin a transaction for `ctx`, rolled back when the test ends
    pub async fn begin<C: TestContext>(&self, ctx: &C) -> Result<TestTransaction> {
        let token = ctx.cancellation();
        let isolation = self.config.isolation;

        let tx = cancellable(&token, async {
            self.conn
                .begin_with_config(Some(isolation.into()), None)
                .await
                .map_err(|e| Error::connection(self.conn.database(), e))
        })
        .await?;

        tracing::debug!(database = %self.conn.database(), %isolation, "test transaction started");
        ctx.log("spun up new transaction for test");

        let handle = TestTransaction {
            slot: Arc::new(Mutex::new(Some(tx))),
        };

        let owner = ctx.clone();
        let slot = handle.slot.clone();
        let timeout = self.config.cleanup_timeout;
        ctx.cleanup(cleanup(move || roll_back(owner, slot, timeout)));

        Ok(handle)
    }

    /// Close the pool
    pub async fn close(&self) {
        self.conn.close().await;
    }
}

async fn roll_back<C: TestContext>(
    ctx: C,
    slot: Arc<Mutex<Option<DatabaseTransaction>>>,
    timeout: Duration,
) {
    let outcome = tokio::time::timeout(timeout, async {
        match slot.lock().await.take() {
            Some(tx) => tx.rollback().await.map(|()| true),
            None => Ok(false),
        }
    })
    .await;

    match outcome {
        Ok(Ok(true)) => tracing::debug!("test transaction rolled back"),
        Ok(Ok(false)) => ctx.log("transaction already closed by the test, nothing to roll back"),
        Ok(Err(e)) => ctx.fatal(format!("failed to roll back test transaction: {}", e)),
        Err(_) => ctx.fatal(format!(
            "timed out after {:?} rolling back test transaction",
            timeout
        )),
    }
}

/// A transaction owned by one test
///
/// Implements [`ConnectionTrait`], so SeaORM entities and raw statements run
/// inside it. Clones share the same transaction. Statements issued after
/// [`TestTransaction::commit`] or [`TestTransaction::rollback`] fail.
#[derive(Clone)]
pub struct TestTransaction {
    slot: Arc<Mutex<Option<DatabaseTransaction>>>,
}

impl TestTransaction {
    /// Commit now instead of rolling back at the end of the test
    pub async fn commit(&self) -> Result<(), DbErr> {
        self.take().await?.commit().await
    }

    /// Roll back now
    pub async fn rollback(&self) -> Result<(), DbErr> {
        self.take().await?.rollback().await
    }

    /// Whether the transaction is still open
    pub async fn is_open(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    async fn take(&self) -> Result<DatabaseTransaction, DbErr> {
        self.slot.lock().await.take().ok_or_else(closed)
    }
}

fn closed() -> DbErr {
    DbErr::Custom("test transaction is already closed".to_string())
}

#[async_trait]
impl ConnectionTrait for TestTransaction {
    fn get_database_backend(&self) -> DbBackend {
        DbBackend::Postgres
    }

    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr> {
        match self.slot.lock().await.as_ref() {
            Some(tx) => tx.execute(stmt).await,
            None => Err(closed()),
        }
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<ExecResult, DbErr> {
        match self.slot.lock().await.as_ref() {
            Some(tx) => tx.execute_unprepared(sql).await,
            None => Err(closed()),
        }
    }

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, DbErr> {
        match self.slot.lock().await.as_ref() {
            Some(tx) => tx.query_one(stmt).await,
            None => Err(closed()),
        }
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        match self.slot.lock().await.as_ref() {
            Some(tx) => tx.query_all(stmt).await,
            None => Err(closed()),
        }
    }
}

impl fmt::Debug for TestTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestTransaction").finish_non_exhaustive()
    }
}

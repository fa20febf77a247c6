//! Named mutual exclusion
//!
//! Template creation is linearized through a [`NamedLock`]. The Postgres
//! implementation uses session-level advisory locks so that independent
//! processes pointing at the same server coordinate; [`ProcessLock`] covers
//! initializers that all live in one process.

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

use crate::database::DbConnection;
use crate::error::{Error, Result};
use crate::identity::lock_key;

/// A held lock, released exactly once
#[async_trait]
pub trait LockGuard: Send {
    /// Release the lock
    async fn release(self: Box<Self>) -> Result<()>;
}

/// Mutual exclusion keyed by name
#[async_trait]
pub trait NamedLock: Send + Sync {
    /// Block until the lock named `key` is held
    async fn acquire(&self, key: &str) -> Result<Box<dyn LockGuard>>;
}

/// PostgreSQL session advisory lock
///
/// The lock belongs to the session of the wrapped connection, so the
/// connection must be a single-connection pool (see
/// [`DbConnection::single`]). Closing that pool releases anything still held.
#[derive(Debug, Clone)]
pub struct AdvisoryLock {
    conn: DbConnection,
}

impl AdvisoryLock {
    /// Lock scoped to the session of `conn`
    pub fn new(conn: DbConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl NamedLock for AdvisoryLock {
    async fn acquire(&self, key: &str) -> Result<Box<dyn LockGuard>> {
        let id = lock_key(key);
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "SELECT pg_advisory_lock($1::BIGINT)",
            [id.into()],
        );

        self.conn
            .execute(stmt)
            .await
            .map_err(|e| Error::lock(key, format!("failed to acquire: {}", e)))?;

        tracing::debug!(lock = key, id, "advisory lock acquired");

        Ok(Box::new(AdvisoryGuard {
            conn: self.conn.clone(),
            name: key.to_string(),
            id,
        }))
    }
}

struct AdvisoryGuard {
    conn: DbConnection,
    name: String,
    id: i64,
}

#[async_trait]
impl LockGuard for AdvisoryGuard {
    async fn release(self: Box<Self>) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "SELECT pg_advisory_unlock($1::BIGINT) AS released",
            [self.id.into()],
        );

        let row = self
            .conn
            .query_one(stmt)
            .await
            .map_err(|e| Error::lock(&self.name, format!("failed to release: {}", e)))?;

        let released = match row {
            Some(row) => row
                .try_get::<bool>("", "released")
                .map_err(|e| Error::lock(&self.name, format!("failed to release: {}", e)))?,
            None => false,
        };

        if !released {
            return Err(Error::lock(&self.name, "released a lock that was not held"));
        }

        tracing::debug!(lock = %self.name, id = self.id, "advisory lock released");
        Ok(())
    }
}

/// In-process named lock
///
/// One tokio mutex per name. Only coordinates callers sharing this value.
#[derive(Debug, Clone, Default)]
pub struct ProcessLock {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ProcessLock {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.to_string()).or_default().clone()
    }
}

#[async_trait]
impl NamedLock for ProcessLock {
    async fn acquire(&self, key: &str) -> Result<Box<dyn LockGuard>> {
        let guard = self.slot(key).lock_owned().await;
        Ok(Box::new(ProcessGuard { _guard: guard }))
    }
}

struct ProcessGuard {
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl LockGuard for ProcessGuard {
    async fn release(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_process_lock_excludes_same_name() {
        let lock = ProcessLock::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = lock.clone();
            let inside = inside.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let guard = lock.acquire("template").await.unwrap();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
                guard.release().await.unwrap();
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_process_lock_names_are_independent() {
        let lock = ProcessLock::new();
        let _a = lock.acquire("a").await.unwrap();

        let b = tokio::time::timeout(Duration::from_millis(200), lock.acquire("b")).await;
        assert!(b.is_ok(), "lock 'b' should not wait on lock 'a'");
    }

    #[tokio::test]
    async fn test_process_lock_reacquire_after_release() {
        let lock = ProcessLock::new();
        let first = lock.acquire("t").await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), lock.acquire("t")).await;
        assert!(blocked.is_err());

        first.release().await.unwrap();
        let again = tokio::time::timeout(Duration::from_millis(200), lock.acquire("t")).await;
        assert!(again.is_ok());
    }
}

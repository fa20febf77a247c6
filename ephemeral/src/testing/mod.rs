//! Test lifecycle integration
//!
//! The provisioner and the isolator only need five things from the test
//! they serve, captured by [`TestContext`]. [`TestScope`] is a ready-made
//! implementation for `#[tokio::test]` functions.
//!
//! # Example
//!
//! ```rust,ignore
//! use ephemeral_pg::testing::TestScope;
//!
//! #[tokio::test]
//! async fn inserts_a_row() {
//!     TestScope::run("inserts_a_row", |t| async move {
//!         let db = provisioner().await.database(&t).await.unwrap();
//!         db.execute_unprepared("INSERT INTO kv VALUES ('k', 'v')").await.unwrap();
//!     })
//!     .await;
//! }
//! ```

mod scope;

pub use scope::TestScope;

use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Future returned by a cleanup action
pub type CleanupFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Deferred release of a test resource, run once when the test ends
pub type CleanupFn = Box<dyn FnOnce() -> CleanupFuture + Send + 'static>;

/// The capabilities of a running test that provisioning relies on
///
/// Implementations are cheap handles: cleanups capture a clone so they can
/// still report after the test body has returned.
pub trait TestContext: Clone + Send + Sync + 'static {
    /// Token canceled when the test is over or aborted
    ///
    /// Provisioning stops early when it fires. Cleanup never depends on it.
    fn cancellation(&self) -> CancellationToken;

    /// Register `action` to run after the test body, most recent first
    fn cleanup(&self, action: CleanupFn);

    /// Whether the test has failed so far
    fn failed(&self) -> bool;

    /// Mark the test as failed with `message`
    fn fatal(&self, message: String);

    /// Emit a line attributed to the test
    fn log(&self, message: &str);
}

/// Box an async block as a [`CleanupFn`]
///
/// # Example
/// ```rust,ignore
/// ctx.cleanup(cleanup(move || async move {
///     pool.close().await;
/// }));
/// ```
pub fn cleanup<F, Fut>(action: F) -> CleanupFn
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move || Box::pin(action()) as CleanupFuture)
}

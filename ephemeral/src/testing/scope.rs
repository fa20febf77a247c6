//! A [`TestContext`] for async test functions

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use super::{CleanupFn, TestContext};

/// Per-test state: failure flag, cleanup stack and cancellation token
///
/// Cleanups run exactly once, in reverse registration order, when
/// [`TestScope::finish`] is called. [`TestScope::run`] does that for you,
/// including when the test body panics, and then fails the test if anything
/// was reported through [`TestContext::fatal`].
#[derive(Clone)]
pub struct TestScope {
    inner: Arc<ScopeState>,
}

struct ScopeState {
    name: String,
    failed: AtomicBool,
    finished: AtomicBool,
    fatal: Mutex<Vec<String>>,
    cleanups: Mutex<Vec<CleanupFn>>,
    token: CancellationToken,
}

impl TestScope {
    /// Create a scope for the test called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ScopeState {
                name: name.into(),
                failed: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                fatal: Mutex::new(Vec::new()),
                cleanups: Mutex::new(Vec::new()),
                token: CancellationToken::new(),
            }),
        }
    }

    /// Run `body` as the test `name`, then its cleanups
    ///
    /// A panic in `body` marks the scope failed, runs the cleanups and is
    /// then resumed. Fatal reports fail the test after cleanup.
    pub async fn run<F, Fut, T>(name: impl Into<String>, body: F) -> T
    where
        F: FnOnce(TestScope) -> Fut,
        Fut: Future<Output = T>,
    {
        let scope = TestScope::new(name);
        let outcome = AssertUnwindSafe(body(scope.clone())).catch_unwind().await;

        if outcome.is_err() {
            scope.fail();
        }
        scope.finish().await;

        let value = match outcome {
            Ok(value) => value,
            Err(panic) => std::panic::resume_unwind(panic),
        };

        let fatal = scope.fatal_messages();
        if !fatal.is_empty() {
            panic!("test '{}' failed:\n  {}", scope.name(), fatal.join("\n  "));
        }

        value
    }

    /// Test name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Mark the test as failed
    pub fn fail(&self) {
        self.inner.failed.store(true, Ordering::SeqCst);
    }

    /// Messages reported through [`TestContext::fatal`]
    pub fn fatal_messages(&self) -> Vec<String> {
        self.inner
            .fatal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Cancel the token and run every registered cleanup, most recent first
    ///
    /// Only the first call does anything. A panicking cleanup is logged and
    /// does not stop the others.
    pub async fn finish(&self) {
        if self.inner.finished.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.token.cancel();

        loop {
            let next = self
                .inner
                .cleanups
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop();
            let Some(action) = next else { break };

            if AssertUnwindSafe(action()).catch_unwind().await.is_err() {
                tracing::error!(test = %self.inner.name, "cleanup action panicked");
                self.fail();
            }
        }
    }
}

impl TestContext for TestScope {
    fn cancellation(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    fn cleanup(&self, action: CleanupFn) {
        if self.inner.finished.load(Ordering::SeqCst) {
            // Registered too late for `finish`; run it detached so the
            // resource is still released
            tracing::warn!(test = %self.inner.name, "cleanup registered after the test finished");
            tokio::spawn(action());
            return;
        }
        self.inner
            .cleanups
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(action);
    }

    fn failed(&self) -> bool {
        self.inner.failed.load(Ordering::SeqCst)
    }

    fn fatal(&self, message: String) {
        tracing::error!(test = %self.inner.name, "{}", message);
        self.fail();
        self.inner
            .fatal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
    }

    fn log(&self, message: &str) {
        tracing::info!(test = %self.inner.name, "{}", message);
    }
}

impl std::fmt::Debug for TestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestScope")
            .field("name", &self.inner.name)
            .field("failed", &self.failed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::cleanup;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> CleanupFn) {
        let order = Arc::new(Mutex::new(Vec::new()));
        let sink = order.clone();
        let make = move |label: &'static str| {
            let sink = sink.clone();
            cleanup(move || async move {
                sink.lock().unwrap().push(label);
            })
        };
        (order, make)
    }

    #[tokio::test]
    async fn test_cleanups_run_in_reverse_order() {
        let (order, make) = recorder();
        let scope = TestScope::new("order");

        scope.cleanup(make("first"));
        scope.cleanup(make("second"));
        scope.cleanup(make("third"));
        scope.finish().await;

        assert_eq!(*order.lock().unwrap(), vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn test_finish_runs_cleanups_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let scope = TestScope::new("once");

        let counter = runs.clone();
        scope.cleanup(cleanup(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        scope.finish().await;
        scope.finish().await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_is_canceled_before_cleanups() {
        let scope = TestScope::new("cancel");
        let token = scope.cancellation();
        let seen = Arc::new(AtomicBool::new(false));

        let observed = seen.clone();
        let probe = token.clone();
        scope.cleanup(cleanup(move || async move {
            observed.store(probe.is_cancelled(), Ordering::SeqCst);
        }));

        assert!(!token.is_cancelled());
        scope.finish().await;
        assert!(seen.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panicking_cleanup_does_not_stop_others() {
        let (order, make) = recorder();
        let scope = TestScope::new("panicky");

        scope.cleanup(make("survivor"));
        scope.cleanup(cleanup(|| async {
            panic!("cleanup blew up");
        }));
        scope.finish().await;

        assert_eq!(*order.lock().unwrap(), vec!["survivor"]);
        assert!(scope.failed());
    }

    #[tokio::test]
    async fn test_run_returns_body_value_and_cleans_up() {
        let (order, make) = recorder();

        let value = TestScope::run("returns", move |t| async move {
            t.cleanup(make("released"));
            assert!(!t.failed());
            7
        })
        .await;

        assert_eq!(value, 7);
        assert_eq!(*order.lock().unwrap(), vec!["released"]);
    }

    #[tokio::test]
    async fn test_run_cleans_up_and_marks_failed_on_panic() {
        let failed_at_cleanup = Arc::new(AtomicBool::new(false));
        let observed = failed_at_cleanup.clone();

        let outcome = tokio::spawn(TestScope::run("panics", move |t| async move {
            let probe = t.clone();
            t.cleanup(cleanup(move || async move {
                observed.store(probe.failed(), Ordering::SeqCst);
            }));
            panic!("assertion failed in body");
        }))
        .await;

        assert!(outcome.is_err());
        assert!(failed_at_cleanup.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_run_fails_after_fatal_report() {
        let outcome = tokio::spawn(TestScope::run("fatal", |t| async move {
            t.fatal("rollback failed".to_string());
        }))
        .await;

        assert!(outcome.unwrap_err().is_panic());
    }

    #[tokio::test]
    async fn test_fatal_marks_failed_and_is_recorded() {
        let scope = TestScope::new("fatal");
        scope.fatal("boom".to_string());

        assert!(scope.failed());
        assert_eq!(scope.fatal_messages(), vec!["boom".to_string()]);
    }

    #[tokio::test]
    async fn test_late_cleanup_still_runs() {
        let scope = TestScope::new("late");
        scope.finish().await;

        let (tx, rx) = tokio::sync::oneshot::channel();
        scope.cleanup(cleanup(move || async move {
            let _ = tx.send(());
        }));

        assert!(rx.await.is_ok());
    }
}

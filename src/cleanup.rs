//! Best-effort teardown of resources created during a unit of work.
//!
//! Resources are deleted in reverse registration order, so an agent created
//! after the tools it references goes first. A failed deletion is logged and
//! the pass continues; nothing here ever returns an error for cleanup itself.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::types::{Resource, ResourceKind};
use crate::{Error, Result};

/// Deletes a resource by kind and id.
#[async_trait]
pub trait ResourceDeleter: Send + Sync {
    /// A missing resource must yield an error for which `is_not_found()` holds.
    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<()>;
}

#[derive(Debug)]
pub struct CleanupFailure {
    pub kind: ResourceKind,
    pub id: String,
    pub error: Error,
}

/// Outcome of one cleanup pass.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub attempted: usize,
    pub deleted: usize,
    /// Already deleted elsewhere; counted as success.
    pub already_gone: usize,
    pub failed: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ordered log of `(kind, id)` pairs awaiting teardown.
pub struct ResourceManager {
    deleter: Arc<dyn ResourceDeleter>,
    created: Mutex<Vec<(ResourceKind, String)>>,
}

impl ResourceManager {
    pub fn new(deleter: Arc<dyn ResourceDeleter>) -> Self {
        Self {
            deleter,
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, kind: ResourceKind, id: impl Into<String>) {
        let id = id.into();
        tracing::debug!(%kind, id = %id, "registered for cleanup");
        self.entries().push((kind, id));
    }

    pub fn register_resource<R: Resource>(&self, resource: &R) {
        self.register(R::KIND, resource.id());
    }

    /// Drops an entry, e.g. after the caller deleted it explicitly.
    pub fn forget(&self, kind: ResourceKind, id: &str) -> bool {
        let mut entries = self.entries();
        match entries.iter().rposition(|(k, i)| *k == kind && i == id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> Vec<(ResourceKind, String)> {
        self.entries().clone()
    }

    /// Deletes every registered resource, newest first, and empties the log.
    ///
    /// Every entry gets exactly one attempt regardless of earlier failures.
    pub async fn run_cleanup(&self) -> CleanupReport {
        let entries = std::mem::take(&mut *self.entries());
        let mut report = CleanupReport::default();

        for (kind, id) in entries.into_iter().rev() {
            report.attempted += 1;
            match self.deleter.delete(kind, &id).await {
                Ok(()) => report.deleted += 1,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(%kind, id = %id, "already deleted");
                    report.already_gone += 1;
                }
                Err(e) => {
                    tracing::warn!(%kind, id = %id, error = %e, "cleanup failed");
                    report.failed.push(CleanupFailure { kind, id, error: e });
                }
            }
        }

        tracing::info!(
            attempted = report.attempted,
            deleted = report.deleted,
            already_gone = report.already_gone,
            failed = report.failed.len(),
            "cleanup finished"
        );
        report
    }

    /// Runs `body` with a fresh manager and cleans up on every exit path.
    ///
    /// The body's result is returned unchanged; a panic in the body is
    /// resumed after cleanup.
    pub async fn scoped<T, F, Fut>(deleter: Arc<dyn ResourceDeleter>, body: F) -> Result<T>
    where
        F: FnOnce(Arc<ResourceManager>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let manager = Arc::new(ResourceManager::new(deleter));
        let scope = manager.clone();
        let outcome = AssertUnwindSafe(async move { body(scope).await })
            .catch_unwind()
            .await;

        manager.run_cleanup().await;
        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Like [`scoped`](Self::scoped), but cancelling `token` abandons the body,
    /// cleans up, and returns [`Error::Cancelled`].
    pub async fn scoped_with_cancel<T, F, Fut>(
        deleter: Arc<dyn ResourceDeleter>,
        token: CancellationToken,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce(Arc<ResourceManager>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        Self::scoped(deleter, |scope| async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::Cancelled),
                result = body(scope) => result,
            }
        })
        .await
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<(ResourceKind, String)>> {
        self.created.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("pending", &self.entries().len())
            .finish_non_exhaustive()
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        let pending = self
            .created
            .get_mut()
            .map(|entries| entries.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len());
        if pending > 0 {
            tracing::warn!(pending, "resource manager dropped without cleanup");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<String>>,
        fail: Vec<&'static str>,
        gone: Vec<&'static str>,
    }

    #[async_trait]
    impl ResourceDeleter for Recording {
        async fn delete(&self, kind: ResourceKind, id: &str) -> Result<()> {
            self.calls.lock().unwrap().push(id.to_string());
            if self.fail.iter().any(|f| *f == id) {
                return Err(Error::Backend {
                    status: Some(500),
                    code: None,
                    message: "boom".into(),
                });
            }
            if self.gone.iter().any(|g| *g == id) {
                return Err(Error::not_found(kind, id));
            }
            Ok(())
        }
    }

    fn explode() -> Result<()> {
        panic!("body panicked")
    }

    #[tokio::test]
    async fn test_reverse_order_and_best_effort() {
        let deleter = Arc::new(Recording {
            fail: vec!["t2"],
            gone: vec!["t1"],
            ..Default::default()
        });
        let manager = ResourceManager::new(deleter.clone());
        manager.register(ResourceKind::Tool, "t1");
        manager.register(ResourceKind::Tool, "t2");
        manager.register(ResourceKind::Mcp, "m1");
        manager.register(ResourceKind::Agent, "a1");

        let report = manager.run_cleanup().await;
        assert_eq!(*deleter.calls.lock().unwrap(), vec!["a1", "m1", "t2", "t1"]);
        assert_eq!(report.attempted, 4);
        assert_eq!(report.deleted, 2);
        assert_eq!(report.already_gone, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, "t2");
        assert!(manager.pending().is_empty());
    }

    #[tokio::test]
    async fn test_forget() {
        let deleter = Arc::new(Recording::default());
        let manager = ResourceManager::new(deleter.clone());
        manager.register(ResourceKind::Tool, "t1");
        assert!(manager.forget(ResourceKind::Tool, "t1"));
        assert!(!manager.forget(ResourceKind::Tool, "t1"));
        assert_eq!(manager.run_cleanup().await.attempted, 0);
    }

    #[tokio::test]
    async fn test_scoped_cleans_up_on_error() {
        let deleter = Arc::new(Recording::default());
        let result: Result<()> = ResourceManager::scoped(deleter.clone(), |scope| async move {
            scope.register(ResourceKind::Tool, "t1");
            Err(Error::validation("body failed"))
        })
        .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(*deleter.calls.lock().unwrap(), vec!["t1"]);
    }

    #[tokio::test]
    async fn test_scoped_cleans_up_on_panic() {
        let deleter = Arc::new(Recording::default());
        let inner = deleter.clone();
        let handle = tokio::spawn(async move {
            let _: Result<()> = ResourceManager::scoped(inner, |scope| async move {
                scope.register(ResourceKind::Agent, "a1");
                explode()
            })
            .await;
        });
        assert!(handle.await.unwrap_err().is_panic());
        assert_eq!(*deleter.calls.lock().unwrap(), vec!["a1"]);
    }

    #[tokio::test]
    async fn test_scoped_with_cancel() {
        let deleter = Arc::new(Recording::default());
        let token = CancellationToken::new();
        let reached = Arc::new(AtomicUsize::new(0));
        let seen = reached.clone();

        let cancel = token.clone();
        let result: Result<()> =
            ResourceManager::scoped_with_cancel(deleter.clone(), token, |scope| async move {
                scope.register(ResourceKind::Tool, "t1");
                cancel.cancel();
                tokio::task::yield_now().await;
                std::future::pending::<()>().await;
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(reached.load(Ordering::SeqCst), 0);
        assert_eq!(*deleter.calls.lock().unwrap(), vec!["t1"]);
    }
}

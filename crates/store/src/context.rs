//! Per-call cancellation and deadlines.
//!
//! A [`CallContext`] is passed to every storage operation. Cancelling it (or
//! letting its deadline pass) drops the in-flight database future, which
//! aborts the query and rolls back any transaction it had open.
//!
//! Transactional writes race only their work against the context. The final
//! `COMMIT` is never interrupted, so a write that reports `Cancelled` was
//! rolled back and one that reports success is stored.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::storage::{StoreError, StoreResult};

/// Cancellation handle and optional deadline for one unit of work.
///
/// Cloning shares the same token; [`CallContext::child`] derives a context
/// that is cancelled with its parent but can also be cancelled on its own.
#[derive(Debug, Clone)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}

impl CallContext {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Derive a context cancelled together with this one.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child whose deadline is the earlier of the parent's and
    /// `timeout` from now.
    #[must_use]
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let requested = Instant::now() + timeout;
        Self {
            token: self.token.child_token(),
            deadline: Some(self.deadline.map_or(requested, |d| d.min(requested))),
        }
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `true` once the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// The underlying token, for wiring into signal handlers.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Fail if the context is already cancelled or past its deadline.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Cancelled` or `StoreError::DeadlineExceeded`.
    pub fn check(&self, op: &'static str) -> StoreResult<()> {
        if self.is_cancelled() {
            return Err(StoreError::Cancelled { op });
        }
        if self.is_expired() {
            return Err(StoreError::DeadlineExceeded { op });
        }
        Ok(())
    }

    /// Run `fut` unless the context is cancelled or expires first.
    ///
    /// An already cancelled or expired context fails without polling `fut`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Cancelled` or `StoreError::DeadlineExceeded` when
    /// the context wins the race, otherwise whatever `fut` returns.
    pub async fn run<T, F>(&self, op: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        self.check(op)?;

        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(StoreError::Cancelled { op }),
            () = deadline => Err(StoreError::DeadlineExceeded { op }),
            result = fut => result,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::storage::ErrorKind;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = CallContext::background();
        let value = ctx.run("op", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_already_cancelled_never_polls() {
        let ctx = CallContext::background();
        ctx.cancel();

        let polled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&polled);
        let err = ctx
            .run("get_product", async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Cancelled { op: "get_product" }));
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_work() {
        let ctx = CallContext::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = ctx
            .run("list_orders", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(matches!(err, StoreError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let ctx = CallContext::with_timeout(Duration::from_millis(20));
        let err = ctx
            .run("list_users", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::DeadlineExceeded { op: "list_users" }));
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_check_reports_cancel_before_deadline() {
        let ctx = CallContext::with_deadline(Instant::now());
        assert!(matches!(
            ctx.check("create_order"),
            Err(StoreError::DeadlineExceeded { .. })
        ));

        ctx.cancel();
        assert!(matches!(
            ctx.check("create_order"),
            Err(StoreError::Cancelled { .. })
        ));

        assert!(CallContext::background().check("create_order").is_ok());
    }

    #[tokio::test]
    async fn test_parent_cancel_reaches_child() {
        let parent = CallContext::background();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());

        let sibling = CallContext::background();
        let grandchild = sibling.child();
        grandchild.cancel();
        assert!(!sibling.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_with_timeout_keeps_earlier_deadline() {
        let parent = CallContext::with_timeout(Duration::from_millis(50));
        let child = parent.child_with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let ctx = CallContext::with_timeout(Duration::from_secs(5));
        let err = ctx
            .run::<(), _>("delete_order", async {
                Err(StoreError::NotFound {
                    entity: crate::storage::Entity::Order,
                })
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

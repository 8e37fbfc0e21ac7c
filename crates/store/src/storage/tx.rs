//! Transaction scope shared by both backends.
//!
//! Only `create_order` and `delete_order` open transactions. The work runs
//! against the open scope and its outcome is handed to [`settle`], which
//! commits or rolls back. A scope dropped without settling rolls back in
//! both drivers.

use async_trait::async_trait;
use tracing::{error, warn};

use super::error::{BoxError, StoreError, StoreResult};
use crate::context::CallContext;

/// An open database transaction that can be finished exactly once.
#[async_trait]
pub trait TxScope: Send + Sized {
    async fn commit(self) -> Result<(), BoxError>;
    async fn rollback(self) -> Result<(), BoxError>;
}

#[async_trait]
impl TxScope for sqlx::Transaction<'static, sqlx::Postgres> {
    async fn commit(self) -> Result<(), BoxError> {
        sqlx::Transaction::commit(self).await.map_err(Into::into)
    }

    async fn rollback(self) -> Result<(), BoxError> {
        sqlx::Transaction::rollback(self).await.map_err(Into::into)
    }
}

#[async_trait]
impl TxScope for sea_orm::DatabaseTransaction {
    async fn commit(self) -> Result<(), BoxError> {
        sea_orm::DatabaseTransaction::commit(self)
            .await
            .map_err(Into::into)
    }

    async fn rollback(self) -> Result<(), BoxError> {
        sea_orm::DatabaseTransaction::rollback(self)
            .await
            .map_err(Into::into)
    }
}

/// Finish `tx` according to `outcome`.
///
/// - `Ok`: commit. A failed commit is reported as `StoreError::Io`.
/// - `Err`: roll back and return the original error, or
///   `StoreError::RollbackFailed` carrying both errors if the rollback fails.
pub async fn settle<T, S: TxScope>(
    tx: S,
    op: &'static str,
    outcome: StoreResult<T>,
) -> StoreResult<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await.map_err(|source| StoreError::Io { op, source })?;
            Ok(value)
        }
        Err(original) => match tx.rollback().await {
            Ok(()) => {
                warn!(op, error = %original, "transaction rolled back");
                Err(original)
            }
            Err(rollback) => {
                error!(op, error = %original, rollback_error = %rollback, "rollback failed");
                Err(StoreError::RollbackFailed {
                    op,
                    original: Box::new(original),
                    rollback,
                })
            }
        },
    }
}

/// Like [`settle`], for work that ran under `ctx`.
///
/// The context gets one last say before the commit: if it was cancelled or
/// expired while the work ran, the transaction is rolled back instead. From
/// then on the commit or rollback is not raced against the context.
pub async fn settle_in<T, S: TxScope>(
    ctx: &CallContext,
    tx: S,
    op: &'static str,
    outcome: StoreResult<T>,
) -> StoreResult<T> {
    let outcome = outcome.and_then(|value| ctx.check(op).map(|()| value));
    settle(tx, op, outcome).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::storage::{Entity, ErrorKind};

    #[derive(Default)]
    struct FakeTx {
        fail_commit: bool,
        fail_rollback: bool,
        cancel_on_commit: Option<CallContext>,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl TxScope for FakeTx {
        async fn commit(self) -> Result<(), BoxError> {
            self.log.lock().unwrap().push("commit");
            if let Some(ctx) = &self.cancel_on_commit {
                ctx.cancel();
            }
            if self.fail_commit {
                return Err("commit refused".into());
            }
            Ok(())
        }

        async fn rollback(self) -> Result<(), BoxError> {
            self.log.lock().unwrap().push("rollback");
            if self.fail_rollback {
                return Err("connection lost".into());
            }
            Ok(())
        }
    }

    fn not_found() -> StoreError {
        StoreError::NotFound {
            entity: Entity::Order,
        }
    }

    #[tokio::test]
    async fn test_success_commits() {
        let tx = FakeTx::default();
        let log = Arc::clone(&tx.log);

        let value = settle(tx, "create_order", Ok(5)).await.unwrap();

        assert_eq!(value, 5);
        assert_eq!(*log.lock().unwrap(), vec!["commit"]);
    }

    #[tokio::test]
    async fn test_commit_failure_is_io() {
        let tx = FakeTx {
            fail_commit: true,
            ..FakeTx::default()
        };

        let err = settle(tx, "create_order", Ok(())).await.unwrap_err();

        assert!(matches!(err, StoreError::Io { op: "create_order", .. }));
        assert!(!err.is_state_uncertain());
    }

    #[tokio::test]
    async fn test_failure_rolls_back_and_returns_original() {
        let tx = FakeTx::default();
        let log = Arc::clone(&tx.log);

        let err = settle::<(), _>(tx, "delete_order", Err(not_found()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(*log.lock().unwrap(), vec!["rollback"]);
    }

    #[tokio::test]
    async fn test_rollback_failure_is_reported_distinctly() {
        let tx = FakeTx {
            fail_rollback: true,
            ..FakeTx::default()
        };

        let err = settle::<(), _>(tx, "delete_order", Err(not_found()))
            .await
            .unwrap_err();

        assert!(err.is_state_uncertain());
        match err {
            StoreError::RollbackFailed {
                op,
                original,
                rollback,
            } => {
                assert_eq!(op, "delete_order");
                assert_eq!(original.kind(), ErrorKind::NotFound);
                assert_eq!(rollback.to_string(), "connection lost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_commit_rolls_back() {
        let ctx = CallContext::background();
        ctx.cancel();
        let tx = FakeTx::default();
        let log = Arc::clone(&tx.log);

        let err = settle_in(&ctx, tx, "create_order", Ok(5)).await.unwrap_err();

        assert!(matches!(err, StoreError::Cancelled { op: "create_order" }));
        assert_eq!(*log.lock().unwrap(), vec!["rollback"]);
    }

    #[tokio::test]
    async fn test_cancel_during_commit_still_reports_success() {
        let ctx = CallContext::background();
        let tx = FakeTx {
            cancel_on_commit: Some(ctx.clone()),
            ..FakeTx::default()
        };
        let log = Arc::clone(&tx.log);

        let value = settle_in(&ctx, tx, "create_order", Ok(5)).await.unwrap();

        assert_eq!(value, 5);
        assert!(ctx.is_cancelled());
        assert_eq!(*log.lock().unwrap(), vec!["commit"]);
    }
}

//! Storage error taxonomy.
//!
//! Every backend reports failures through [`StoreError`]. Callers branch on
//! [`StoreError::kind`] rather than on message text; the message and the
//! preserved source chain are for logs.

use std::fmt;

use thiserror::Error;

/// Boxed driver error kept as the `source` of an I/O failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used across the storage contract.
pub type StoreResult<T> = Result<T, StoreError>;

/// The persisted record types, used to say which lookup or write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Product,
    User,
    Order,
    OrderItem,
    Session,
}

impl Entity {
    /// Human-readable name used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::User => "user",
            Self::Order => "order",
            Self::OrderItem => "order item",
            Self::Session => "session",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No row matched the key.
    NotFound,
    /// A uniqueness constraint rejected the write.
    AlreadyExists,
    /// A foreign key rejected the write.
    InvalidReference,
    /// Driver, network, transaction or data-integrity failure.
    Io,
    /// The call context was cancelled or its deadline passed.
    Cancelled,
}

/// Errors returned by every [`Storage`](super::Storage) operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row matched the lookup, update or delete.
    #[error("{entity} not found")]
    NotFound { entity: Entity },

    /// A uniqueness constraint (e.g. user email) was violated.
    #[error("{entity} already exists")]
    AlreadyExists { entity: Entity },

    /// The write referenced a missing row, or a delete would orphan a
    /// referencing row.
    #[error("{entity} write violates a foreign key")]
    InvalidReference { entity: Entity },

    /// Any other driver or network failure, including commit failures.
    #[error("database error during {op}")]
    Io {
        op: &'static str,
        #[source]
        source: BoxError,
    },

    /// A stored value failed domain validation when read back.
    #[error("data corruption during {op}: {detail}")]
    DataCorruption { op: &'static str, detail: String },

    /// A transactional write failed and so did its rollback. The database
    /// state is uncertain.
    #[error("{op} failed ({original}) and rollback also failed")]
    RollbackFailed {
        op: &'static str,
        original: Box<StoreError>,
        #[source]
        rollback: BoxError,
    },

    /// The call context was cancelled while the operation was in flight.
    #[error("{op} cancelled")]
    Cancelled { op: &'static str },

    /// The call context's deadline passed while the operation was in flight.
    #[error("{op} exceeded its deadline")]
    DeadlineExceeded { op: &'static str },
}

impl StoreError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::InvalidReference { .. } => ErrorKind::InvalidReference,
            Self::Io { .. } | Self::DataCorruption { .. } | Self::RollbackFailed { .. } => {
                ErrorKind::Io
            }
            Self::Cancelled { .. } | Self::DeadlineExceeded { .. } => ErrorKind::Cancelled,
        }
    }

    /// `true` when a transactional write failed without a clean rollback.
    #[must_use]
    pub const fn is_state_uncertain(&self) -> bool {
        matches!(self, Self::RollbackFailed { .. })
    }

    pub(crate) fn io(op: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Io {
            op,
            source: source.into(),
        }
    }

    pub(crate) fn corrupt(op: &'static str, detail: impl fmt::Display) -> Self {
        Self::DataCorruption {
            op,
            detail: detail.to_string(),
        }
    }

    /// Classify a `sqlx` error raised while `op` touched `entity`.
    pub(crate) fn from_sqlx(err: sqlx::Error, op: &'static str, entity: Entity) -> Self {
        if matches!(err, sqlx::Error::RowNotFound) {
            return Self::NotFound { entity };
        }
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return Self::AlreadyExists { entity };
            }
            if db.is_foreign_key_violation() {
                return Self::InvalidReference { entity };
            }
        }
        Self::io(op, err)
    }

    /// Classify a `sea-orm` error raised while `op` touched `entity`.
    pub(crate) fn from_orm(err: sea_orm::DbErr, op: &'static str, entity: Entity) -> Self {
        use sea_orm::{DbErr, SqlErr};

        if matches!(err, DbErr::RecordNotFound(_) | DbErr::RecordNotUpdated) {
            return Self::NotFound { entity };
        }
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => Self::AlreadyExists { entity },
            Some(SqlErr::ForeignKeyConstraintViolation(_)) => Self::InvalidReference { entity },
            _ if is_sqlite_restrict_violation(&err) => Self::InvalidReference { entity },
            _ => Self::io(op, err),
        }
    }
}

/// SQLite reports a refused `ON DELETE RESTRICT` as `SQLITE_CONSTRAINT_TRIGGER`
/// rather than `SQLITE_CONSTRAINT_FOREIGNKEY`, which `DbErr::sql_err` does
/// not recognise.
fn is_sqlite_restrict_violation(err: &sea_orm::DbErr) -> bool {
    use sea_orm::{DbErr, RuntimeErr};

    let (DbErr::Exec(RuntimeErr::SqlxError(sqlx::Error::Database(db)))
    | DbErr::Query(RuntimeErr::SqlxError(sqlx::Error::Database(db)))) = err
    else {
        return false;
    };
    is_restrict_code(db.code().as_deref(), db.message())
}

fn is_restrict_code(code: Option<&str>, message: &str) -> bool {
    const SQLITE_CONSTRAINT_TRIGGER: &str = "1811";
    code == Some(SQLITE_CONSTRAINT_TRIGGER) && message.contains("FOREIGN KEY constraint failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let cases = [
            (
                StoreError::NotFound {
                    entity: Entity::Product,
                },
                ErrorKind::NotFound,
            ),
            (
                StoreError::AlreadyExists {
                    entity: Entity::User,
                },
                ErrorKind::AlreadyExists,
            ),
            (
                StoreError::InvalidReference {
                    entity: Entity::OrderItem,
                },
                ErrorKind::InvalidReference,
            ),
            (StoreError::corrupt("get_user", "bad email"), ErrorKind::Io),
            (StoreError::Cancelled { op: "list_orders" }, ErrorKind::Cancelled),
            (
                StoreError::DeadlineExceeded { op: "list_orders" },
                ErrorKind::Cancelled,
            ),
        ];

        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
            assert!(!err.is_state_uncertain());
        }
    }

    #[test]
    fn test_rollback_failure_is_uncertain_and_keeps_both_errors() {
        let err = StoreError::RollbackFailed {
            op: "create_order",
            original: Box::new(StoreError::InvalidReference {
                entity: Entity::OrderItem,
            }),
            rollback: "connection reset".into(),
        };

        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.is_state_uncertain());
        let message = err.to_string();
        assert!(message.contains("create_order"));
        assert!(message.contains("order item write violates a foreign key"));
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("connection reset"));
    }

    #[test]
    fn test_sqlx_row_not_found_maps_to_not_found() {
        let err = StoreError::from_sqlx(sqlx::Error::RowNotFound, "get_order", Entity::Order);
        assert!(matches!(
            err,
            StoreError::NotFound {
                entity: Entity::Order
            }
        ));
    }

    #[test]
    fn test_sqlx_other_errors_are_io_with_source() {
        let err = StoreError::from_sqlx(sqlx::Error::PoolTimedOut, "list_users", Entity::User);
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.to_string(), "database error during list_users");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_orm_not_found_and_not_updated_map_to_not_found() {
        let missing = StoreError::from_orm(
            sea_orm::DbErr::RecordNotFound("products".to_owned()),
            "get_product",
            Entity::Product,
        );
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let not_updated = StoreError::from_orm(
            sea_orm::DbErr::RecordNotUpdated,
            "update_user",
            Entity::User,
        );
        assert_eq!(not_updated.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_sqlite_restrict_code_is_a_foreign_key_violation() {
        assert!(is_restrict_code(Some("1811"), "FOREIGN KEY constraint failed"));
        assert!(!is_restrict_code(Some("1811"), "raised by trigger"));
        assert!(!is_restrict_code(Some("2067"), "UNIQUE constraint failed: users.email"));
        assert!(!is_restrict_code(None, "FOREIGN KEY constraint failed"));
    }

    #[test]
    fn test_orm_custom_error_is_io() {
        let err = StoreError::from_orm(
            sea_orm::DbErr::Custom("boom".to_owned()),
            "list_products",
            Entity::Product,
        );
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}

//! The storage contract and its two backends.
//!
//! ```text
//!              ┌──────────────────────────┐
//!              │   dyn Storage (contract) │
//!              └──────────────────────────┘
//!                 ↑                     ↑
//!      ┌──────────┴─────────┐  ┌────────┴─────────┐
//!      │     OrmStorage     │  │    PgStorage     │
//!      │ sea-orm, PG/SQLite │  │ sqlx, raw SQL PG │
//!      └────────────────────┘  └──────────────────┘
//! ```
//!
//! Both backends produce the same entities, the same [`ErrorKind`]s and the
//! same atomicity for order creation and deletion. Single-row operations run
//! as autocommit statements; only `create_order` and `delete_order` open a
//! transaction (see [`tx`]).

mod error;
pub mod orm;
pub mod sql;
pub mod tx;

use async_trait::async_trait;

use shopkeep_core::{
    Email, NewOrder, NewProduct, NewSession, NewUser, Order, OrderId, Product, ProductId,
    Session, SessionId, User, UserId,
};

use crate::context::CallContext;

pub use error::{BoxError, Entity, ErrorKind, StoreError, StoreResult};
pub use orm::OrmStorage;
pub use sql::PgStorage;

/// Persistence operations for every entity.
///
/// Every method takes a [`CallContext`]; a cancelled or expired context
/// aborts the operation with `ErrorKind::Cancelled`.
///
/// - Create assigns the identifier and returns the stored row.
/// - Get fails with `NotFound` when no row matches.
/// - Update replaces every mutable column and fails with `NotFound` when
///   zero rows matched.
/// - Delete fails with `NotFound` when zero rows were affected.
/// - Lists are ordered by id; order items within an order are ordered by id.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Short name of the backend (`"orm"` or `"sql"`).
    fn backend_name(&self) -> &'static str;

    /// Create any missing tables. Idempotent.
    async fn ensure_schema(&self, ctx: &CallContext) -> StoreResult<()>;

    // Products

    async fn create_product(&self, ctx: &CallContext, product: NewProduct)
    -> StoreResult<Product>;
    async fn get_product(&self, ctx: &CallContext, id: ProductId) -> StoreResult<Product>;
    async fn list_products(&self, ctx: &CallContext) -> StoreResult<Vec<Product>>;
    async fn update_product(&self, ctx: &CallContext, product: Product) -> StoreResult<Product>;
    async fn delete_product(&self, ctx: &CallContext, id: ProductId) -> StoreResult<()>;

    // Users

    async fn create_user(&self, ctx: &CallContext, user: NewUser) -> StoreResult<User>;
    async fn get_user(&self, ctx: &CallContext, id: UserId) -> StoreResult<User>;
    async fn get_user_by_email(&self, ctx: &CallContext, email: &Email) -> StoreResult<User>;
    async fn list_users(&self, ctx: &CallContext) -> StoreResult<Vec<User>>;
    async fn update_user(&self, ctx: &CallContext, user: User) -> StoreResult<User>;
    async fn delete_user(&self, ctx: &CallContext, id: UserId) -> StoreResult<()>;

    // Orders

    /// Insert the header and every item atomically.
    async fn create_order(&self, ctx: &CallContext, order: NewOrder) -> StoreResult<Order>;
    async fn get_order(&self, ctx: &CallContext, id: OrderId) -> StoreResult<Order>;
    async fn list_orders(&self, ctx: &CallContext) -> StoreResult<Vec<Order>>;
    async fn list_user_orders(&self, ctx: &CallContext, user_id: UserId)
    -> StoreResult<Vec<Order>>;
    /// Delete the items and then the header atomically.
    async fn delete_order(&self, ctx: &CallContext, id: OrderId) -> StoreResult<()>;

    // Sessions

    async fn create_session(&self, ctx: &CallContext, session: NewSession)
    -> StoreResult<Session>;
    /// Does not check expiry or revocation.
    async fn get_session(&self, ctx: &CallContext, id: &SessionId) -> StoreResult<Session>;
    /// Set the revoked flag. Revoking an already revoked session succeeds.
    async fn revoke_session(&self, ctx: &CallContext, id: &SessionId) -> StoreResult<()>;
    async fn delete_session(&self, ctx: &CallContext, id: &SessionId) -> StoreResult<()>;
}

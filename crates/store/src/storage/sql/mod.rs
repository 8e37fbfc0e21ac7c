//! Raw-query backend: hand-written SQL over a `sqlx` [`PgPool`].
//!
//! Inserts and updates use `RETURNING *` so the caller always gets the row as
//! stored. Timestamps are written explicitly rather than left to column
//! defaults, so the queries also run against tables created by the ORM
//! backend. Orders are assembled in application code: one query for the
//! headers, then one query per order for its items, all inside one
//! `REPEATABLE READ` read-only transaction. Multi-statement writes run in an
//! explicit transaction settled by [`settle_in`].

mod rows;

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, instrument};

use shopkeep_core::{
    Email, NewOrder, NewProduct, NewSession, NewUser, Order, OrderId, Product, ProductId,
    Session, SessionId, User, UserId,
};

use self::rows::{OrderItemRow, OrderRow, ProductRow, SessionRow, UserRow};
use super::tx::settle_in;
use super::{Entity, Storage, StoreError, StoreResult};
use crate::context::CallContext;

const SCHEMA: &str = include_str!("schema.sql");

fn sql_err(op: &'static str, entity: Entity) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |err| StoreError::from_sqlx(err, op, entity)
}

const fn not_found(entity: Entity) -> StoreError {
    StoreError::NotFound { entity }
}

/// [`Storage`] backed by hand-written PostgreSQL queries.
#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a read-only transaction pinned to one snapshot. Headers and the
    /// item queries that follow them then agree even while a delete commits.
    async fn snapshot(&self, op: &'static str) -> StoreResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await.map_err(|e| StoreError::io(op, e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::io(op, e))?;
        Ok(tx)
    }
}

async fn items_for(
    conn: &mut PgConnection,
    op: &'static str,
    order_id: OrderId,
) -> StoreResult<Vec<OrderItemRow>> {
    sqlx::query_as::<_, OrderItemRow>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(sql_err(op, Entity::OrderItem))
}

/// Attach items to each header, one follow-up query per order.
async fn assemble(
    conn: &mut PgConnection,
    op: &'static str,
    headers: Vec<OrderRow>,
) -> StoreResult<Vec<Order>> {
    let mut orders = Vec::with_capacity(headers.len());
    for header in headers {
        let items = items_for(conn, op, header.id).await?;
        orders.push(header.with_items(items));
    }
    Ok(orders)
}

async fn insert_order(
    tx: &mut Transaction<'static, Postgres>,
    input: NewOrder,
) -> StoreResult<Order> {
    const OP: &str = "create_order";

    let header = sqlx::query_as::<_, OrderRow>(
        r"
        INSERT INTO orders
            (payment_method, tax_price, shipping_price, total_price, user_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
        RETURNING *
        ",
    )
    .bind(&input.payment_method)
    .bind(input.tax_price)
    .bind(input.shipping_price)
    .bind(input.total_price)
    .bind(input.user_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(sql_err(OP, Entity::Order))?;

    let mut items = Vec::with_capacity(input.items.len());
    for item in &input.items {
        let row = sqlx::query_as::<_, OrderItemRow>(
            r"
            INSERT INTO order_items
                (name, quantity, image, price, product_id, order_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            RETURNING *
            ",
        )
        .bind(&item.name)
        .bind(item.quantity)
        .bind(&item.image)
        .bind(item.price)
        .bind(item.product_id)
        .bind(header.id)
        .fetch_one(&mut **tx)
        .await
        .map_err(sql_err(OP, Entity::OrderItem))?;
        items.push(row);
    }

    debug!(order_id = %header.id, items = items.len(), "order created");
    Ok(header.with_items(items))
}

async fn remove_order(tx: &mut Transaction<'static, Postgres>, id: OrderId) -> StoreResult<()> {
    const OP: &str = "delete_order";

    sqlx::query("DELETE FROM order_items WHERE order_id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(sql_err(OP, Entity::OrderItem))?;

    let result = sqlx::query("DELETE FROM orders WHERE id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(sql_err(OP, Entity::Order))?;
    if result.rows_affected() == 0 {
        return Err(not_found(Entity::Order));
    }
    Ok(())
}

#[async_trait]
impl Storage for PgStorage {
    fn backend_name(&self) -> &'static str {
        "sql"
    }

    async fn ensure_schema(&self, ctx: &CallContext) -> StoreResult<()> {
        const OP: &str = "ensure_schema";
        ctx.run(OP, async {
            sqlx::raw_sql(SCHEMA)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::io(OP, e))?;
            debug!("schema ensured");
            Ok(())
        })
        .await
    }

    // =========================================================================
    // Products
    // =========================================================================

    async fn create_product(&self, ctx: &CallContext, input: NewProduct) -> StoreResult<Product> {
        const OP: &str = "create_product";
        ctx.run(OP, async {
            let row = sqlx::query_as::<_, ProductRow>(
                r"
                INSERT INTO products (
                    name, image, category, description, rating, num_reviews, price,
                    count_in_stock, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
                RETURNING *
                ",
            )
            .bind(&input.name)
            .bind(&input.image)
            .bind(&input.category)
            .bind(&input.description)
            .bind(input.rating)
            .bind(input.num_reviews)
            .bind(input.price)
            .bind(input.count_in_stock)
            .fetch_one(&self.pool)
            .await
            .map_err(sql_err(OP, Entity::Product))?;

            let product = Product::from(row);
            debug!(product_id = %product.id, "product created");
            Ok(product)
        })
        .await
    }

    async fn get_product(&self, ctx: &CallContext, id: ProductId) -> StoreResult<Product> {
        const OP: &str = "get_product";
        ctx.run(OP, async {
            sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(sql_err(OP, Entity::Product))?
                .map(Product::from)
                .ok_or(not_found(Entity::Product))
        })
        .await
    }

    async fn list_products(&self, ctx: &CallContext) -> StoreResult<Vec<Product>> {
        const OP: &str = "list_products";
        ctx.run(OP, async {
            let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(sql_err(OP, Entity::Product))?;
            Ok(rows.into_iter().map(Product::from).collect())
        })
        .await
    }

    async fn update_product(&self, ctx: &CallContext, input: Product) -> StoreResult<Product> {
        const OP: &str = "update_product";
        ctx.run(OP, async {
            let row = sqlx::query_as::<_, ProductRow>(
                r"
                UPDATE products
                SET name = $2, image = $3, category = $4, description = $5, rating = $6,
                    num_reviews = $7, price = $8, count_in_stock = $9, updated_at = NOW()
                WHERE id = $1
                RETURNING *
                ",
            )
            .bind(input.id)
            .bind(&input.name)
            .bind(&input.image)
            .bind(&input.category)
            .bind(&input.description)
            .bind(input.rating)
            .bind(input.num_reviews)
            .bind(input.price)
            .bind(input.count_in_stock)
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err(OP, Entity::Product))?
            .ok_or(not_found(Entity::Product))?;

            debug!(product_id = %input.id, "product updated");
            Ok(Product::from(row))
        })
        .await
    }

    async fn delete_product(&self, ctx: &CallContext, id: ProductId) -> StoreResult<()> {
        const OP: &str = "delete_product";
        ctx.run(OP, async {
            let result = sqlx::query("DELETE FROM products WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(sql_err(OP, Entity::Product))?;
            if result.rows_affected() == 0 {
                return Err(not_found(Entity::Product));
            }
            debug!(product_id = %id, "product deleted");
            Ok(())
        })
        .await
    }

    // =========================================================================
    // Users
    // =========================================================================

    async fn create_user(&self, ctx: &CallContext, input: NewUser) -> StoreResult<User> {
        const OP: &str = "create_user";
        ctx.run(OP, async {
            let row = sqlx::query_as::<_, UserRow>(
                r"
                INSERT INTO users (name, email, password, is_admin, created_at, updated_at)
                VALUES ($1, $2, $3, $4, NOW(), NOW())
                RETURNING *
                ",
            )
            .bind(&input.name)
            .bind(input.email.as_str())
            .bind(&input.password_hash)
            .bind(input.is_admin)
            .fetch_one(&self.pool)
            .await
            .map_err(sql_err(OP, Entity::User))?;

            let user = row.into_user(OP)?;
            debug!(user_id = %user.id, "user created");
            Ok(user)
        })
        .await
    }

    async fn get_user(&self, ctx: &CallContext, id: UserId) -> StoreResult<User> {
        const OP: &str = "get_user";
        ctx.run(OP, async {
            sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(sql_err(OP, Entity::User))?
                .ok_or(not_found(Entity::User))?
                .into_user(OP)
        })
        .await
    }

    async fn get_user_by_email(&self, ctx: &CallContext, email: &Email) -> StoreResult<User> {
        const OP: &str = "get_user_by_email";
        ctx.run(OP, async {
            sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
                .bind(email.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(sql_err(OP, Entity::User))?
                .ok_or(not_found(Entity::User))?
                .into_user(OP)
        })
        .await
    }

    async fn list_users(&self, ctx: &CallContext) -> StoreResult<Vec<User>> {
        const OP: &str = "list_users";
        ctx.run(OP, async {
            sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(sql_err(OP, Entity::User))?
                .into_iter()
                .map(|row| row.into_user(OP))
                .collect()
        })
        .await
    }

    async fn update_user(&self, ctx: &CallContext, input: User) -> StoreResult<User> {
        const OP: &str = "update_user";
        ctx.run(OP, async {
            let row = sqlx::query_as::<_, UserRow>(
                r"
                UPDATE users
                SET name = $2, email = $3, password = $4, is_admin = $5, updated_at = NOW()
                WHERE id = $1
                RETURNING *
                ",
            )
            .bind(input.id)
            .bind(&input.name)
            .bind(input.email.as_str())
            .bind(&input.password_hash)
            .bind(input.is_admin)
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err(OP, Entity::User))?
            .ok_or(not_found(Entity::User))?;

            debug!(user_id = %input.id, "user updated");
            row.into_user(OP)
        })
        .await
    }

    async fn delete_user(&self, ctx: &CallContext, id: UserId) -> StoreResult<()> {
        const OP: &str = "delete_user";
        ctx.run(OP, async {
            let result = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(sql_err(OP, Entity::User))?;
            if result.rows_affected() == 0 {
                return Err(not_found(Entity::User));
            }
            debug!(user_id = %id, "user deleted");
            Ok(())
        })
        .await
    }

    // =========================================================================
    // Orders
    // =========================================================================

    #[instrument(skip(self, ctx, input), fields(backend = "sql", user_id = %input.user_id, items = input.items.len()))]
    async fn create_order(&self, ctx: &CallContext, input: NewOrder) -> StoreResult<Order> {
        const OP: &str = "create_order";
        let (tx, outcome) = ctx
            .run(OP, async {
                let mut tx = self.pool.begin().await.map_err(|e| StoreError::io(OP, e))?;
                let outcome = insert_order(&mut tx, input).await;
                Ok((tx, outcome))
            })
            .await?;
        settle_in(ctx, tx, OP, outcome).await
    }

    async fn get_order(&self, ctx: &CallContext, id: OrderId) -> StoreResult<Order> {
        const OP: &str = "get_order";
        ctx.run(OP, async {
            let mut tx = self.snapshot(OP).await?;
            let header = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(sql_err(OP, Entity::Order))?
                .ok_or(not_found(Entity::Order))?;
            let items = items_for(&mut tx, OP, header.id).await?;
            tx.commit().await.map_err(|e| StoreError::io(OP, e))?;
            Ok(header.with_items(items))
        })
        .await
    }

    async fn list_orders(&self, ctx: &CallContext) -> StoreResult<Vec<Order>> {
        const OP: &str = "list_orders";
        ctx.run(OP, async {
            let mut tx = self.snapshot(OP).await?;
            let headers = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders ORDER BY id")
                .fetch_all(&mut *tx)
                .await
                .map_err(sql_err(OP, Entity::Order))?;
            let orders = assemble(&mut tx, OP, headers).await?;
            tx.commit().await.map_err(|e| StoreError::io(OP, e))?;
            Ok(orders)
        })
        .await
    }

    async fn list_user_orders(
        &self,
        ctx: &CallContext,
        user_id: UserId,
    ) -> StoreResult<Vec<Order>> {
        const OP: &str = "list_user_orders";
        ctx.run(OP, async {
            let mut tx = self.snapshot(OP).await?;
            let headers = sqlx::query_as::<_, OrderRow>(
                "SELECT * FROM orders WHERE user_id = $1 ORDER BY id",
            )
            .bind(user_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(sql_err(OP, Entity::Order))?;
            let orders = assemble(&mut tx, OP, headers).await?;
            tx.commit().await.map_err(|e| StoreError::io(OP, e))?;
            Ok(orders)
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(backend = "sql", order_id = %id))]
    async fn delete_order(&self, ctx: &CallContext, id: OrderId) -> StoreResult<()> {
        const OP: &str = "delete_order";
        let (tx, outcome) = ctx
            .run(OP, async {
                let mut tx = self.pool.begin().await.map_err(|e| StoreError::io(OP, e))?;
                let outcome = remove_order(&mut tx, id).await;
                Ok((tx, outcome))
            })
            .await?;
        settle_in(ctx, tx, OP, outcome).await?;
        debug!("order deleted");
        Ok(())
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    #[instrument(skip(self, ctx, input), fields(backend = "sql", session_id = %input.id))]
    async fn create_session(&self, ctx: &CallContext, input: NewSession) -> StoreResult<Session> {
        const OP: &str = "create_session";
        ctx.run(OP, async {
            let row = sqlx::query_as::<_, SessionRow>(
                r"
                INSERT INTO sessions
                    (id, user_email, refresh_token, is_revoked, created_at, expires_at)
                VALUES ($1, $2, $3, FALSE, NOW(), $4)
                RETURNING *
                ",
            )
            .bind(input.id.as_str())
            .bind(input.user_email.as_str())
            .bind(&input.refresh_token)
            .bind(input.expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(sql_err(OP, Entity::Session))?;

            debug!("session created");
            row.into_session(OP)
        })
        .await
    }

    async fn get_session(&self, ctx: &CallContext, id: &SessionId) -> StoreResult<Session> {
        const OP: &str = "get_session";
        ctx.run(OP, async {
            sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(sql_err(OP, Entity::Session))?
                .ok_or(not_found(Entity::Session))?
                .into_session(OP)
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(backend = "sql", session_id = %id))]
    async fn revoke_session(&self, ctx: &CallContext, id: &SessionId) -> StoreResult<()> {
        const OP: &str = "revoke_session";
        ctx.run(OP, async {
            let result = sqlx::query("UPDATE sessions SET is_revoked = TRUE WHERE id = $1")
                .bind(id.as_str())
                .execute(&self.pool)
                .await
                .map_err(sql_err(OP, Entity::Session))?;
            if result.rows_affected() == 0 {
                return Err(not_found(Entity::Session));
            }
            debug!("session revoked");
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(backend = "sql", session_id = %id))]
    async fn delete_session(&self, ctx: &CallContext, id: &SessionId) -> StoreResult<()> {
        const OP: &str = "delete_session";
        ctx.run(OP, async {
            let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
                .bind(id.as_str())
                .execute(&self.pool)
                .await
                .map_err(sql_err(OP, Entity::Session))?;
            if result.rows_affected() == 0 {
                return Err(not_found(Entity::Session));
            }
            debug!("session deleted");
            Ok(())
        })
        .await
    }
}

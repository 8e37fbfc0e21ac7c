//! Declarative-mapping backend built on SeaORM.
//!
//! Orders are read with `find_with_related`, which loads headers and items in
//! one joined query. Order creation inserts the header, then every item in a
//! single batched insert, inside one transaction. Only that work is raced
//! against the call context; the commit itself always runs to completion. Update and delete inspect
//! the affected-row count so a missing row surfaces as `NotFound` rather than
//! a silent no-op.
//!
//! Runs against PostgreSQL in production. With the `sqlite` feature the same
//! code runs against SQLite, which is how the conformance tests exercise it.

pub mod entity;
mod mapper;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::{NotSet, Set, Unchanged};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    DatabaseTransaction, DbErr, EntityTrait, QueryFilter, QueryOrder, Schema, Select,
    TransactionTrait,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};

use shopkeep_core::{
    Email, NewOrder, NewProduct, NewSession, NewUser, Order, OrderId, Product, ProductId,
    Session, SessionId, User, UserId,
};

use self::entity::{order, order_item, product, session, user};
use self::mapper::{order_from_models, product_from_model, session_from_model, user_from_model};
use super::tx::settle_in;
use super::{Entity, Storage, StoreError, StoreResult};
use crate::context::CallContext;

fn orm_err(op: &'static str, entity: Entity) -> impl FnOnce(DbErr) -> StoreError {
    move |err| StoreError::from_orm(err, op, entity)
}

/// [`Storage`] backed by a SeaORM [`DatabaseConnection`].
#[derive(Debug, Clone)]
pub struct OrmStorage {
    db: DatabaseConnection,
}

impl OrmStorage {
    /// Wrap an existing connection.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Open a connection pool for `database_url`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the database cannot be reached.
    pub async fn connect(database_url: &SecretString) -> StoreResult<Self> {
        let mut options = ConnectOptions::new(database_url.expose_secret().to_owned());
        options
            .max_connections(10)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let db = Database::connect(options)
            .await
            .map_err(|e| StoreError::io("connect", e))?;
        Ok(Self::new(db))
    }

    /// The underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

/// Load orders matching `select` with their items, ordered by order id.
async fn find_orders<C: ConnectionTrait>(
    conn: &C,
    op: &'static str,
    select: Select<order::Entity>,
) -> StoreResult<Vec<Order>> {
    let rows = select
        .find_with_related(order_item::Entity)
        .order_by_asc(order::Column::Id)
        .order_by_asc(order_item::Column::Id)
        .all(conn)
        .await
        .map_err(orm_err(op, Entity::Order))?;

    Ok(rows
        .into_iter()
        .map(|(header, items)| order_from_models(header, items))
        .collect())
}

async fn insert_order(txn: &DatabaseTransaction, input: NewOrder) -> StoreResult<Order> {
    const OP: &str = "create_order";
    let now = Utc::now();

    let header = order::ActiveModel {
        payment_method: Set(input.payment_method),
        tax_price: Set(input.tax_price),
        shipping_price: Set(input.shipping_price),
        total_price: Set(input.total_price),
        user_id: Set(input.user_id.as_i32()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(txn)
    .await
    .map_err(orm_err(OP, Entity::Order))?;

    if !input.items.is_empty() {
        let rows = input.items.into_iter().map(|item| order_item::ActiveModel {
            name: Set(item.name),
            quantity: Set(item.quantity),
            image: Set(item.image),
            price: Set(item.price),
            product_id: Set(item.product_id.as_i32()),
            order_id: Set(header.id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        });
        order_item::Entity::insert_many(rows)
            .exec(txn)
            .await
            .map_err(orm_err(OP, Entity::OrderItem))?;
    }

    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(header.id))
        .order_by_asc(order_item::Column::Id)
        .all(txn)
        .await
        .map_err(orm_err(OP, Entity::OrderItem))?;

    debug!(order_id = header.id, items = items.len(), "order created");
    Ok(order_from_models(header, items))
}

async fn remove_order(txn: &DatabaseTransaction, id: OrderId) -> StoreResult<()> {
    const OP: &str = "delete_order";

    order_item::Entity::delete_many()
        .filter(order_item::Column::OrderId.eq(id.as_i32()))
        .exec(txn)
        .await
        .map_err(orm_err(OP, Entity::OrderItem))?;

    let result = order::Entity::delete_by_id(id.as_i32())
        .exec(txn)
        .await
        .map_err(orm_err(OP, Entity::Order))?;
    if result.rows_affected == 0 {
        return Err(StoreError::NotFound {
            entity: Entity::Order,
        });
    }
    Ok(())
}

#[async_trait]
impl Storage for OrmStorage {
    fn backend_name(&self) -> &'static str {
        "orm"
    }

    async fn ensure_schema(&self, ctx: &CallContext) -> StoreResult<()> {
        const OP: &str = "ensure_schema";
        ctx.run(OP, async {
            let backend = self.db.get_database_backend();
            let schema = Schema::new(backend);
            // Referenced tables first.
            let statements = [
                schema.create_table_from_entity(user::Entity),
                schema.create_table_from_entity(product::Entity),
                schema.create_table_from_entity(order::Entity),
                schema.create_table_from_entity(order_item::Entity),
                schema.create_table_from_entity(session::Entity),
            ];
            for mut statement in statements {
                statement.if_not_exists();
                self.db
                    .execute(backend.build(&statement))
                    .await
                    .map_err(|e| StoreError::io(OP, e))?;
            }
            debug!(backend = ?backend, "schema ensured");
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
            let now = Utc::now();
            let model = product::ActiveModel {
                name: Set(input.name),
                image: Set(input.image),
                category: Set(input.category),
                description: Set(input.description),
                rating: Set(input.rating),
                num_reviews: Set(input.num_reviews),
                price: Set(input.price),
                count_in_stock: Set(input.count_in_stock),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&self.db)
            .await
            .map_err(orm_err(OP, Entity::Product))?;

            debug!(product_id = model.id, "product created");
            Ok(product_from_model(model))
        })
        .await
    }

    async fn get_product(&self, ctx: &CallContext, id: ProductId) -> StoreResult<Product> {
        const OP: &str = "get_product";
        ctx.run(OP, async {
            product::Entity::find_by_id(id.as_i32())
                .one(&self.db)
                .await
                .map_err(orm_err(OP, Entity::Product))?
                .map(product_from_model)
                .ok_or(StoreError::NotFound {
                    entity: Entity::Product,
                })
        })
        .await
    }

    async fn list_products(&self, ctx: &CallContext) -> StoreResult<Vec<Product>> {
        const OP: &str = "list_products";
        ctx.run(OP, async {
            let models = product::Entity::find()
                .order_by_asc(product::Column::Id)
                .all(&self.db)
                .await
                .map_err(orm_err(OP, Entity::Product))?;
            Ok(models.into_iter().map(product_from_model).collect())
        })
        .await
    }

    async fn update_product(&self, ctx: &CallContext, input: Product) -> StoreResult<Product> {
        const OP: &str = "update_product";
        ctx.run(OP, async {
            let model = product::ActiveModel {
                id: Unchanged(input.id.as_i32()),
                name: Set(input.name),
                image: Set(input.image),
                category: Set(input.category),
                description: Set(input.description),
                rating: Set(input.rating),
                num_reviews: Set(input.num_reviews),
                price: Set(input.price),
                count_in_stock: Set(input.count_in_stock),
                created_at: NotSet,
                updated_at: Set(Utc::now()),
            }
            .update(&self.db)
            .await
            .map_err(orm_err(OP, Entity::Product))?;

            debug!(product_id = model.id, "product updated");
            Ok(product_from_model(model))
        })
        .await
    }

    async fn delete_product(&self, ctx: &CallContext, id: ProductId) -> StoreResult<()> {
        const OP: &str = "delete_product";
        ctx.run(OP, async {
            let result = product::Entity::delete_by_id(id.as_i32())
                .exec(&self.db)
                .await
                .map_err(orm_err(OP, Entity::Product))?;
            if result.rows_affected == 0 {
                return Err(StoreError::NotFound {
                    entity: Entity::Product,
                });
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
            let now = Utc::now();
            let model = user::ActiveModel {
                name: Set(input.name),
                email: Set(input.email.into_inner()),
                password: Set(input.password_hash),
                is_admin: Set(input.is_admin),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&self.db)
            .await
            .map_err(orm_err(OP, Entity::User))?;

            debug!(user_id = model.id, "user created");
            user_from_model(model, OP)
        })
        .await
    }

    async fn get_user(&self, ctx: &CallContext, id: UserId) -> StoreResult<User> {
        const OP: &str = "get_user";
        ctx.run(OP, async {
            let model = user::Entity::find_by_id(id.as_i32())
                .one(&self.db)
                .await
                .map_err(orm_err(OP, Entity::User))?
                .ok_or(StoreError::NotFound {
                    entity: Entity::User,
                })?;
            user_from_model(model, OP)
        })
        .await
    }

    async fn get_user_by_email(&self, ctx: &CallContext, email: &Email) -> StoreResult<User> {
        const OP: &str = "get_user_by_email";
        ctx.run(OP, async {
            let model = user::Entity::find()
                .filter(user::Column::Email.eq(email.as_str()))
                .one(&self.db)
                .await
                .map_err(orm_err(OP, Entity::User))?
                .ok_or(StoreError::NotFound {
                    entity: Entity::User,
                })?;
            user_from_model(model, OP)
        })
        .await
    }

    async fn list_users(&self, ctx: &CallContext) -> StoreResult<Vec<User>> {
        const OP: &str = "list_users";
        ctx.run(OP, async {
            user::Entity::find()
                .order_by_asc(user::Column::Id)
                .all(&self.db)
                .await
                .map_err(orm_err(OP, Entity::User))?
                .into_iter()
                .map(|model| user_from_model(model, OP))
                .collect()
        })
        .await
    }

    async fn update_user(&self, ctx: &CallContext, input: User) -> StoreResult<User> {
        const OP: &str = "update_user";
        ctx.run(OP, async {
            let model = user::ActiveModel {
                id: Unchanged(input.id.as_i32()),
                name: Set(input.name),
                email: Set(input.email.into_inner()),
                password: Set(input.password_hash),
                is_admin: Set(input.is_admin),
                created_at: NotSet,
                updated_at: Set(Utc::now()),
            }
            .update(&self.db)
            .await
            .map_err(orm_err(OP, Entity::User))?;

            debug!(user_id = model.id, "user updated");
            user_from_model(model, OP)
        })
        .await
    }

    async fn delete_user(&self, ctx: &CallContext, id: UserId) -> StoreResult<()> {
        const OP: &str = "delete_user";
        ctx.run(OP, async {
            let result = user::Entity::delete_by_id(id.as_i32())
                .exec(&self.db)
                .await
                .map_err(orm_err(OP, Entity::User))?;
            if result.rows_affected == 0 {
                return Err(StoreError::NotFound {
                    entity: Entity::User,
                });
            }
            debug!(user_id = %id, "user deleted");
            Ok(())
        })
        .await
    }

    // =========================================================================
    // Orders
    // =========================================================================

    #[instrument(skip(self, ctx, input), fields(backend = "orm", user_id = %input.user_id, items = input.items.len()))]
    async fn create_order(&self, ctx: &CallContext, input: NewOrder) -> StoreResult<Order> {
        const OP: &str = "create_order";
        let (txn, outcome) = ctx
            .run(OP, async {
                let txn = self
                    .db
                    .begin()
                    .await
                    .map_err(|e| StoreError::io(OP, e))?;
                let outcome = insert_order(&txn, input).await;
                Ok((txn, outcome))
            })
            .await?;
        settle_in(ctx, txn, OP, outcome).await
    }

    async fn get_order(&self, ctx: &CallContext, id: OrderId) -> StoreResult<Order> {
        const OP: &str = "get_order";
        ctx.run(OP, async {
            let select = order::Entity::find().filter(order::Column::Id.eq(id.as_i32()));
            find_orders(&self.db, OP, select)
                .await?
                .into_iter()
                .next()
                .ok_or(StoreError::NotFound {
                    entity: Entity::Order,
                })
        })
        .await
    }

    async fn list_orders(&self, ctx: &CallContext) -> StoreResult<Vec<Order>> {
        const OP: &str = "list_orders";
        ctx.run(OP, find_orders(&self.db, OP, order::Entity::find()))
            .await
    }

    async fn list_user_orders(
        &self,
        ctx: &CallContext,
        user_id: UserId,
    ) -> StoreResult<Vec<Order>> {
        const OP: &str = "list_user_orders";
        let select = order::Entity::find().filter(order::Column::UserId.eq(user_id.as_i32()));
        ctx.run(OP, find_orders(&self.db, OP, select)).await
    }

    #[instrument(skip(self, ctx), fields(backend = "orm", order_id = %id))]
    async fn delete_order(&self, ctx: &CallContext, id: OrderId) -> StoreResult<()> {
        const OP: &str = "delete_order";
        let (txn, outcome) = ctx
            .run(OP, async {
                let txn = self
                    .db
                    .begin()
                    .await
                    .map_err(|e| StoreError::io(OP, e))?;
                let outcome = remove_order(&txn, id).await;
                Ok((txn, outcome))
            })
            .await?;
        settle_in(ctx, txn, OP, outcome).await?;
        debug!("order deleted");
        Ok(())
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    #[instrument(skip(self, ctx, input), fields(backend = "orm", session_id = %input.id))]
    async fn create_session(&self, ctx: &CallContext, input: NewSession) -> StoreResult<Session> {
        const OP: &str = "create_session";
        ctx.run(OP, async {
            let model = session::ActiveModel {
                id: Set(input.id.into_inner()),
                user_email: Set(input.user_email.into_inner()),
                refresh_token: Set(input.refresh_token),
                is_revoked: Set(false),
                created_at: Set(Utc::now()),
                expires_at: Set(input.expires_at),
            }
            .insert(&self.db)
            .await
            .map_err(orm_err(OP, Entity::Session))?;

            debug!("session created");
            session_from_model(model, OP)
        })
        .await
    }

    async fn get_session(&self, ctx: &CallContext, id: &SessionId) -> StoreResult<Session> {
        const OP: &str = "get_session";
        ctx.run(OP, async {
            let model = session::Entity::find_by_id(id.as_str())
                .one(&self.db)
                .await
                .map_err(orm_err(OP, Entity::Session))?
                .ok_or(StoreError::NotFound {
                    entity: Entity::Session,
                })?;
            session_from_model(model, OP)
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(backend = "orm", session_id = %id))]
    async fn revoke_session(&self, ctx: &CallContext, id: &SessionId) -> StoreResult<()> {
        const OP: &str = "revoke_session";
        ctx.run(OP, async {
            let result = session::Entity::update_many()
                .col_expr(session::Column::IsRevoked, Expr::value(true))
                .filter(session::Column::Id.eq(id.as_str()))
                .exec(&self.db)
                .await
                .map_err(orm_err(OP, Entity::Session))?;
            if result.rows_affected == 0 {
                return Err(StoreError::NotFound {
                    entity: Entity::Session,
                });
            }
            debug!("session revoked");
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(backend = "orm", session_id = %id))]
    async fn delete_session(&self, ctx: &CallContext, id: &SessionId) -> StoreResult<()> {
        const OP: &str = "delete_session";
        ctx.run(OP, async {
            let result = session::Entity::delete_by_id(id.as_str())
                .exec(&self.db)
                .await
                .map_err(orm_err(OP, Entity::Session))?;
            if result.rows_affected == 0 {
                return Err(StoreError::NotFound {
                    entity: Entity::Session,
                });
            }
            debug!("session deleted");
            Ok(())
        })
        .await
    }
}

//! Behavior every [`Storage`] backend must share.
//!
//! Each check takes `&dyn Storage`, creates its own rows with unique emails
//! and names, and never assumes the tables start empty, so the same function
//! runs against a private SQLite file or a shared PostgreSQL database.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tokio::time::Instant;
use uuid::Uuid;

use shopkeep_core::{
    NewOrderItem, OrderId, Product, ProductId, SessionId, User, UserId,
};
use shopkeep_store::{CallContext, Entity, ErrorKind, Storage, StoreError};

use crate::{money, new_order, new_product, new_session, new_user, order_line, unique_email};

/// A key no test ever creates.
const MISSING: i32 = i32::MAX;

fn unique_name(tag: &str) -> String {
    format!("{tag}-{}", Uuid::new_v4().simple())
}

async fn seed_user(storage: &dyn Storage, tag: &str) -> User {
    storage
        .create_user(&CallContext::background(), new_user(tag))
        .await
        .expect("Failed to create user")
}

async fn seed_product(storage: &dyn Storage, price: Decimal, stock: i32) -> Product {
    storage
        .create_product(
            &CallContext::background(),
            new_product(&unique_name("Widget"), price, stock),
        )
        .await
        .expect("Failed to create product")
}

// =============================================================================
// Products
// =============================================================================

pub async fn product_crud(storage: &dyn Storage) {
    let ctx = CallContext::background();
    let name = unique_name("Widget");

    let created = storage
        .create_product(&ctx, new_product(&name, Decimal::new(999, 2), 5))
        .await
        .expect("Failed to create product");
    assert_eq!(created.name, name);
    assert_eq!(money(created.price), Decimal::new(999, 2));
    assert_eq!(created.count_in_stock, 5);

    let fetched = storage
        .get_product(&ctx, created.id)
        .await
        .expect("Failed to get product");
    assert_eq!(fetched, created);

    let listed = storage
        .list_products(&ctx)
        .await
        .expect("Failed to list products");
    assert!(listed.iter().any(|p| p.id == created.id));
    assert!(listed.iter().map(|p| p.id).is_sorted());

    let mut changed = fetched.clone();
    changed.count_in_stock = 3;
    changed.price = Decimal::new(1099, 2);
    let updated = storage
        .update_product(&ctx, changed)
        .await
        .expect("Failed to update product");
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.count_in_stock, 3);
    assert_eq!(money(updated.price), Decimal::new(1099, 2));
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at >= created.updated_at);

    storage
        .delete_product(&ctx, created.id)
        .await
        .expect("Failed to delete product");
    let err = storage
        .get_product(&ctx, created.id)
        .await
        .expect_err("deleted product is still readable");
    assert!(matches!(err, StoreError::NotFound { entity: Entity::Product }));
}

// =============================================================================
// Users
// =============================================================================

pub async fn user_email_is_unique(storage: &dyn Storage) {
    let ctx = CallContext::background();
    let input = new_user("dup");

    let first = storage
        .create_user(&ctx, input.clone())
        .await
        .expect("Failed to create user");
    assert_eq!(first.email, input.email);
    assert!(!first.is_admin);

    let err = storage
        .create_user(&ctx, input.clone())
        .await
        .expect_err("duplicate email was accepted");
    assert!(matches!(err, StoreError::AlreadyExists { entity: Entity::User }));

    let by_email = storage
        .get_user_by_email(&ctx, &input.email)
        .await
        .expect("Failed to get user by email");
    assert_eq!(by_email, first);
}

pub async fn user_update_and_delete(storage: &dyn Storage) {
    let ctx = CallContext::background();
    let user = seed_user(storage, "alice").await;
    let other = seed_user(storage, "bob").await;

    let mut changed = user.clone();
    changed.name = "Alice Admin".to_string();
    changed.is_admin = true;
    let updated = storage
        .update_user(&ctx, changed)
        .await
        .expect("Failed to update user");
    assert_eq!(updated.name, "Alice Admin");
    assert!(updated.is_admin);
    assert_eq!(updated.password_hash, user.password_hash);
    assert_eq!(updated.created_at, user.created_at);

    let mut clash = updated.clone();
    clash.email = other.email.clone();
    let err = storage
        .update_user(&ctx, clash)
        .await
        .expect_err("update to a taken email was accepted");
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    let listed = storage.list_users(&ctx).await.expect("Failed to list users");
    assert!(listed.iter().any(|u| u.id == user.id));
    assert!(listed.iter().any(|u| u.id == other.id));
    assert!(listed.iter().map(|u| u.id).is_sorted());

    storage
        .delete_user(&ctx, user.id)
        .await
        .expect("Failed to delete user");
    let err = storage
        .get_user(&ctx, user.id)
        .await
        .expect_err("deleted user is still readable");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// =============================================================================
// Orders
// =============================================================================

pub async fn order_create_and_read(storage: &dyn Storage) {
    let ctx = CallContext::background();
    let user = seed_user(storage, "buyer").await;
    let widget = seed_product(storage, Decimal::new(999, 2), 5).await;
    let gadget = seed_product(storage, Decimal::new(450, 2), 10).await;

    let input = new_order(&user, vec![order_line(&widget, 2), order_line(&gadget, 1)]);
    let order = storage
        .create_order(&ctx, input)
        .await
        .expect("Failed to create order");

    assert_eq!(order.user_id, user.id);
    assert_eq!(money(order.total_price), Decimal::new(2448, 2));
    assert_eq!(order.unit_count(), 3);
    assert_eq!(
        order.items.iter().map(|i| i.product_id).collect::<Vec<_>>(),
        vec![widget.id, gadget.id]
    );
    assert!(order.items.iter().all(|i| i.order_id == order.id));

    let fetched = storage
        .get_order(&ctx, order.id)
        .await
        .expect("Failed to get order");
    assert_eq!(fetched, order);

    let mine = storage
        .list_user_orders(&ctx, user.id)
        .await
        .expect("Failed to list user orders");
    assert_eq!(mine, vec![order.clone()]);

    let all = storage
        .list_orders(&ctx)
        .await
        .expect("Failed to list orders");
    let listed = all
        .iter()
        .find(|o| o.id == order.id)
        .expect("new order missing from list");
    assert_eq!(listed.items.len(), 2);
    assert!(all.iter().map(|o| o.id).is_sorted());
}

pub async fn order_without_items(storage: &dyn Storage) {
    let ctx = CallContext::background();
    let user = seed_user(storage, "empty").await;

    let order = storage
        .create_order(&ctx, new_order(&user, Vec::new()))
        .await
        .expect("Failed to create empty order");
    assert!(order.items.is_empty());

    let fetched = storage
        .get_order(&ctx, order.id)
        .await
        .expect("Failed to get empty order");
    assert!(fetched.items.is_empty());
}

pub async fn list_orders_attaches_items(storage: &dyn Storage) {
    let ctx = CallContext::background();
    let user = seed_user(storage, "lists").await;
    let product = seed_product(storage, Decimal::new(100, 2), 50).await;

    let single = storage
        .create_order(&ctx, new_order(&user, vec![order_line(&product, 1)]))
        .await
        .expect("Failed to create order");
    let triple = storage
        .create_order(
            &ctx,
            new_order(
                &user,
                vec![
                    order_line(&product, 1),
                    order_line(&product, 2),
                    order_line(&product, 3),
                ],
            ),
        )
        .await
        .expect("Failed to create order");

    let all = storage
        .list_orders(&ctx)
        .await
        .expect("Failed to list orders");
    let item_count = |id: OrderId| {
        all.iter()
            .find(|o| o.id == id)
            .map(|o| o.items.len())
            .expect("order missing from list")
    };
    assert_eq!(item_count(single.id), 1);
    assert_eq!(item_count(triple.id), 3);

    let mine = storage
        .list_user_orders(&ctx, user.id)
        .await
        .expect("Failed to list user orders");
    assert_eq!(
        mine.iter().map(|o| o.id).collect::<Vec<_>>(),
        vec![single.id, triple.id]
    );
}

/// A bad item aborts the whole order: the header and the good items are
/// rolled back together.
pub async fn order_with_bad_item_persists_nothing(storage: &dyn Storage) -> ProductId {
    let ctx = CallContext::background();
    let user = seed_user(storage, "atomic").await;
    let product = seed_product(storage, Decimal::new(500, 2), 1).await;

    let bad = NewOrderItem {
        product_id: ProductId::new(MISSING),
        ..order_line(&product, 1)
    };
    let input = new_order(&user, vec![order_line(&product, 1), bad]);

    let err = storage
        .create_order(&ctx, input)
        .await
        .expect_err("order with a missing product was accepted");
    assert_eq!(err.kind(), ErrorKind::InvalidReference);
    assert!(!err.is_state_uncertain());

    let mine = storage
        .list_user_orders(&ctx, user.id)
        .await
        .expect("Failed to list user orders");
    assert!(mine.is_empty(), "failed order left a header behind");

    // Nothing references the good product, so it can go.
    storage
        .delete_product(&ctx, product.id)
        .await
        .expect("failed order left an item referencing the product");

    product.id
}

pub async fn order_for_missing_user_is_rejected(storage: &dyn Storage) {
    let ctx = CallContext::background();
    let product = seed_product(storage, Decimal::new(500, 2), 1).await;

    let mut input = new_order(
        &seed_user(storage, "ghost").await,
        vec![order_line(&product, 1)],
    );
    input.user_id = UserId::new(MISSING);

    let err = storage
        .create_order(&ctx, input)
        .await
        .expect_err("order for a missing user was accepted");
    assert_eq!(err.kind(), ErrorKind::InvalidReference);
}

pub async fn delete_order_removes_items(storage: &dyn Storage) {
    let ctx = CallContext::background();
    let user = seed_user(storage, "deleter").await;
    let product = seed_product(storage, Decimal::new(250, 2), 4).await;

    let order = storage
        .create_order(
            &ctx,
            new_order(&user, vec![order_line(&product, 1), order_line(&product, 2)]),
        )
        .await
        .expect("Failed to create order");

    storage
        .delete_order(&ctx, order.id)
        .await
        .expect("Failed to delete order");

    let err = storage
        .get_order(&ctx, order.id)
        .await
        .expect_err("deleted order is still readable");
    assert!(matches!(err, StoreError::NotFound { entity: Entity::Order }));

    let err = storage
        .delete_order(&ctx, order.id)
        .await
        .expect_err("second delete succeeded");
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // The items went with the header, so the product is free to delete.
    storage
        .delete_product(&ctx, product.id)
        .await
        .expect("order items outlived their order");
}

pub async fn referenced_rows_cannot_be_deleted(storage: &dyn Storage) {
    let ctx = CallContext::background();
    let user = seed_user(storage, "holder").await;
    let product = seed_product(storage, Decimal::new(1200, 2), 2).await;

    let order = storage
        .create_order(&ctx, new_order(&user, vec![order_line(&product, 1)]))
        .await
        .expect("Failed to create order");

    let err = storage
        .delete_product(&ctx, product.id)
        .await
        .expect_err("product referenced by an order was deleted");
    assert_eq!(err.kind(), ErrorKind::InvalidReference);

    let err = storage
        .delete_user(&ctx, user.id)
        .await
        .expect_err("user with orders was deleted");
    assert_eq!(err.kind(), ErrorKind::InvalidReference);

    let fetched = storage
        .get_order(&ctx, order.id)
        .await
        .expect("order vanished after rejected deletes");
    assert_eq!(fetched.items.len(), 1);
}

// =============================================================================
// Sessions
// =============================================================================

pub async fn session_lifecycle(storage: &dyn Storage) {
    let ctx = CallContext::background();
    let email = unique_email("session");
    let input = new_session(&email, Duration::hours(1));

    let created = storage
        .create_session(&ctx, input.clone())
        .await
        .expect("Failed to create session");
    assert_eq!(created.id, input.id);
    assert_eq!(created.user_email, email);
    assert_eq!(created.refresh_token, input.refresh_token);
    assert_eq!(created.expires_at, input.expires_at);
    assert!(!created.is_revoked);
    assert!(created.is_usable_at(Utc::now()));

    let err = storage
        .create_session(&ctx, input.clone())
        .await
        .expect_err("duplicate session id was accepted");
    assert!(matches!(err, StoreError::AlreadyExists { entity: Entity::Session }));

    let fetched = storage
        .get_session(&ctx, &input.id)
        .await
        .expect("Failed to get session");
    assert_eq!(fetched, created);

    storage
        .revoke_session(&ctx, &input.id)
        .await
        .expect("Failed to revoke session");
    storage
        .revoke_session(&ctx, &input.id)
        .await
        .expect("revoking twice should be a no-op");
    let revoked = storage
        .get_session(&ctx, &input.id)
        .await
        .expect("Failed to get revoked session");
    assert!(revoked.is_revoked);
    assert!(!revoked.is_usable_at(Utc::now()));

    storage
        .delete_session(&ctx, &input.id)
        .await
        .expect("Failed to delete session");
    let err = storage
        .get_session(&ctx, &input.id)
        .await
        .expect_err("deleted session is still readable");
    assert!(matches!(err, StoreError::NotFound { entity: Entity::Session }));
}

/// Expired sessions are still stored; expiry is the caller's decision.
pub async fn expired_session_is_still_readable(storage: &dyn Storage) {
    let ctx = CallContext::background();
    let input = new_session(&unique_email("stale"), Duration::hours(-1));

    storage
        .create_session(&ctx, input.clone())
        .await
        .expect("Failed to create expired session");
    let fetched = storage
        .get_session(&ctx, &input.id)
        .await
        .expect("Failed to get expired session");
    assert!(fetched.is_expired_at(Utc::now()));
    assert!(!fetched.is_revoked);
}

// =============================================================================
// Missing rows and call contexts
// =============================================================================

pub async fn missing_rows_are_not_found(storage: &dyn Storage) {
    let ctx = CallContext::background();
    let now = Utc::now();

    let ghost_product = Product {
        id: ProductId::new(MISSING),
        name: "Ghost".to_string(),
        image: String::new(),
        category: String::new(),
        description: String::new(),
        rating: 0,
        num_reviews: 0,
        price: Decimal::ONE,
        count_in_stock: 0,
        created_at: now,
        updated_at: now,
    };
    let ghost_user = User {
        id: UserId::new(MISSING),
        name: "Ghost".to_string(),
        email: unique_email("ghost"),
        password_hash: String::new(),
        is_admin: false,
        created_at: now,
        updated_at: now,
    };
    let ghost_session = SessionId::generate();

    let errors = [
        storage.get_product(&ctx, ghost_product.id).await.err(),
        storage.update_product(&ctx, ghost_product.clone()).await.err(),
        storage.delete_product(&ctx, ghost_product.id).await.err(),
        storage.get_user(&ctx, ghost_user.id).await.err(),
        storage.get_user_by_email(&ctx, &ghost_user.email).await.err(),
        storage.update_user(&ctx, ghost_user.clone()).await.err(),
        storage.delete_user(&ctx, ghost_user.id).await.err(),
        storage.get_order(&ctx, OrderId::new(MISSING)).await.err(),
        storage.delete_order(&ctx, OrderId::new(MISSING)).await.err(),
        storage.get_session(&ctx, &ghost_session).await.err(),
        storage.revoke_session(&ctx, &ghost_session).await.err(),
        storage.delete_session(&ctx, &ghost_session).await.err(),
    ];

    for (i, err) in errors.into_iter().enumerate() {
        let err = err.unwrap_or_else(|| panic!("call #{i} found a missing row"));
        assert_eq!(err.kind(), ErrorKind::NotFound, "call #{i}: {err}");
    }

    let empty = storage
        .list_user_orders(&ctx, UserId::new(MISSING))
        .await
        .expect("listing orders of an unknown user should succeed");
    assert!(empty.is_empty());
}

pub async fn cancelled_context_stops_calls(storage: &dyn Storage) {
    let cancelled = CallContext::background();
    cancelled.cancel();
    let name = unique_name("Cancelled");

    let err = storage
        .list_products(&cancelled)
        .await
        .expect_err("cancelled context ran a read");
    assert!(matches!(err, StoreError::Cancelled { .. }));

    let err = storage
        .create_product(&cancelled, new_product(&name, Decimal::ONE, 1))
        .await
        .expect_err("cancelled context ran a write");
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let expired = CallContext::with_deadline(Instant::now());
    let err = storage
        .list_orders(&expired)
        .await
        .expect_err("expired context ran a read");
    assert!(matches!(err, StoreError::DeadlineExceeded { .. }));
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let products = storage
        .list_products(&CallContext::background())
        .await
        .expect("Failed to list products");
    assert!(products.iter().all(|p| p.name != name));
}

// =============================================================================
// Cancellation mid-flight
// =============================================================================

const RACED_CALLS: u64 = 120;

/// Deadlines spread from 50µs to 2ms, so some calls expire before the
/// transaction opens, some during the inserts, and some never.
fn racing_context(i: u64) -> CallContext {
    CallContext::with_timeout(std::time::Duration::from_micros(50 + (i * 97) % 2000))
}

/// A write that reports success is stored in full, and a write that reports
/// cancellation left nothing behind.
pub async fn in_flight_cancellation_is_honest(storage: &dyn Storage) {
    let ctx = CallContext::background();
    let user = seed_user(storage, "racer").await;
    let product = seed_product(storage, Decimal::new(100, 2), 1000).await;
    let lines = || {
        vec![
            order_line(&product, 1),
            order_line(&product, 2),
            order_line(&product, 3),
        ]
    };

    let mut created = Vec::new();
    for i in 0..RACED_CALLS {
        match storage
            .create_order(&racing_context(i), new_order(&user, lines()))
            .await
        {
            Ok(order) => created.push(order.id),
            Err(err) => assert_eq!(err.kind(), ErrorKind::Cancelled, "call #{i}: {err}"),
        }
    }

    let stored = storage
        .list_user_orders(&ctx, user.id)
        .await
        .expect("Failed to list orders");
    let stored_ids: Vec<OrderId> = stored.iter().map(|o| o.id).collect();
    assert_eq!(stored_ids, created, "stored orders differ from reported successes");
    assert!(stored.iter().all(|o| o.items.len() == 3));

    let mut kept = Vec::new();
    for (i, id) in (0..RACED_CALLS).zip(created) {
        match storage.delete_order(&racing_context(i), id).await {
            Ok(()) => {}
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::Cancelled, "delete #{i}: {err}");
                kept.push(id);
            }
        }
    }

    let remaining = storage
        .list_user_orders(&ctx, user.id)
        .await
        .expect("Failed to list orders");
    let remaining_ids: Vec<OrderId> = remaining.iter().map(|o| o.id).collect();
    assert_eq!(remaining_ids, kept, "deleted orders differ from reported successes");
    assert!(remaining.iter().all(|o| o.items.len() == 3));
}

// =============================================================================
// Concurrent readers
// =============================================================================

const CONTENDED_ORDERS: usize = 40;
const READERS: usize = 4;

/// Readers racing a deleter see each order whole or not at all.
pub async fn concurrent_delete_never_exposes_partial_orders(storage: Arc<dyn Storage>) {
    let ctx = CallContext::background();
    let user = seed_user(storage.as_ref(), "contended").await;
    let product = seed_product(storage.as_ref(), Decimal::new(500, 2), 1000).await;

    let mut ids = Vec::with_capacity(CONTENDED_ORDERS);
    for _ in 0..CONTENDED_ORDERS {
        let order = storage
            .create_order(
                &ctx,
                new_order(&user, vec![order_line(&product, 1), order_line(&product, 1)]),
            )
            .await
            .expect("Failed to create order");
        ids.push(order.id);
    }
    let ids = Arc::new(ids);

    let deleter = {
        let storage = Arc::clone(&storage);
        let ids = Arc::clone(&ids);
        tokio::spawn(async move {
            let ctx = CallContext::background();
            for &id in ids.iter() {
                storage
                    .delete_order(&ctx, id)
                    .await
                    .expect("Failed to delete order");
                tokio::task::yield_now().await;
            }
        })
    };

    let readers: Vec<_> = (0..READERS)
        .map(|r| {
            let storage = Arc::clone(&storage);
            let ids = Arc::clone(&ids);
            let user_id = user.id;
            tokio::spawn(async move {
                let ctx = CallContext::background();
                for (i, &id) in ids.iter().enumerate() {
                    match storage.get_order(&ctx, id).await {
                        Ok(order) => assert_eq!(order.items.len(), 2, "reader {r} got a partial order"),
                        Err(err) => assert_eq!(err.kind(), ErrorKind::NotFound, "reader {r}: {err}"),
                    }
                    if i % 4 == r {
                        let orders = storage
                            .list_user_orders(&ctx, user_id)
                            .await
                            .expect("Failed to list orders");
                        assert!(
                            orders.iter().all(|o| o.items.len() == 2),
                            "reader {r} listed a partial order"
                        );
                    }
                }
            })
        })
        .collect();

    deleter.await.expect("deleter panicked");
    for reader in readers {
        reader.await.expect("reader panicked");
    }

    let left = storage
        .list_user_orders(&ctx, user.id)
        .await
        .expect("Failed to list orders");
    assert!(left.is_empty());
}

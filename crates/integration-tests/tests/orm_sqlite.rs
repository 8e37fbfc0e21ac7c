//! ORM backend against a private SQLite file.

use std::sync::Arc;

use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait};

use shopkeep_core::{ProductId, UserId};
use shopkeep_integration_tests::{conformance, empty_sqlite_storage, sqlite_storage};
use shopkeep_store::{CallContext, ErrorKind, Storage, storage::orm::entity::order_item};

#[tokio::test]
async fn test_backend_name() {
    let fixture = sqlite_storage().await;
    assert_eq!(fixture.storage.backend_name(), "orm");
}

#[tokio::test]
async fn test_ensure_schema_is_idempotent() {
    let fixture = sqlite_storage().await;
    fixture
        .storage
        .ensure_schema(&CallContext::background())
        .await
        .expect("Second ensure_schema should succeed");
}

#[tokio::test]
async fn test_product_crud() {
    let fixture = sqlite_storage().await;
    conformance::product_crud(&fixture.storage).await;
}

#[tokio::test]
async fn test_user_email_is_unique() {
    let fixture = sqlite_storage().await;
    conformance::user_email_is_unique(&fixture.storage).await;
}

#[tokio::test]
async fn test_user_update_and_delete() {
    let fixture = sqlite_storage().await;
    conformance::user_update_and_delete(&fixture.storage).await;
}

#[tokio::test]
async fn test_order_create_and_read() {
    let fixture = sqlite_storage().await;
    conformance::order_create_and_read(&fixture.storage).await;
}

#[tokio::test]
async fn test_order_without_items() {
    let fixture = sqlite_storage().await;
    conformance::order_without_items(&fixture.storage).await;
}

#[tokio::test]
async fn test_list_orders_attaches_items() {
    let fixture = sqlite_storage().await;
    conformance::list_orders_attaches_items(&fixture.storage).await;
}

#[tokio::test]
async fn test_order_with_bad_item_persists_nothing() {
    let fixture = sqlite_storage().await;
    let conn = fixture.storage.connection();

    let before = order_item::Entity::find()
        .count(conn)
        .await
        .expect("Failed to count order items");
    conformance::order_with_bad_item_persists_nothing(&fixture.storage).await;
    let after = order_item::Entity::find()
        .count(conn)
        .await
        .expect("Failed to count order items");

    assert_eq!(before, after, "rolled back order left item rows behind");
}

#[tokio::test]
async fn test_order_for_missing_user_is_rejected() {
    let fixture = sqlite_storage().await;
    conformance::order_for_missing_user_is_rejected(&fixture.storage).await;
}

#[tokio::test]
async fn test_delete_order_removes_items() {
    let fixture = sqlite_storage().await;
    conformance::delete_order_removes_items(&fixture.storage).await;

    let remaining = order_item::Entity::find()
        .count(fixture.storage.connection())
        .await
        .expect("Failed to count order items");
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn test_referenced_rows_cannot_be_deleted() {
    let fixture = sqlite_storage().await;
    conformance::referenced_rows_cannot_be_deleted(&fixture.storage).await;
}

#[tokio::test]
async fn test_session_lifecycle() {
    let fixture = sqlite_storage().await;
    conformance::session_lifecycle(&fixture.storage).await;
}

#[tokio::test]
async fn test_expired_session_is_still_readable() {
    let fixture = sqlite_storage().await;
    conformance::expired_session_is_still_readable(&fixture.storage).await;
}

#[tokio::test]
async fn test_missing_rows_are_not_found() {
    let fixture = sqlite_storage().await;
    conformance::missing_rows_are_not_found(&fixture.storage).await;
}

#[tokio::test]
async fn test_cancelled_context_stops_calls() {
    let fixture = sqlite_storage().await;
    conformance::cancelled_context_stops_calls(&fixture.storage).await;
}

#[tokio::test]
async fn test_in_flight_cancellation_is_honest() {
    let fixture = sqlite_storage().await;
    conformance::in_flight_cancellation_is_honest(&fixture.storage).await;

    let conn = fixture.storage.connection();
    let items = order_item::Entity::find()
        .count(conn)
        .await
        .expect("Failed to count order items");
    let orders = fixture
        .storage
        .list_orders(&CallContext::background())
        .await
        .expect("Failed to list orders");
    let listed: usize = orders.iter().map(|o| o.items.len()).sum();
    assert_eq!(
        usize::try_from(items).expect("item count fits usize"),
        listed,
        "cancelled writes left orphaned items"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_delete_never_exposes_partial_orders() {
    let fixture = sqlite_storage().await;
    let storage: Arc<dyn Storage> = Arc::new(fixture.storage.clone());
    conformance::concurrent_delete_never_exposes_partial_orders(storage).await;
}

/// Databases created with `ON DELETE RESTRICT` report a blocked delete with a
/// different SQLite error code, which must still read as a bad reference.
#[tokio::test]
async fn test_restrict_schema_refuses_referenced_deletes() {
    let fixture = empty_sqlite_storage().await;
    let conn = fixture.storage.connection();
    for statement in [
        "CREATE TABLE users (id INTEGER PRIMARY KEY)",
        "CREATE TABLE products (id INTEGER PRIMARY KEY)",
        "CREATE TABLE orders (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users (id) ON DELETE RESTRICT
        )",
        "CREATE TABLE order_items (
            id INTEGER PRIMARY KEY,
            order_id INTEGER NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
            product_id INTEGER NOT NULL REFERENCES products (id) ON DELETE RESTRICT
        )",
        "INSERT INTO users (id) VALUES (1)",
        "INSERT INTO products (id) VALUES (1)",
        "INSERT INTO orders (id, user_id) VALUES (1, 1)",
        "INSERT INTO order_items (id, order_id, product_id) VALUES (1, 1, 1)",
    ] {
        conn.execute_unprepared(statement)
            .await
            .expect("Failed to set up RESTRICT schema");
    }

    let ctx = CallContext::background();
    let err = fixture
        .storage
        .delete_product(&ctx, ProductId::new(1))
        .await
        .expect_err("referenced product was deleted");
    assert_eq!(err.kind(), ErrorKind::InvalidReference, "{err}");

    let err = fixture
        .storage
        .delete_user(&ctx, UserId::new(1))
        .await
        .expect_err("user with orders was deleted");
    assert_eq!(err.kind(), ErrorKind::InvalidReference, "{err}");
}

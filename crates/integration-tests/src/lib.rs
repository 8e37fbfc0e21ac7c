//! Integration tests for Shopkeep.
//!
//! # Running Tests
//!
//! ```bash
//! # ORM backend on a throwaway SQLite file (always runs)
//! cargo test -p shopkeep-integration-tests
//!
//! # Both backends against PostgreSQL
//! TEST_DATABASE_URL=postgres://localhost/shopkeep_test \
//!     cargo test -p shopkeep-integration-tests -- --ignored
//! ```
//!
//! The default run covers only the ORM backend on SQLite. The raw-query
//! backend has no coverage there, so any change under `storage/` must also
//! pass the `--ignored` PostgreSQL run before it is merged.
//!
//! # Layout
//!
//! - [`conformance`] - Checks every backend must pass, written against
//!   `&dyn Storage`
//! - this module - Fixtures and input builders

pub mod conformance;

use chrono::{Duration, SubsecRound, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use tempfile::TempDir;
use uuid::Uuid;

use shopkeep_core::{Email, NewOrder, NewOrderItem, NewProduct, NewSession, NewUser, Product, SessionId, User};
use shopkeep_store::{CallContext, OrmStorage, PgStorage, Storage, db};

/// Environment variable pointing the PostgreSQL tests at a database.
pub const TEST_DATABASE_URL: &str = "TEST_DATABASE_URL";

/// An [`OrmStorage`] on a SQLite file that lives as long as the fixture.
pub struct SqliteFixture {
    pub storage: OrmStorage,
    _dir: TempDir,
}

/// Open a fresh SQLite database with no tables.
pub async fn empty_sqlite_storage() -> SqliteFixture {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("shopkeep.db").display()
    );

    let storage = OrmStorage::connect(&SecretString::from(url))
        .await
        .expect("Failed to open SQLite database");

    SqliteFixture { storage, _dir: dir }
}

/// Open a fresh SQLite database with the schema in place.
pub async fn sqlite_storage() -> SqliteFixture {
    let fixture = empty_sqlite_storage().await;
    fixture
        .storage
        .ensure_schema(&CallContext::background())
        .await
        .expect("Failed to create schema");
    fixture
}

fn test_database_url() -> Option<SecretString> {
    std::env::var(TEST_DATABASE_URL).ok().map(SecretString::from)
}

/// Serializes `CREATE TABLE IF NOT EXISTS`, which races in PostgreSQL when
/// several tests bootstrap at once.
static PG_SCHEMA: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

async fn ensure_pg_schema(storage: &dyn Storage) {
    PG_SCHEMA
        .get_or_init(|| async {
            storage
                .ensure_schema(&CallContext::background())
                .await
                .expect("Failed to create schema");
        })
        .await;
}

/// Raw-SQL backend against `TEST_DATABASE_URL`.
pub async fn pg_storage() -> PgStorage {
    let url = test_database_url().expect("TEST_DATABASE_URL must be set");
    let pool = db::create_pool(&url)
        .await
        .expect("Failed to connect to TEST_DATABASE_URL");
    let storage = PgStorage::new(pool);
    ensure_pg_schema(&storage).await;
    storage
}

/// ORM backend against `TEST_DATABASE_URL`.
pub async fn pg_orm_storage() -> OrmStorage {
    let url = test_database_url().expect("TEST_DATABASE_URL must be set");
    let storage = OrmStorage::connect(&url)
        .await
        .expect("Failed to connect to TEST_DATABASE_URL");
    ensure_pg_schema(&storage).await;
    storage
}

// =============================================================================
// Input builders
// =============================================================================

/// An email no other test will use.
pub fn unique_email(tag: &str) -> Email {
    Email::parse(&format!("{tag}-{}@example.com", Uuid::new_v4().simple()))
        .expect("generated email is valid")
}

pub fn new_user(tag: &str) -> NewUser {
    NewUser {
        name: format!("Test {tag}"),
        email: unique_email(tag),
        password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string(),
        is_admin: false,
    }
}

pub fn new_product(name: &str, price: Decimal, count_in_stock: i32) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        image: format!("/images/{}.png", name.to_lowercase()),
        category: "Gadgets".to_string(),
        description: format!("A fine {name}"),
        rating: 4,
        num_reviews: 12,
        price,
        count_in_stock,
    }
}

/// One order line for `quantity` units of `product` at its current price.
pub fn order_line(product: &Product, quantity: i32) -> NewOrderItem {
    NewOrderItem {
        name: product.name.clone(),
        quantity,
        image: product.image.clone(),
        price: product.price,
        product_id: product.id,
    }
}

/// An order whose total is the sum of its lines.
pub fn new_order(user: &User, items: Vec<NewOrderItem>) -> NewOrder {
    let total_price = items
        .iter()
        .map(|item| item.price * Decimal::from(item.quantity))
        .sum();
    NewOrder {
        payment_method: "PayPal".to_string(),
        tax_price: Decimal::ZERO,
        shipping_price: Decimal::ZERO,
        total_price,
        user_id: user.id,
        items,
    }
}

/// A session for `email` expiring `expires_in` from now (whole seconds, so
/// every backend stores the timestamp exactly).
pub fn new_session(email: &Email, expires_in: Duration) -> NewSession {
    NewSession {
        id: SessionId::generate(),
        user_email: email.clone(),
        refresh_token: format!("refresh-{}", Uuid::new_v4()),
        expires_at: Utc::now().trunc_subsecs(0) + expires_in,
    }
}

/// Normalize a stored amount for comparison. SQLite keeps decimals as
/// floating point, so only two places are meaningful.
#[must_use]
pub fn money(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}

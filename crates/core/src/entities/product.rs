//! Catalog products.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ProductId;

/// A catalog product as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Image URL.
    pub image: String,
    pub category: String,
    pub description: String,
    /// Average rating, 0 through 5.
    pub rating: i32,
    pub num_reviews: i32,
    pub price: Decimal,
    pub count_in_stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a product.
///
/// Field-level rules (positive price, bounded rating) are enforced by the
/// caller before this reaches storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub image: String,
    pub category: String,
    pub description: String,
    pub rating: i32,
    pub num_reviews: i32,
    pub price: Decimal,
    pub count_in_stock: i32,
}

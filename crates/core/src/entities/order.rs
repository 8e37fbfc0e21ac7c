//! Orders and their line items.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{OrderId, OrderItemId, ProductId, UserId};

/// An order header together with all of its line items.
///
/// Storage never hands out an order with a partial item list: the items are
/// loaded in the same logical read as the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub payment_method: String,
    pub tax_price: Decimal,
    pub shipping_price: Decimal,
    /// Supplied by the caller; never recomputed from the items.
    pub total_price: Decimal,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Total number of units across all line items.
    #[must_use]
    pub fn unit_count(&self) -> i64 {
        self.items.iter().map(|item| i64::from(item.quantity)).sum()
    }
}

/// A single line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub name: String,
    pub quantity: i32,
    pub image: String,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an order and all of its items in one atomic write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub payment_method: String,
    pub tax_price: Decimal,
    pub shipping_price: Decimal,
    pub total_price: Decimal,
    pub user_id: UserId,
    pub items: Vec<NewOrderItem>,
}

/// Input for one line item. The owning order id is stamped by storage once
/// the header has been inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub name: String,
    pub quantity: i32,
    pub image: String,
    pub price: Decimal,
    pub product_id: ProductId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_count_sums_quantities() {
        let now = Utc::now();
        let item = |id: i32, quantity: i32| OrderItem {
            id: OrderItemId::new(id),
            order_id: OrderId::new(1),
            product_id: ProductId::new(1),
            name: "Widget".to_owned(),
            quantity,
            image: "/img/widget.png".to_owned(),
            price: Decimal::new(999, 2),
            created_at: now,
            updated_at: now,
        };

        let order = Order {
            id: OrderId::new(1),
            payment_method: "PayPal".to_owned(),
            tax_price: Decimal::ZERO,
            shipping_price: Decimal::ZERO,
            total_price: Decimal::new(2997, 2),
            user_id: UserId::new(1),
            items: vec![item(1, 2), item(2, 1)],
            created_at: now,
            updated_at: now,
        };

        assert_eq!(order.unit_count(), 3);
    }
}

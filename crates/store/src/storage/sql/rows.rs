//! Row structs decoded by `sqlx::query_as` and their domain conversions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use shopkeep_core::{
    Email, Order, OrderId, OrderItem, OrderItemId, Product, ProductId, Session, SessionId, User,
    UserId,
};

use crate::storage::{StoreError, StoreResult};

#[derive(Debug, sqlx::FromRow)]
pub(super) struct ProductRow {
    id: ProductId,
    name: String,
    image: String,
    category: String,
    description: String,
    rating: i32,
    num_reviews: i32,
    price: Decimal,
    count_in_stock: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            image: row.image,
            category: row.category,
            description: row.description,
            rating: row.rating,
            num_reviews: row.num_reviews,
            price: row.price,
            count_in_stock: row.count_in_stock,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct UserRow {
    id: UserId,
    name: String,
    email: String,
    password: String,
    is_admin: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    pub(super) fn into_user(self, op: &'static str) -> StoreResult<User> {
        let email = Email::parse(&self.email).map_err(|e| {
            StoreError::corrupt(op, format!("invalid email for user {}: {e}", self.id))
        })?;

        Ok(User {
            id: self.id,
            name: self.name,
            email,
            password_hash: self.password,
            is_admin: self.is_admin,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct OrderRow {
    pub(super) id: OrderId,
    payment_method: String,
    tax_price: Decimal,
    shipping_price: Decimal,
    total_price: Decimal,
    user_id: UserId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    /// Attach the items loaded for this header.
    pub(super) fn with_items(self, items: Vec<OrderItemRow>) -> Order {
        Order {
            id: self.id,
            payment_method: self.payment_method,
            tax_price: self.tax_price,
            shipping_price: self.shipping_price,
            total_price: self.total_price,
            user_id: self.user_id,
            items: items.into_iter().map(OrderItem::from).collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct OrderItemRow {
    id: OrderItemId,
    name: String,
    quantity: i32,
    image: String,
    price: Decimal,
    product_id: ProductId,
    order_id: OrderId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            name: row.name,
            quantity: row.quantity,
            image: row.image,
            price: row.price,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct SessionRow {
    id: String,
    user_email: String,
    refresh_token: String,
    is_revoked: bool,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl SessionRow {
    pub(super) fn into_session(self, op: &'static str) -> StoreResult<Session> {
        let user_email = Email::parse(&self.user_email).map_err(|e| {
            StoreError::corrupt(op, format!("invalid email for session {}: {e}", self.id))
        })?;

        Ok(Session {
            id: SessionId::new(self.id),
            user_email,
            refresh_token: self.refresh_token,
            is_revoked: self.is_revoked,
            created_at: self.created_at,
            expires_at: self.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ErrorKind;

    #[test]
    fn test_session_row_with_corrupt_email() {
        let now = Utc::now();
        let row = SessionRow {
            id: "abc".to_owned(),
            user_email: "nobody".to_owned(),
            refresh_token: "t".to_owned(),
            is_revoked: false,
            created_at: now,
            expires_at: now,
        };

        let Err(err) = row.into_session("get_session") else {
            panic!("corrupt email accepted");
        };
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("session abc"));
    }

    #[test]
    fn test_order_row_keeps_item_order() {
        let now = Utc::now();
        let header = OrderRow {
            id: OrderId::new(1),
            payment_method: "PayPal".to_owned(),
            tax_price: Decimal::ZERO,
            shipping_price: Decimal::ZERO,
            total_price: Decimal::new(1998, 2),
            user_id: UserId::new(1),
            created_at: now,
            updated_at: now,
        };
        let item = |id: i32| OrderItemRow {
            id: OrderItemId::new(id),
            name: "Widget".to_owned(),
            quantity: 2,
            image: String::new(),
            price: Decimal::new(999, 2),
            product_id: ProductId::new(1),
            order_id: OrderId::new(1),
            created_at: now,
            updated_at: now,
        };

        let order = header.with_items(vec![item(1), item(2)]);

        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].id, OrderItemId::new(1));
        assert_eq!(order.unit_count(), 4);
    }
}

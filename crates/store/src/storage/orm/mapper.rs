//! Conversions from SeaORM models to domain entities.

use shopkeep_core::{
    Email, Order, OrderId, OrderItem, OrderItemId, Product, ProductId, Session, SessionId, User,
    UserId,
};

use super::entity::{order, order_item, product, session, user};
use crate::storage::{StoreError, StoreResult};

pub(super) fn product_from_model(m: product::Model) -> Product {
    Product {
        id: ProductId::new(m.id),
        name: m.name,
        image: m.image,
        category: m.category,
        description: m.description,
        rating: m.rating,
        num_reviews: m.num_reviews,
        price: m.price,
        count_in_stock: m.count_in_stock,
        created_at: m.created_at,
        updated_at: m.updated_at,
    }
}

pub(super) fn user_from_model(m: user::Model, op: &'static str) -> StoreResult<User> {
    let email = Email::parse(&m.email)
        .map_err(|e| StoreError::corrupt(op, format!("invalid email for user {}: {e}", m.id)))?;

    Ok(User {
        id: UserId::new(m.id),
        name: m.name,
        email,
        password_hash: m.password,
        is_admin: m.is_admin,
        created_at: m.created_at,
        updated_at: m.updated_at,
    })
}

fn item_from_model(m: order_item::Model) -> OrderItem {
    OrderItem {
        id: OrderItemId::new(m.id),
        order_id: OrderId::new(m.order_id),
        product_id: ProductId::new(m.product_id),
        name: m.name,
        quantity: m.quantity,
        image: m.image,
        price: m.price,
        created_at: m.created_at,
        updated_at: m.updated_at,
    }
}

/// Assemble an order from its header and the items loaded with it.
pub(super) fn order_from_models(header: order::Model, items: Vec<order_item::Model>) -> Order {
    let mut items: Vec<OrderItem> = items.into_iter().map(item_from_model).collect();
    items.sort_by_key(|item| item.id);

    Order {
        id: OrderId::new(header.id),
        payment_method: header.payment_method,
        tax_price: header.tax_price,
        shipping_price: header.shipping_price,
        total_price: header.total_price,
        user_id: UserId::new(header.user_id),
        items,
        created_at: header.created_at,
        updated_at: header.updated_at,
    }
}

pub(super) fn session_from_model(m: session::Model, op: &'static str) -> StoreResult<Session> {
    let user_email = Email::parse(&m.user_email)
        .map_err(|e| StoreError::corrupt(op, format!("invalid email for session {}: {e}", m.id)))?;

    Ok(Session {
        id: SessionId::new(m.id),
        user_email,
        refresh_token: m.refresh_token,
        is_revoked: m.is_revoked,
        created_at: m.created_at,
        expires_at: m.expires_at,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::storage::ErrorKind;

    #[test]
    fn test_order_items_sorted_by_id() {
        let now = Utc::now();
        let header = order::Model {
            id: 4,
            payment_method: "Stripe".to_owned(),
            tax_price: Decimal::new(100, 2),
            shipping_price: Decimal::ZERO,
            total_price: Decimal::new(1100, 2),
            user_id: 2,
            created_at: now,
            updated_at: now,
        };
        let item = |id: i32| order_item::Model {
            id,
            name: format!("item {id}"),
            quantity: 1,
            image: String::new(),
            price: Decimal::new(500, 2),
            product_id: 1,
            order_id: 4,
            created_at: now,
            updated_at: now,
        };

        let order = order_from_models(header, vec![item(9), item(3)]);

        let ids: Vec<i32> = order.items.iter().map(|i| i.id.as_i32()).collect();
        assert_eq!(ids, vec![3, 9]);
        assert!(order.items.iter().all(|i| i.order_id == order.id));
    }

    #[test]
    fn test_corrupt_email_is_reported_not_panicked() {
        let now = Utc::now();
        let model = user::Model {
            id: 1,
            name: "Broken".to_owned(),
            email: "not-an-email".to_owned(),
            password: String::new(),
            is_admin: false,
            created_at: now,
            updated_at: now,
        };

        let Err(err) = user_from_model(model, "get_user") else {
            panic!("corrupt email accepted");
        };
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("invalid email for user 1"));
    }
}

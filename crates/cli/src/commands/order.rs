//! Order inspection commands.

use tracing::info;

use shopkeep_core::{OrderId, UserId};

use super::{CommandError, Env, print_json};

/// List orders, optionally only those placed by `user`.
pub async fn list(env: &Env, user: Option<i32>) -> Result<(), CommandError> {
    let orders = match user {
        Some(id) => {
            env.storage
                .list_user_orders(&env.ctx, UserId::new(id))
                .await?
        }
        None => env.storage.list_orders(&env.ctx).await?,
    };
    info!(count = orders.len(), "Orders loaded");
    print_json(&orders)
}

pub async fn show(env: &Env, id: i32) -> Result<(), CommandError> {
    let order = env.storage.get_order(&env.ctx, OrderId::new(id)).await?;
    print_json(&order)
}

/// Delete an order together with its items.
pub async fn delete(env: &Env, id: i32) -> Result<(), CommandError> {
    env.storage.delete_order(&env.ctx, OrderId::new(id)).await?;
    info!(order_id = id, "Order deleted");
    Ok(())
}

//! Product catalog commands.

use tracing::info;

use shopkeep_core::{NewProduct, ProductId};

use super::{CommandError, Env, print_json};

pub async fn add(env: &Env, product: NewProduct) -> Result<(), CommandError> {
    let product = env.storage.create_product(&env.ctx, product).await?;
    info!(product_id = %product.id, "Product added");
    print_json(&product)
}

pub async fn list(env: &Env) -> Result<(), CommandError> {
    let products = env.storage.list_products(&env.ctx).await?;
    print_json(&products)
}

/// Delete a product. Fails if any order item still references it.
pub async fn delete(env: &Env, id: i32) -> Result<(), CommandError> {
    env.storage
        .delete_product(&env.ctx, ProductId::new(id))
        .await?;
    info!(product_id = id, "Product deleted");
    Ok(())
}

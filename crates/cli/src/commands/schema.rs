//! Schema bootstrap.
//!
//! Creates missing tables on the configured backend. This is not a migration
//! system: existing tables are left untouched.

use tracing::info;

use super::{CommandError, Env};

/// Create any missing tables.
pub async fn init(env: &Env) -> Result<(), CommandError> {
    info!(backend = env.storage.backend_name(), "Ensuring schema...");
    env.storage.ensure_schema(&env.ctx).await?;
    info!("Schema ready");
    Ok(())
}

//! User management commands.

use tracing::info;

use shopkeep_store::services::AuthService;

use super::{CommandError, Env, print_json};

/// Register a new user through the authentication service.
pub async fn create(
    env: &Env,
    email: &str,
    name: &str,
    password: &str,
    is_admin: bool,
) -> Result<(), CommandError> {
    let auth = AuthService::from_config(env.storage.clone(), &env.config)?;
    let user = auth.register(&env.ctx, name, email, password, is_admin).await?;

    info!(
        "User created successfully! ID: {}, Email: {}, Admin: {}",
        user.id, user.email, user.is_admin
    );
    print_json(&user)
}

/// List every user. Password hashes are never printed.
pub async fn list(env: &Env) -> Result<(), CommandError> {
    let users = env.storage.list_users(&env.ctx).await?;
    print_json(&users)
}

//! Session commands.
//!
//! Revocation goes through the authentication service so a missing session
//! is reported the same way the login flow reports it.

use tracing::info;

use shopkeep_core::SessionId;
use shopkeep_store::services::AuthService;

use super::{CommandError, Env, print_json};

pub async fn show(env: &Env, id: String) -> Result<(), CommandError> {
    let session = env.storage.get_session(&env.ctx, &SessionId::new(id)).await?;
    print_json(&session)
}

pub async fn revoke(env: &Env, id: String) -> Result<(), CommandError> {
    let auth = AuthService::from_config(env.storage.clone(), &env.config)?;
    let id = SessionId::new(id);
    auth.revoke_session(&env.ctx, &id).await?;
    info!(session_id = %id, "Session revoked");
    Ok(())
}

pub async fn delete(env: &Env, id: String) -> Result<(), CommandError> {
    let auth = AuthService::from_config(env.storage.clone(), &env.config)?;
    let id = SessionId::new(id);
    auth.logout(&env.ctx, &id).await?;
    info!(session_id = %id, "Session deleted");
    Ok(())
}

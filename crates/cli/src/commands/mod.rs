//! Subcommand implementations.

pub mod catalog;
pub mod order;
pub mod schema;
pub mod session;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use shopkeep_store::services::AuthError;
use shopkeep_store::{
    CallContext, ConfigError, Storage, StoreConfig, StoreError, TokenError, db,
};

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

/// Loaded configuration, connected storage and the call context shared by
/// every storage call of one command.
pub struct Env {
    pub config: StoreConfig,
    pub storage: Arc<dyn Storage>,
    pub ctx: CallContext,
}

impl Env {
    /// Load configuration and connect the configured backend.
    ///
    /// Ctrl-C cancels the command's context, aborting whatever query is in
    /// flight.
    pub async fn load(timeout: Duration) -> Result<Self, CommandError> {
        let config = StoreConfig::from_env()?;
        let ctx = CallContext::with_timeout(timeout);

        let token = ctx.cancellation_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling");
                token.cancel();
            }
        });

        let storage = ctx.run("connect", db::open_storage(&config)).await?;
        Ok(Self {
            config,
            storage,
            ctx,
        })
    }
}

/// Write `value` to stdout as pretty JSON.
#[allow(clippy::print_stdout)] // Command output, logs go to stderr
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CommandError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

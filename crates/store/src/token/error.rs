//! Token error types.

use thiserror::Error;

/// Errors raised while minting or verifying tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The signing secret is too short to be safe.
    #[error("signing secret must be at least {min} bytes (got {actual})")]
    WeakSecret { min: usize, actual: usize },

    /// The requested lifetime does not fit in a timestamp.
    #[error("token lifetime out of range")]
    InvalidTtl,

    /// The token's `exp` has passed.
    #[error("token has expired")]
    Expired,

    /// Bad signature, malformed token, or wrong algorithm.
    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    /// Signing failed.
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

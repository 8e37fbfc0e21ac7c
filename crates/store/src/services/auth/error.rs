//! Authentication error types.

use thiserror::Error;

use crate::storage::StoreError;
use crate::token::TokenError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] shopkeep_core::EmailError),

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,

    /// Token minting or verification failed.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// No session is stored under the token's id.
    #[error("session not found")]
    SessionNotFound,

    /// The session was revoked.
    #[error("session has been revoked")]
    SessionRevoked,

    /// The session's expiry has passed.
    #[error("session has expired")]
    SessionExpired,

    /// The session belongs to a different email than the token.
    #[error("session does not belong to this user")]
    SessionUserMismatch,

    /// The presented refresh token is not the one stored with the session.
    #[error("refresh token does not match session")]
    SessionTokenMismatch,

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

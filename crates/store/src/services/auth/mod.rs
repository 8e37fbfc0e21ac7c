//! Authentication service.
//!
//! Composes user storage, password hashing, token minting and session
//! persistence. Minting and persistence stay separate calls: a login mints a
//! token pair first, then stores a session keyed by the refresh token's `jti`.

mod error;

pub use error::AuthError;

use std::sync::Arc;
use std::time::Duration;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use shopkeep_core::{Email, NewSession, NewUser, SessionId, User};

use crate::config::StoreConfig;
use crate::context::CallContext;
use crate::storage::{ErrorKind, Storage, StoreError};
use crate::token::{TokenError, TokenMaker, UserClaims};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub session_id: SessionId,
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub user: User,
}

/// A new access token minted from a refresh token.
#[derive(Debug, Clone)]
pub struct RenewedAccessToken {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
}

/// Authentication service.
///
/// Handles registration, password login, access-token renewal and session
/// revocation against whichever backend is active.
pub struct AuthService {
    storage: Arc<dyn Storage>,
    tokens: TokenMaker,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl AuthService {
    /// Create a new authentication service.
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        tokens: TokenMaker,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            storage,
            tokens,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Create the service from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::WeakSecret` if the configured secret is too short.
    pub fn from_config(
        storage: Arc<dyn Storage>,
        config: &StoreConfig,
    ) -> Result<Self, TokenError> {
        let tokens = TokenMaker::new(&config.token_secret)?;
        Ok(Self::new(
            storage,
            tokens,
            config.access_token_ttl,
            config.refresh_token_ttl,
        ))
    }

    /// The token maker, for verifying access tokens.
    #[must_use]
    pub const fn tokens(&self) -> &TokenMaker {
        &self.tokens
    }

    // =========================================================================
    // Registration & Login
    // =========================================================================

    /// Register a new user with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip(self, ctx, password))]
    pub async fn register(
        &self,
        ctx: &CallContext,
        name: &str,
        email: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        let user = self
            .storage
            .create_user(
                ctx,
                NewUser {
                    name: name.to_owned(),
                    email,
                    password_hash,
                    is_admin,
                },
            )
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => AuthError::UserAlreadyExists,
                _ => AuthError::Storage(e),
            })?;

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Login with email and password, opening a new session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    #[instrument(skip(self, ctx, password))]
    pub async fn login(
        &self,
        ctx: &CallContext,
        email: &str,
        password: &str,
    ) -> Result<LoginSession, AuthError> {
        let email = Email::parse(email)?;

        let user = self
            .storage
            .get_user_by_email(ctx, &email)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => AuthError::InvalidCredentials,
                _ => AuthError::Storage(e),
            })?;

        verify_password(password, &user.password_hash)?;

        let pair = self
            .tokens
            .issue_pair(&user, self.access_ttl, self.refresh_ttl)?;
        let access_token_expires_at = expiry(&pair.access_claims)?;
        let refresh_token_expires_at = expiry(&pair.refresh_claims)?;

        let session = self
            .storage
            .create_session(
                ctx,
                NewSession {
                    id: pair.refresh_claims.session_id(),
                    user_email: user.email.clone(),
                    refresh_token: pair.refresh_token.clone(),
                    expires_at: refresh_token_expires_at,
                },
            )
            .await?;

        info!(user_id = %user.id, session_id = %session.id, "user logged in");
        Ok(LoginSession {
            session_id: session.id,
            access_token: pair.access_token,
            access_token_expires_at,
            refresh_token: pair.refresh_token,
            refresh_token_expires_at,
            user,
        })
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Mint a new access token from a refresh token.
    ///
    /// The stored session must exist, be neither revoked nor expired, and
    /// match the token's email and the exact token string.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Token` if the refresh token fails verification, or
    /// one of the `Session*` variants if the session check fails.
    #[instrument(skip_all)]
    pub async fn renew_access_token(
        &self,
        ctx: &CallContext,
        refresh_token: &str,
    ) -> Result<RenewedAccessToken, AuthError> {
        let claims = self.tokens.verify_token(refresh_token)?;
        let session_id = claims.session_id();

        let session = self
            .storage
            .get_session(ctx, &session_id)
            .await
            .map_err(session_error)?;

        if session.is_revoked {
            warn!(session_id = %session_id, "renewal with revoked session");
            return Err(AuthError::SessionRevoked);
        }
        if session.is_expired_at(Utc::now()) {
            return Err(AuthError::SessionExpired);
        }
        if session.user_email != claims.email {
            warn!(session_id = %session_id, "renewal with session of another user");
            return Err(AuthError::SessionUserMismatch);
        }
        if session.refresh_token != refresh_token {
            warn!(session_id = %session_id, "renewal with mismatched refresh token");
            return Err(AuthError::SessionTokenMismatch);
        }

        let (access_token, access_claims) =
            self.tokens
                .create_token(claims.id, &claims.email, claims.is_admin, self.access_ttl)?;

        Ok(RenewedAccessToken {
            access_token_expires_at: expiry(&access_claims)?,
            access_token,
        })
    }

    /// Revoke a session so its refresh token can no longer be used.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SessionNotFound` if no such session exists.
    #[instrument(skip(self, ctx))]
    pub async fn revoke_session(
        &self,
        ctx: &CallContext,
        id: &SessionId,
    ) -> Result<(), AuthError> {
        self.storage
            .revoke_session(ctx, id)
            .await
            .map_err(session_error)
    }

    /// Delete a session outright.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SessionNotFound` if no such session exists.
    #[instrument(skip(self, ctx))]
    pub async fn logout(&self, ctx: &CallContext, id: &SessionId) -> Result<(), AuthError> {
        self.storage
            .delete_session(ctx, id)
            .await
            .map_err(session_error)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn session_error(err: StoreError) -> AuthError {
    match err.kind() {
        ErrorKind::NotFound => AuthError::SessionNotFound,
        _ => AuthError::Storage(err),
    }
}

fn expiry(claims: &UserClaims) -> Result<DateTime<Utc>, AuthError> {
    claims
        .expires_at()
        .ok_or(AuthError::Token(TokenError::InvalidTtl))
}

/// Validate password requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_password() {
        assert!(matches!(
            validate_password("short"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(validate_password("long enough").is_ok());
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong horse", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("same password").unwrap();
        let b = hash_password("same password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_is_invalid_credentials() {
        assert!(matches!(
            verify_password("anything", "not-a-phc-string"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_session_error_mapping() {
        let missing = session_error(StoreError::NotFound {
            entity: crate::storage::Entity::Session,
        });
        assert!(matches!(missing, AuthError::SessionNotFound));

        let cancelled = session_error(StoreError::Cancelled { op: "get_session" });
        assert!(matches!(cancelled, AuthError::Storage(_)));
    }
}

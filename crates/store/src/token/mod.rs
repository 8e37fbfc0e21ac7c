//! Signed access and refresh tokens.
//!
//! Tokens are HS256 JWTs whose payload is [`UserClaims`]. Minting is pure
//! computation: nothing here touches storage. The authentication flow pairs a
//! freshly minted refresh token with a session row keyed by the token's `jti`.

mod error;

pub use error::TokenError;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shopkeep_core::{Email, SessionId, User, UserId};

/// Minimum HMAC secret length in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Identity claims carried by every issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaims {
    pub id: UserId,
    pub email: Email,
    pub is_admin: bool,
    /// Unique token id. For refresh tokens this is also the session key.
    pub jti: String,
    /// Subject: the user's email.
    pub sub: String,
    /// Issued at (Unix seconds).
    pub iat: i64,
    /// Expires at (Unix seconds).
    pub exp: i64,
}

impl UserClaims {
    /// The session key a refresh token with these claims is stored under.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        SessionId::new(self.jti.clone())
    }

    #[must_use]
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// An access token and a refresh token minted together.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub access_claims: UserClaims,
    pub refresh_token: String,
    pub refresh_claims: UserClaims,
}

/// Mints and verifies HS256 tokens with a single shared secret.
pub struct TokenMaker {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for TokenMaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenMaker")
            .field("algorithm", &Algorithm::HS256)
            .field("keys", &"[REDACTED]")
            .finish()
    }
}

impl TokenMaker {
    /// Build a token maker from an HMAC secret.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::WeakSecret` if the secret is shorter than
    /// [`MIN_SECRET_LENGTH`] bytes.
    pub fn new(secret: &SecretString) -> Result<Self, TokenError> {
        let bytes = secret.expose_secret().as_bytes();
        if bytes.len() < MIN_SECRET_LENGTH {
            return Err(TokenError::WeakSecret {
                min: MIN_SECRET_LENGTH,
                actual: bytes.len(),
            });
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            validation,
        })
    }

    /// Mint a token for the given identity valid for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::InvalidTtl` if `ttl` overflows a timestamp, or
    /// `TokenError::Signing` if encoding fails.
    pub fn create_token(
        &self,
        id: UserId,
        email: &Email,
        is_admin: bool,
        ttl: Duration,
    ) -> Result<(String, UserClaims), TokenError> {
        let iat = Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs()).map_err(|_| TokenError::InvalidTtl)?;
        let exp = iat.checked_add(ttl).ok_or(TokenError::InvalidTtl)?;

        let claims = UserClaims {
            id,
            email: email.clone(),
            is_admin,
            jti: Uuid::new_v4().to_string(),
            sub: email.as_str().to_owned(),
            iat,
            exp,
        };
        let token = self.sign(&claims)?;
        Ok((token, claims))
    }

    /// Mint an access token and a refresh token for `user`.
    ///
    /// # Errors
    ///
    /// Same as [`TokenMaker::create_token`].
    pub fn issue_pair(
        &self,
        user: &User,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<TokenPair, TokenError> {
        let (access_token, access_claims) =
            self.create_token(user.id, &user.email, user.is_admin, access_ttl)?;
        let (refresh_token, refresh_claims) =
            self.create_token(user.id, &user.email, user.is_admin, refresh_ttl)?;

        Ok(TokenPair {
            access_token,
            access_claims,
            refresh_token,
            refresh_claims,
        })
    }

    /// Check the signature and expiry of `token` and return its claims.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Expired` once `exp` has passed, or
    /// `TokenError::Invalid` for any other verification failure.
    pub fn verify_token(&self, token: &str) -> Result<UserClaims, TokenError> {
        decode::<UserClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e),
            })
    }

    fn sign(&self, claims: &UserClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding).map_err(TokenError::Signing)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "k3Q9vX2mZp7LwR4tYb8NcF1hJs6DgA0e";

    fn maker() -> TokenMaker {
        TokenMaker::new(&SecretString::from(SECRET)).unwrap()
    }

    fn email() -> Email {
        Email::parse("buyer@example.com").unwrap()
    }

    #[test]
    fn test_rejects_short_secret() {
        let err = TokenMaker::new(&SecretString::from("too-short")).unwrap_err();
        assert!(matches!(
            err,
            TokenError::WeakSecret {
                min: MIN_SECRET_LENGTH,
                actual: 9
            }
        ));
    }

    #[test]
    fn test_create_and_verify() {
        let maker = maker();
        let (token, claims) = maker
            .create_token(UserId::new(7), &email(), true, Duration::from_secs(900))
            .unwrap();

        assert_eq!(claims.sub, "buyer@example.com");
        assert_eq!(claims.exp - claims.iat, 900);
        assert_eq!(claims.jti.len(), 36);

        let verified = maker.verify_token(&token).unwrap();
        assert_eq!(verified, claims);
        assert_eq!(verified.id, UserId::new(7));
        assert!(verified.is_admin);
    }

    #[test]
    fn test_each_token_gets_a_fresh_jti() {
        let maker = maker();
        let ttl = Duration::from_secs(60);
        let (_, a) = maker.create_token(UserId::new(1), &email(), false, ttl).unwrap();
        let (_, b) = maker.create_token(UserId::new(1), &email(), false, ttl).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_expired_token_is_distinguished() {
        let maker = maker();
        let now = Utc::now().timestamp();
        let claims = UserClaims {
            id: UserId::new(1),
            email: email(),
            is_admin: false,
            jti: Uuid::new_v4().to_string(),
            sub: email().into_inner(),
            iat: now - 120,
            exp: now - 60,
        };
        let token = maker.sign(&claims).unwrap();

        assert!(matches!(maker.verify_token(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let (token, _) = maker()
            .create_token(UserId::new(1), &email(), false, Duration::from_secs(60))
            .unwrap();
        let other = TokenMaker::new(&SecretString::from("Zq8!pL3@xM5#vN7$bK9%cJ2^dH4&fG6*")).unwrap();

        assert!(matches!(
            other.verify_token(&token),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_garbage_is_invalid() {
        assert!(matches!(
            maker().verify_token("not.a.jwt"),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_issue_pair_uses_distinct_lifetimes() {
        let now = Utc::now();
        let user = User {
            id: UserId::new(3),
            name: "Buyer".to_owned(),
            email: email(),
            password_hash: String::new(),
            is_admin: false,
            created_at: now,
            updated_at: now,
        };

        let pair = maker()
            .issue_pair(&user, Duration::from_secs(900), Duration::from_secs(86_400))
            .unwrap();

        assert_ne!(pair.access_claims.jti, pair.refresh_claims.jti);
        assert!(pair.refresh_claims.exp > pair.access_claims.exp);
        assert_eq!(pair.refresh_claims.id, user.id);
        assert_ne!(pair.access_token, pair.refresh_token);
    }

    #[test]
    fn test_debug_redacts_keys() {
        let output = format!("{:?}", maker());
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains(SECRET));
    }
}

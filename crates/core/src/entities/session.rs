//! Server-side authentication sessions.
//!
//! Lifecycle: a session is created active, may be revoked (terminal), and
//! expires once `expires_at` has passed (terminal, evaluated by the caller).
//! Storage only records the revoked flag; it never evaluates expiry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Email, SessionId};

/// A refresh-token session as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Owner's email at the time the session was created.
    pub user_email: Email,
    pub refresh_token: String,
    /// Once set, never cleared.
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session has expired as of `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the session may still be used to renew tokens as of `now`.
    #[must_use]
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && !self.is_expired_at(now)
    }
}

/// Input for creating a session. The key is chosen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub id: SessionId,
    pub user_email: Email,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn session(expires_in: Duration, is_revoked: bool) -> Session {
        let now = Utc::now();
        Session {
            id: SessionId::generate(),
            user_email: Email::parse("buyer@example.com").unwrap(),
            refresh_token: "token".to_owned(),
            is_revoked,
            created_at: now,
            expires_at: now + expires_in,
        }
    }

    #[test]
    fn test_active_session_is_usable() {
        let s = session(Duration::hours(1), false);
        assert!(s.is_usable_at(Utc::now()));
    }

    #[test]
    fn test_revoked_session_is_not_usable() {
        let s = session(Duration::hours(1), true);
        assert!(!s.is_expired_at(Utc::now()));
        assert!(!s.is_usable_at(Utc::now()));
    }

    #[test]
    fn test_expired_session_is_not_usable() {
        let s = session(Duration::seconds(-1), false);
        assert!(s.is_expired_at(Utc::now()));
        assert!(!s.is_usable_at(Utc::now()));
    }
}

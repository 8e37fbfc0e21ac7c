//! Registered users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Email, UserId};

/// A registered user as stored.
///
/// `password_hash` is skipped when serializing so the type can be logged or
/// returned without leaking the hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Unique across all users.
    pub email: Email,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a user. The password must already be hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: Email,
    pub password_hash: String,
    pub is_admin: bool,
}

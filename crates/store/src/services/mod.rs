//! Services composed on top of the storage contract.

pub mod auth;

pub use auth::{AuthError, AuthService, LoginSession, RenewedAccessToken};

//! Shopkeep Store - persistence and session tokens.
//!
//! This crate provides the storage contract shared by every caller, its two
//! interchangeable backends, and the token/session machinery layered on top.
//!
//! # Modules
//!
//! - [`storage`] - The [`Storage`] trait, error taxonomy, transaction scope,
//!   and the `OrmStorage` / `PgStorage` backends
//! - [`context`] - Per-call cancellation and deadlines
//! - [`token`] - HS256 access/refresh token minting and verification
//! - [`services`] - Authentication flow composed from storage and tokens
//! - [`config`] - Environment configuration
//! - [`db`] - Connection setup and backend selection

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod context;
pub mod db;
pub mod services;
pub mod storage;
pub mod token;

pub use config::{BackendKind, ConfigError, StoreConfig};
pub use context::CallContext;
pub use storage::{Entity, ErrorKind, OrmStorage, PgStorage, Storage, StoreError, StoreResult};
pub use token::{TokenError, TokenMaker, TokenPair, UserClaims};

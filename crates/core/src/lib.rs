//! Shopkeep Core - Entity model shared by every storage backend.
//!
//! This crate defines the five persisted record types (products, users,
//! orders, order items and sessions) together with the inputs used to create
//! them. Identifiers are always assigned by the database, so the `New*`
//! inputs never carry one.
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access. The
//! storage contract and its backends live in `shopkeep-store`.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails and session keys
//! - [`entities`] - The persisted records and their creation inputs

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod entities;
pub mod types;

pub use entities::*;
pub use types::*;

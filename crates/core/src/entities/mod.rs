//! Persisted records and their creation inputs.
//!
//! An [`Order`] exclusively owns its [`OrderItem`]s: they are written and
//! removed together with the order header and are never addressed on their
//! own. A [`Session`] refers to its user by email only; the link is a lookup,
//! not a foreign key.

pub mod order;
pub mod product;
pub mod session;
pub mod user;

pub use order::{NewOrder, NewOrderItem, Order, OrderItem};
pub use product::{NewProduct, Product};
pub use session::{NewSession, Session};
pub use user::{NewUser, User};

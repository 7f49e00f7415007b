//! # convoy-store
//!
//! On-device durable cache for the Convoy chat client, backed by SQLite.
//!
//! The cache keeps the last known message list of every opened room and the
//! last known room list together with the time it was saved. The crate
//! exposes a synchronous [`Database`] handle wrapping a `rusqlite::Connection`
//! with typed helpers per concern. Callers on the critical path are expected
//! to treat every [`StoreError`] as a cache miss.

pub mod database;
pub mod messages;
pub mod meta;
pub mod migrations;
pub mod rooms;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};

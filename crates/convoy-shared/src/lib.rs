//! Domain model and wire protocol shared by the Convoy store and client crates.

pub mod constants;
pub mod error;
pub mod models;
pub mod protocol;
pub mod timeline;
pub mod types;

pub use error::ProtocolError;
pub use models::*;
pub use types::{MessageId, RoomId, UserId};

//! Convoy chat sync engine.
//!
//! Keeps rooms and messages consistent across the in-memory store, the
//! on-device cache, the paginated REST API, the day-bucketed archive and the
//! real-time channel. Entry point is [`SyncEngine`].

pub mod archive;
pub mod cache;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod remote;
pub mod retry;
pub mod room_store;
pub mod session;
pub mod single_flight;

use tracing_subscriber::{fmt, EnvFilter};

pub use cache::DurableCache;
pub use channel::{RealtimeChannel, WsChannel};
pub use config::SyncConfig;
pub use engine::SyncEngine;
pub use error::{ErrorCategory, Result, SyncError};
pub use remote::{HttpRemote, PageRequest, RemoteSource};
pub use room_store::{RoomStore, StoreEvent};
pub use session::{LoadOutcome, LoadSource, RoomListView, RoomView};

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// filter. Calling it twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("convoy_client=debug,convoy_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

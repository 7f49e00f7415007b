/// Default number of messages requested per remote page
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// The room list cache is considered fresh for this many minutes
pub const ROOM_CACHE_MAX_AGE_MINUTES: i64 = 5;

/// Default REST base URL (development backend)
pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";

/// Default real-time socket URL (development backend)
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:3000/ws";

/// Reconnect backoff for the real-time channel
pub const RECONNECT_BASE_DELAY_MS: u64 = 500;
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;

/// User-facing error strings surfaced through view state
pub const ERR_LOAD_MESSAGES: &str = "Failed to load messages";
pub const ERR_LOAD_ROOM: &str = "Failed to load chat room";
pub const ERR_LOAD_ROOMS: &str = "Failed to load chat rooms";

//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so the client can start against a local
//! development backend with zero configuration.

use std::path::PathBuf;

use convoy_shared::constants::{
    DEFAULT_API_URL, DEFAULT_PAGE_SIZE, DEFAULT_SOCKET_URL, RECONNECT_BASE_DELAY_MS,
    RECONNECT_MAX_DELAY_MS, ROOM_CACHE_MAX_AGE_MINUTES,
};

/// Sync engine configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// REST base URL.
    /// Env: `CONVOY_API_URL`
    pub api_url: String,

    /// Real-time WebSocket URL.
    /// Env: `CONVOY_SOCKET_URL`
    pub socket_url: String,

    /// Messages per remote page.
    /// Env: `CONVOY_PAGE_SIZE`
    /// Default: `50`
    pub page_size: u32,

    /// How long a cached room list may be served without a remote fetch.
    /// Env: `CONVOY_ROOM_CACHE_MAX_AGE_MINUTES`
    /// Default: `5`
    pub room_cache_max_age_minutes: i64,

    /// Location of the cache database. `None` uses the platform cache dir.
    /// Env: `CONVOY_CACHE_PATH`
    pub cache_path: Option<PathBuf>,

    /// Reconnect backoff of the real-time channel, in milliseconds.
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            room_cache_max_age_minutes: ROOM_CACHE_MAX_AGE_MINUTES,
            cache_path: None,
            reconnect_base_delay_ms: RECONNECT_BASE_DELAY_MS,
            reconnect_max_delay_ms: RECONNECT_MAX_DELAY_MS,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("CONVOY_API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }

        if let Some(url) = lookup("CONVOY_SOCKET_URL") {
            config.socket_url = url;
        }

        if let Some(raw) = lookup("CONVOY_PAGE_SIZE") {
            match raw.parse::<u32>() {
                Ok(size) if size > 0 => config.page_size = size,
                _ => tracing::warn!(value = %raw, "Invalid CONVOY_PAGE_SIZE, using default"),
            }
        }

        if let Some(raw) = lookup("CONVOY_ROOM_CACHE_MAX_AGE_MINUTES") {
            match raw.parse::<i64>() {
                Ok(minutes) if minutes >= 0 => config.room_cache_max_age_minutes = minutes,
                _ => tracing::warn!(
                    value = %raw,
                    "Invalid CONVOY_ROOM_CACHE_MAX_AGE_MINUTES, using default"
                ),
            }
        }

        if let Some(path) = lookup("CONVOY_CACHE_PATH") {
            if !path.is_empty() {
                config.cache_path = Some(PathBuf::from(path));
            }
        }

        config
    }
}

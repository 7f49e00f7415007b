use thiserror::Error;

use convoy_shared::RoomId;

/// Broad error category used to decide between falling back and surfacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid input or unsupported request.
    Config,
    /// Authentication/authorization failure.
    Auth,
    /// Transient network or transport failure.
    Network,
    /// Rate-limited by the backend.
    RateLimited,
    /// Response could not be decoded.
    Serialization,
    /// Local bug or broken invariant.
    Internal,
}

/// Errors produced by the sync layer.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response. `message` is the backend's message field when it
    /// sent one.
    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Real-time channel is not connected")]
    NotConnected,

    #[error("Real-time channel is closed")]
    ChannelClosed,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    #[error("Invalid request: {0}")]
    InvalidInput(String),
}

impl SyncError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::Transport(_) | SyncError::WebSocket(_) => ErrorCategory::Network,
            SyncError::NotConnected | SyncError::ChannelClosed => ErrorCategory::Network,
            SyncError::Http { status, .. } => classify_http_status(*status),
            SyncError::Decode(_) => ErrorCategory::Serialization,
            SyncError::RoomNotFound(_) | SyncError::InvalidInput(_) => ErrorCategory::Config,
        }
    }
}

/// Map HTTP status codes to error categories.
pub fn classify_http_status(status: u16) -> ErrorCategory {
    match status {
        401 | 403 => ErrorCategory::Auth,
        408 | 429 => ErrorCategory::RateLimited,
        400..=499 => ErrorCategory::Config,
        500..=599 => ErrorCategory::Network,
        _ => ErrorCategory::Internal,
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_http_status_categories() {
        assert_eq!(classify_http_status(401), ErrorCategory::Auth);
        assert_eq!(classify_http_status(429), ErrorCategory::RateLimited);
        assert_eq!(classify_http_status(404), ErrorCategory::Config);
        assert_eq!(classify_http_status(503), ErrorCategory::Network);
        assert_eq!(classify_http_status(700), ErrorCategory::Internal);
    }

    #[test]
    fn http_error_displays_backend_message() {
        let err = SyncError::Http {
            status: 422,
            message: "Room is archived".into(),
        };
        assert_eq!(err.to_string(), "Room is archived");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert_eq!(SyncError::NotConnected.category(), ErrorCategory::Network);
    }
}

use thiserror::Error;

/// Reasons an inbound real-time frame is rejected at the boundary.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

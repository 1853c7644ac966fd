use thiserror::Error;

/// Failures reported by a session implementation.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,
    #[error("session is not connected")]
    NotConnected,
    #[error("media is no longer available on the server")]
    MediaExpired,
    #[error("message has no downloadable media")]
    NoMedia,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

//! Error types for the pulse service

/// Errors that can occur while loading snapshots or talking to the push channel
#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Failed to send message: {0}")]
    SendError(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

impl PulseError {
    /// Whether the error means the requested monitor can never be loaded
    /// with the current credentials, as opposed to a transient failure
    pub fn is_terminal(&self) -> bool {
        matches!(self, PulseError::NotFound(_) | PulseError::Unauthorized(_))
    }
}

/// Result type alias for pulse operations
pub type Result<T> = std::result::Result<T, PulseError>;

/// Failures that end (or prevent) a realtime session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Microphone or speaker unavailable, including denied permission.
    #[error("audio device unavailable: {0}")]
    Device(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("connection closed: {}", .0.as_deref().unwrap_or("no reason given"))]
    Closed(Option<String>),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Protocol(e.to_string())
    }
}

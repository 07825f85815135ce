use thiserror::Error;

/// Errors crossing the HTTP boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a usable response (connect, timeout,
    /// body read).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with an error envelope.
    #[error("server rejected request: {0}")]
    Rejected(String),

    /// The response arrived but its shape was not interpretable.
    #[error("malformed response: {0}")]
    Protocol(String),
}

impl ApiError {
    /// Transient failures leave local state untouched; the next natural
    /// trigger or poll tick is the retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transport(_) | ApiError::Protocol(_))
    }
}

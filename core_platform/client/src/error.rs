use reqwest::StatusCode;

/// Error type for every client call.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server rejected the stored token. The session has been cleared.
    #[error("Session expired, sign in again")]
    Unauthorized,
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

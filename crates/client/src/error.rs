// crates/client/src/error.rs
use thiserror::Error;

/// Errors from talking to the job service.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid API base URL {url}: {message}")]
    InvalidBaseUrl { url: String, message: String },

    #[error("Network error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Decode(String),
}

impl ClientError {
    /// HTTP status code for `Status` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

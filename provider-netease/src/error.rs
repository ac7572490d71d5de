//! Error types for the NetEase provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// NetEase provider errors
#[derive(Error, Debug)]
pub enum NeteaseError {
    /// The API answered with a non-2xx HTTP status
    #[error("NetEase API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The API answered 2xx but the body carries a failure code
    #[error("NetEase API rejected the request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    /// No playable URL for the song
    #[error("Failed to resolve song stream URL")]
    MissingStreamUrl,

    /// Failed to parse an API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Result type for NetEase operations
pub type Result<T> = std::result::Result<T, NeteaseError>;

impl From<NeteaseError> for BridgeError {
    fn from(error: NeteaseError) -> Self {
        match error {
            NeteaseError::Api { status, message } => BridgeError::UpstreamStatus { status, message },
            NeteaseError::Rejected { .. } | NeteaseError::MissingStreamUrl => {
                BridgeError::OperationFailed(error.to_string())
            }
            NeteaseError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            NeteaseError::Bridge(e) => e,
        }
    }
}

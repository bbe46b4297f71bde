use thiserror::Error;

use crate::error::NodeError;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Rate limit exceeded: retry after {retry_after:?}s")]
    RateLimitExceeded { retry_after: Option<u64> },

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Cancelled")]
    Cancelled,
}

impl LlmError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::NetworkError(_)
            | LlmError::Timeout
            | LlmError::StreamError(_)
            | LlmError::RateLimitExceeded { .. } => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<LlmError> for NodeError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout => NodeError::ModelTimeout,
            LlmError::Cancelled => NodeError::Cancelled,
            other => NodeError::ModelUnavailable(other.to_string()),
        }
    }
}

use thiserror::Error;

/// Vertex-level errors. Each variant maps to a stable kind string carried
/// in the `node_failed` frame.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("Model call timed out")]
    ModelTimeout,
    #[error("Search unavailable: {0}")]
    SearchUnavailable(String),
    #[error("Execution error: {0}")]
    ExecutionError(String),
    #[error("Cancelled")]
    Cancelled,
}

impl NodeError {
    /// Stable kind string surfaced to the client.
    pub fn kind(&self) -> &'static str {
        match self {
            NodeError::ConfigError(_) => "operator-invalid-config",
            NodeError::ModelUnavailable(_) => "model-unavailable",
            NodeError::ModelTimeout => "model-timeout",
            NodeError::SearchUnavailable(_) => "search-unavailable",
            NodeError::ExecutionError(_) => "execution-error",
            NodeError::Cancelled => "cancelled",
        }
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::ConfigError(e.to_string())
    }
}

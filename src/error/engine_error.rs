//! Run-level error types.

use thiserror::Error;

use super::NodeError;

/// Errors that invalidate an entire run rather than a single vertex.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid-graph: {0}")]
    InvalidGraph(String),
    #[error("scheduler-stuck: {0}")]
    SchedulerStuck(String),
    #[error("cancelled")]
    Cancelled,
    #[error("Node error: {0}")]
    Node(Box<NodeError>),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<NodeError> for EngineError {
    fn from(value: NodeError) -> Self {
        EngineError::Node(Box::new(value))
    }
}

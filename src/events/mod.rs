//! Typed progress events flowing toward the client connection.
//!
//! The bus is single-consumer: many operators publish concurrently through
//! cloned emitters, the session forwards frames to the client in channel
//! order. Per-vertex ordering holds because each vertex's events are
//! published sequentially from its worker task.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::llm::TokenUsage;

/// Wire events, one frame each. `to_json` yields the exact client shape.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    NodeStart {
        node_id: String,
    },
    TokenStream {
        node_id: String,
        token: String,
    },
    NodeUsage {
        node_id: String,
        usage: UsageFrame,
    },
    NodeFinish {
        node_id: String,
        result: String,
    },
    NodeFailed {
        node_id: String,
        error: String,
        kind: String,
    },
    NodeSkipped {
        node_id: String,
    },
    ExecutionComplete,
    ExecutionError {
        error: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct UsageFrame {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

impl From<TokenUsage> for UsageFrame {
    fn from(usage: TokenUsage) -> Self {
        UsageFrame {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total(),
        }
    }
}

impl ExecutionEvent {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("event serializes")
    }

    /// Whether this event ends the whole run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionEvent::ExecutionComplete | ExecutionEvent::ExecutionError { .. }
        )
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            ExecutionEvent::NodeStart { node_id }
            | ExecutionEvent::TokenStream { node_id, .. }
            | ExecutionEvent::NodeUsage { node_id, .. }
            | ExecutionEvent::NodeFinish { node_id, .. }
            | ExecutionEvent::NodeFailed { node_id, .. }
            | ExecutionEvent::NodeSkipped { node_id } => Some(node_id),
            _ => None,
        }
    }
}

pub type EventReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Cloneable publishing handle. Sending never blocks; a dropped receiver
/// (client gone) turns publication into a no-op.
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn channel() -> (EventEmitter, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventEmitter { tx }, rx)
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn node_start(&self, node_id: &str) {
        self.emit(ExecutionEvent::NodeStart {
            node_id: node_id.to_string(),
        });
    }

    pub fn token(&self, node_id: &str, token: &str) {
        self.emit(ExecutionEvent::TokenStream {
            node_id: node_id.to_string(),
            token: token.to_string(),
        });
    }

    pub fn node_usage(&self, node_id: &str, usage: TokenUsage) {
        self.emit(ExecutionEvent::NodeUsage {
            node_id: node_id.to_string(),
            usage: usage.into(),
        });
    }

    pub fn node_finish(&self, node_id: &str, result: &str) {
        self.emit(ExecutionEvent::NodeFinish {
            node_id: node_id.to_string(),
            result: result.to_string(),
        });
    }

    pub fn node_failed(&self, node_id: &str, error: &str, kind: &str) {
        self.emit(ExecutionEvent::NodeFailed {
            node_id: node_id.to_string(),
            error: error.to_string(),
            kind: kind.to_string(),
        });
    }

    pub fn node_skipped(&self, node_id: &str) {
        self.emit(ExecutionEvent::NodeSkipped {
            node_id: node_id.to_string(),
        });
    }
}

use crate::llm::TokenUsage;

/// Lifecycle of one vertex within a run. Transitions are owned by the
/// scheduler; workers only fill in output and usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeStatus {
    #[default]
    Pending,
    Ready,
    Running,
    Success,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Success | NodeStatus::Failed | NodeStatus::Skipped)
    }
}

/// Per-vertex runtime state.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRecord {
    pub status: NodeStatus,
    /// Accumulated textual output of the most recent execution.
    pub output: String,
    pub usage: Option<TokenUsage>,
    /// Back-edge delivery count for `loop` vertices.
    pub iterations: u32,
    /// Most recent payload delivered along a back-edge.
    pub last_back_payload: Option<String>,
}

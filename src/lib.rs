pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod llm;
pub mod nodes;
pub mod scheduler;
pub mod search;
pub mod server;

pub use crate::config::Settings;
pub use crate::error::{EngineError, NodeError};
pub use crate::events::{EventEmitter, EventReceiver, ExecutionEvent};
pub use crate::graph::{build_graph, validate_graph, Graph, GraphDocument, NodeKind, Port};
pub use crate::llm::{
    CompletionGateway, CompletionRequest, OpenRouterConfig, OpenRouterGateway, RetryingGateway,
    StreamSink, TokenUsage,
};
pub use crate::nodes::{NodeExecutorRegistry, OperatorServices};
pub use crate::scheduler::{ExecutionRecord, ExecutionSession, NodeStatus};
pub use crate::search::{SearchProvider, TavilySearch};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::NodeError;
use crate::events::EventEmitter;
use crate::graph::{GraphNode, NodeKind, Port};
use crate::llm::{CompletionGateway, StreamSink, TokenUsage};
use crate::search::SearchProvider;

/// Per-session services handed to every operator invocation.
#[derive(Clone)]
pub struct OperatorServices {
    pub gateway: Arc<dyn CompletionGateway>,
    pub search: Arc<dyn SearchProvider>,
    pub events: EventEmitter,
    pub cancel: CancellationToken,
}

impl OperatorServices {
    /// A sink that publishes `token_stream` frames for `node_id`.
    pub fn stream_sink(&self, node_id: &str) -> StreamSink {
        let events = self.events.clone();
        let id = node_id.to_string();
        StreamSink::new(self.cancel.clone(), move |t| events.token(&id, t))
    }

    pub fn discard_sink(&self) -> StreamSink {
        StreamSink::discard(self.cancel.clone())
    }

    pub fn check_cancelled(&self) -> Result<(), NodeError> {
        if self.cancel.is_cancelled() {
            Err(NodeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Everything an operator sees about the vertex it is executing.
#[derive(Debug, Clone)]
pub struct ExecutionFrame {
    pub node: GraphNode,
    /// Resolved inbound payload (predecessor outputs on enabling edges,
    /// source ids ascending, joined by blank lines).
    pub payload: String,
    /// Back-edge delivery count; zero outside `loop` vertices.
    pub iteration: u32,
}

/// Which outgoing port(s) the completed execution enables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSelection {
    /// The single unnamed port of a non-branching vertex.
    Unnamed,
    Named(Port),
}

#[derive(Debug, Clone)]
pub struct OperatorOutput {
    pub text: String,
    pub port: PortSelection,
    pub usage: Option<TokenUsage>,
}

impl OperatorOutput {
    pub fn text(text: impl Into<String>) -> Self {
        OperatorOutput {
            text: text.into(),
            port: PortSelection::Unnamed,
            usage: None,
        }
    }

    pub fn with_port(mut self, port: Port) -> Self {
        self.port = PortSelection::Named(port);
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Trait for vertex execution. One implementation per kind.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(
        &self,
        frame: &ExecutionFrame,
        services: &OperatorServices,
    ) -> Result<OperatorOutput, NodeError>;
}

/// Deserialize a vertex configuration, treating a missing/null config as `{}`.
pub fn parse_config<T: DeserializeOwned>(config: &Value) -> Result<T, NodeError> {
    let value = if config.is_null() {
        Value::Object(Default::default())
    } else {
        config.clone()
    };
    serde_json::from_value(value).map_err(|e| NodeError::ConfigError(e.to_string()))
}

/// Registry of operators, keyed by vertex kind.
pub struct NodeExecutorRegistry {
    executors: HashMap<NodeKind, Box<dyn NodeExecutor>>,
}

impl NodeExecutorRegistry {
    pub fn new() -> Self {
        let mut registry = NodeExecutorRegistry {
            executors: HashMap::new(),
        };
        registry.register(NodeKind::Input, Box::new(super::io::InputExecutor));
        registry.register(NodeKind::Output, Box::new(super::io::OutputExecutor));
        registry.register(NodeKind::Llm, Box::new(super::llm_node::LlmNodeExecutor));
        registry.register(NodeKind::Search, Box::new(super::search_node::SearchNodeExecutor));
        registry.register(NodeKind::Condition, Box::new(super::condition::ConditionExecutor));
        registry.register(NodeKind::Loop, Box::new(super::loop_gate::LoopExecutor));
        registry.register(NodeKind::Splitter, Box::new(super::splitter::SplitterExecutor));
        registry.register(NodeKind::Reducer, Box::new(super::reducer::ReducerExecutor));
        registry.register(
            NodeKind::SelfConsistency,
            Box::new(super::self_consistency::SelfConsistencyExecutor),
        );
        registry.register(NodeKind::MoaProposer, Box::new(super::moa::MoaProposerExecutor));
        registry.register(
            NodeKind::MoaAggregator,
            Box::new(super::moa::MoaAggregatorExecutor),
        );
        registry.register(NodeKind::Debate, Box::new(super::debate::DebateExecutor));
        registry.register(NodeKind::Voting, Box::new(super::voting::VotingExecutor));
        registry
    }

    pub fn register(&mut self, kind: NodeKind, executor: Box<dyn NodeExecutor>) {
        self.executors.insert(kind, executor);
    }

    pub fn get(&self, kind: NodeKind) -> Option<&dyn NodeExecutor> {
        self.executors.get(&kind).map(|e| e.as_ref())
    }
}

impl Default for NodeExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

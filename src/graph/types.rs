use std::collections::{HashMap, HashSet};

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of vertex kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    #[serde(alias = "neural-input")]
    Input,
    #[serde(alias = "neural-output")]
    Output,
    #[serde(alias = "neural-llm")]
    Llm,
    Search,
    Condition,
    Loop,
    Splitter,
    Reducer,
    SelfConsistency,
    MoaProposer,
    MoaAggregator,
    Debate,
    Voting,
}

impl NodeKind {
    pub fn parse(tag: &str) -> Option<Self> {
        serde_json::from_value(Value::String(tag.to_string())).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Input => "input",
            NodeKind::Output => "output",
            NodeKind::Llm => "llm",
            NodeKind::Search => "search",
            NodeKind::Condition => "condition",
            NodeKind::Loop => "loop",
            NodeKind::Splitter => "splitter",
            NodeKind::Reducer => "reducer",
            NodeKind::SelfConsistency => "self-consistency",
            NodeKind::MoaProposer => "moa-proposer",
            NodeKind::MoaAggregator => "moa-aggregator",
            NodeKind::Debate => "debate",
            NodeKind::Voting => "voting",
        }
    }
}

/// Named outgoing channel on a branching vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    True,
    False,
    Loop,
    Done,
}

impl Port {
    /// Parse a `sourceHandle` value. `None` / empty means the single unnamed port.
    pub fn from_handle(handle: &Option<String>) -> Result<Option<Port>, String> {
        match handle.as_deref() {
            None | Some("") => Ok(None),
            Some("true") => Ok(Some(Port::True)),
            Some("false") => Ok(Some(Port::False)),
            Some("loop") => Ok(Some(Port::Loop)),
            Some("done") => Ok(Some(Port::Done)),
            Some(other) => Err(format!("unknown source port '{}'", other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Port::True => "true",
            Port::False => "false",
            Port::Loop => "loop",
            Port::Done => "done",
        }
    }
}

/// A vertex of the computation graph. Immutable after submission.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    /// Kind-specific configuration mapping.
    pub config: Value,
    /// Authoring-time seed value, used by `input` vertices.
    pub seed: Option<String>,
}

/// A directed edge, optionally leaving a named source port.
#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub source_port: Option<Port>,
    /// Preserved but carries no semantics.
    pub target_port: Option<String>,
}

/// Validated computation graph.
///
/// Back-edges (edges into a `loop` vertex from a source forward-reachable
/// from it) are identified during validation and do not gate the loop's
/// initial admission.
#[derive(Debug)]
pub struct Graph {
    pub inner: StableDiGraph<GraphNode, GraphEdge>,
    pub index: HashMap<String, NodeIndex>,
    pub back_edges: HashSet<EdgeIndex>,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).and_then(|ix| self.inner.node_weight(*ix))
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.inner.node_weights().map(|n| n.id.as_str())
    }

    pub fn is_back_edge(&self, edge: EdgeIndex) -> bool {
        self.back_edges.contains(&edge)
    }

    /// Inbound edge indices of a vertex, back-edges included.
    pub fn inbound_edges(&self, id: &str) -> Vec<EdgeIndex> {
        let Some(ix) = self.index.get(id) else {
            return Vec::new();
        };
        self.inner
            .edges_directed(*ix, Direction::Incoming)
            .map(|e| e.id())
            .collect()
    }

    pub fn outbound_edges(&self, id: &str) -> Vec<EdgeIndex> {
        let Some(ix) = self.index.get(id) else {
            return Vec::new();
        };
        self.inner
            .edges_directed(*ix, Direction::Outgoing)
            .map(|e| e.id())
            .collect()
    }

    pub fn edge(&self, edge: EdgeIndex) -> &GraphEdge {
        self.inner.edge_weight(edge).expect("edge index valid")
    }

    /// Vertices with no inbound edges, ids ascending.
    pub fn source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .node_indices()
            .filter(|ix| {
                self.inner
                    .edges_directed(*ix, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .filter_map(|ix| self.inner.node_weight(ix).map(|n| n.id.clone()))
            .collect();
        ids.sort();
        ids
    }
}

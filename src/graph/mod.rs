pub mod builder;
pub mod document;
pub mod types;
pub mod validator;

pub use builder::build_graph;
pub use document::{EdgeDocument, GraphDocument, NodeDocument};
pub use types::{Graph, GraphEdge, GraphNode, NodeKind, Port};
pub use validator::validate_graph;

use std::collections::{HashMap, HashSet};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};

use crate::error::EngineError;

use super::document::GraphDocument;
use super::types::{Graph, GraphEdge, GraphNode, NodeKind, Port};

/// Build a [`Graph`] from a submitted document.
///
/// Performs the schema and reference-integrity checks; port legality and
/// acyclicity are the validator's job ([`super::validate_graph`]).
pub fn build_graph(doc: &GraphDocument) -> Result<Graph, EngineError> {
    let mut inner = StableDiGraph::<GraphNode, GraphEdge>::new();
    let mut index: HashMap<String, NodeIndex> = HashMap::new();

    for node in &doc.nodes {
        if node.id.is_empty() {
            return Err(EngineError::InvalidGraph("node with empty id".into()));
        }
        if index.contains_key(&node.id) {
            return Err(EngineError::InvalidGraph(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
        let kind = NodeKind::parse(&node.kind).ok_or_else(|| {
            EngineError::InvalidGraph(format!(
                "unknown node kind '{}' on node '{}'",
                node.kind, node.id
            ))
        })?;
        let ix = inner.add_node(GraphNode {
            id: node.id.clone(),
            kind,
            config: node.data.node_config.clone(),
            seed: node.data.input_value.clone(),
        });
        index.insert(node.id.clone(), ix);
    }

    let mut edge_ids: HashSet<&str> = HashSet::new();
    for edge in &doc.edges {
        if !edge_ids.insert(edge.id.as_str()) {
            return Err(EngineError::InvalidGraph(format!(
                "duplicate edge id '{}'",
                edge.id
            )));
        }
        let source_ix = *index.get(&edge.source).ok_or_else(|| {
            EngineError::InvalidGraph(format!(
                "edge '{}' references unknown source '{}'",
                edge.id, edge.source
            ))
        })?;
        let target_ix = *index.get(&edge.target).ok_or_else(|| {
            EngineError::InvalidGraph(format!(
                "edge '{}' references unknown target '{}'",
                edge.id, edge.target
            ))
        })?;
        let source_port = Port::from_handle(&edge.source_handle)
            .map_err(|e| EngineError::InvalidGraph(format!("edge '{}': {}", edge.id, e)))?;

        inner.add_edge(
            source_ix,
            target_ix,
            GraphEdge {
                id: edge.id.clone(),
                source: edge.source.clone(),
                target: edge.target.clone(),
                source_port,
                target_port: edge.target_handle.clone(),
            },
        );
    }

    Ok(Graph {
        inner,
        index,
        back_edges: HashSet::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(raw: serde_json::Value) -> GraphDocument {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_build_simple() {
        let graph = build_graph(&doc(serde_json::json!({
            "nodes": [
                {"id": "a", "type": "input", "data": {"inputValue": "x"}},
                {"id": "b", "type": "output", "data": {}}
            ],
            "edges": [
                {"id": "e1", "source": "a", "target": "b"}
            ]
        })))
        .unwrap();

        assert_eq!(graph.node("a").unwrap().kind, NodeKind::Input);
        assert_eq!(graph.node("a").unwrap().seed.as_deref(), Some("x"));
        assert_eq!(graph.inbound_edges("b").len(), 1);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = build_graph(&doc(serde_json::json!({
            "nodes": [{"id": "a", "type": "teleport", "data": {}}],
            "edges": []
        })))
        .unwrap_err();
        assert!(err.to_string().contains("unknown node kind"));
    }

    #[test]
    fn test_legacy_kind_aliases() {
        let graph = build_graph(&doc(serde_json::json!({
            "nodes": [
                {"id": "a", "type": "neural-input", "data": {}},
                {"id": "b", "type": "neural-llm", "data": {}},
                {"id": "c", "type": "neural-output", "data": {}}
            ],
            "edges": []
        })))
        .unwrap();
        assert_eq!(graph.node("b").unwrap().kind, NodeKind::Llm);
    }

    #[test]
    fn test_dangling_edge_rejected() {
        let err = build_graph(&doc(serde_json::json!({
            "nodes": [{"id": "a", "type": "input", "data": {}}],
            "edges": [{"id": "e1", "source": "a", "target": "ghost"}]
        })))
        .unwrap_err();
        assert!(err.to_string().contains("unknown target"));
    }

    #[test]
    fn test_duplicate_node_id_rejected() {
        let err = build_graph(&doc(serde_json::json!({
            "nodes": [
                {"id": "a", "type": "input", "data": {}},
                {"id": "a", "type": "output", "data": {}}
            ],
            "edges": []
        })))
        .unwrap_err();
        assert!(err.to_string().contains("duplicate node id"));
    }

    #[test]
    fn test_unknown_port_rejected() {
        let err = build_graph(&doc(serde_json::json!({
            "nodes": [
                {"id": "a", "type": "condition", "data": {}},
                {"id": "b", "type": "output", "data": {}}
            ],
            "edges": [{"id": "e1", "source": "a", "target": "b", "sourceHandle": "maybe"}]
        })))
        .unwrap_err();
        assert!(err.to_string().contains("unknown source port"));
    }
}

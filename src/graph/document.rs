//! Wire shape of a submitted graph, as produced by the visual editor.

use serde::Deserialize;
use serde_json::Value;

/// One submitted graph: the single client→server frame of a session.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphDocument {
    #[serde(rename = "apiKey", default)]
    pub api_key: Option<String>,
    pub nodes: Vec<NodeDocument>,
    pub edges: Vec<EdgeDocument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeDocument {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Editor canvas position; accepted and ignored.
    #[serde(default)]
    pub position: Value,
    #[serde(default)]
    pub data: NodeDataDocument,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeDataDocument {
    #[serde(default)]
    pub node_config: Value,
    #[serde(rename = "inputValue", default)]
    pub input_value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EdgeDocument {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "sourceHandle", default)]
    pub source_handle: Option<String>,
    #[serde(rename = "targetHandle", default)]
    pub target_handle: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_document() {
        let raw = r#"{
            "apiKey": "sk-test",
            "nodes": [
                {"id": "a", "type": "input", "position": {"x": 0, "y": 0},
                 "data": {"node_config": {}, "inputValue": "hi"}}
            ],
            "edges": []
        }"#;
        let doc: GraphDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(doc.api_key.as_deref(), Some("sk-test"));
        assert_eq!(doc.nodes[0].data.input_value.as_deref(), Some("hi"));
    }

    #[test]
    fn test_parse_edge_handles() {
        let raw = r#"{
            "nodes": [],
            "edges": [
                {"id": "e1", "source": "c", "target": "t", "sourceHandle": "true",
                 "targetHandle": null}
            ]
        }"#;
        let doc: GraphDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(doc.edges[0].source_handle.as_deref(), Some("true"));
        assert!(doc.edges[0].target_handle.is_none());
    }

    #[test]
    fn test_missing_data_defaults() {
        let raw = r#"{"nodes": [{"id": "a", "type": "output"}], "edges": []}"#;
        let doc: GraphDocument = serde_json::from_str(raw).unwrap();
        assert!(doc.nodes[0].data.input_value.is_none());
        assert!(doc.nodes[0].data.node_config.is_null());
    }
}

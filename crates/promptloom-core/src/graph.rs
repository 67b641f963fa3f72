use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{LoomError, Result};

/// The closed set of node types the engine knows how to execute.
///
/// Unknown type strings are preserved as [`NodeKind::Other`] so that a graph
/// containing them still deserializes; executing such a node is a structural
/// error reported at dispatch time, not a silent no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Prompt,
    Condition,
    Input,
    Output,
    ApiCall,
    Transform,
    Scraper,
    Other(String),
}

impl NodeKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "prompt" => Self::Prompt,
            "condition" => Self::Condition,
            "input" => Self::Input,
            "output" => Self::Output,
            "api" => Self::ApiCall,
            "transform" => Self::Transform,
            // "scraperNode" is a legacy alias still found in older exports
            "scraper" | "scraperNode" => Self::Scraper,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Prompt => "prompt",
            Self::Condition => "condition",
            Self::Input => "input",
            Self::Output => "output",
            Self::ApiCall => "api",
            Self::Transform => "transform",
            Self::Scraper => "scraper",
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for NodeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// A single typed unit of work in a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within the graph.
    pub id: String,
    /// Node type tag.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Type-specific configuration payload.
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// A directed connection establishing execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
}

/// Immutable node/edge snapshot consumed per run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl WorkflowGraph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Ids of nodes no edge targets, in graph order. These are the entry
    /// points of the workflow; a graph may have several.
    pub fn start_node_ids(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| !self.edges.iter().any(|e| e.target == n.id))
            .map(|n| n.id.as_str())
            .collect()
    }

    /// Target ids of all edges leaving `id`, in listed edge order.
    /// Multi-edges are allowed and yield duplicate targets.
    pub fn next_node_ids(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.source == id)
            .map(|e| e.target.as_str())
            .collect()
    }
}

/// Workflow export/import document.
///
/// `name`, `nodes` and `edges` are required on import; everything else is
/// optional metadata carried through round-trips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowDocument {
    /// Parse and validate an exported workflow.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| LoomError::Config(format!("invalid workflow document: {}", e)))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The graph snapshot the engine consumes.
    pub fn graph(&self) -> WorkflowGraph {
        WorkflowGraph::new(self.nodes.clone(), self.edges.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_kind_wire_names() {
        assert_eq!(NodeKind::parse("prompt"), NodeKind::Prompt);
        assert_eq!(NodeKind::parse("api"), NodeKind::ApiCall);
        assert_eq!(NodeKind::parse("scraper"), NodeKind::Scraper);
        assert_eq!(NodeKind::parse("scraperNode"), NodeKind::Scraper);
        assert_eq!(
            NodeKind::parse("webhook"),
            NodeKind::Other("webhook".into())
        );
        assert_eq!(NodeKind::ApiCall.as_str(), "api");
    }

    #[test]
    fn test_unknown_node_type_survives_deserialization() {
        let node: Node = serde_json::from_value(json!({
            "id": "n1",
            "type": "mystery",
            "data": {}
        }))
        .unwrap();
        assert_eq!(node.kind, NodeKind::Other("mystery".into()));
    }

    #[test]
    fn test_start_node_detection() {
        let graph = WorkflowGraph::new(
            vec![
                Node { id: "a".into(), kind: NodeKind::Input, data: Default::default() },
                Node { id: "b".into(), kind: NodeKind::Output, data: Default::default() },
                Node { id: "c".into(), kind: NodeKind::Output, data: Default::default() },
            ],
            vec![
                Edge { source: "a".into(), target: "b".into() },
                Edge { source: "b".into(), target: "c".into() },
            ],
        );
        assert_eq!(graph.start_node_ids(), vec!["a"]);
        assert_eq!(graph.next_node_ids("a"), vec!["b"]);
        assert_eq!(graph.next_node_ids("c"), Vec::<&str>::new());
    }

    #[test]
    fn test_document_requires_name_nodes_edges() {
        let err = WorkflowDocument::from_json(r#"{"nodes": [], "edges": []}"#).unwrap_err();
        assert!(err.to_string().contains("invalid workflow document"));

        let doc = WorkflowDocument::from_json(
            r#"{"name": "w", "nodes": [], "edges": []}"#,
        )
        .unwrap();
        assert_eq!(doc.name, "w");
        assert!(doc.settings.is_empty());
    }
}

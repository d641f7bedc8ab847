//! Corpus nodes

use serde::{Deserialize, Serialize};

/// Free-form node metadata
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Name of the reserved group holding one node per ingested document
pub const ROOT_GROUP: &str = "__root__";

/// A raw corpus document handed to the node store at ingestion time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    pub path: String,
    pub text: String,
    pub metadata: Metadata,
}

impl RawDocument {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// An immutable unit of corpus content.
///
/// Nodes are shared as `Arc<Node>` once materialized and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub parent_id: Option<String>,
    pub group_name: String,
}

impl Node {
    /// Whether this node is a root document rather than a derived node
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

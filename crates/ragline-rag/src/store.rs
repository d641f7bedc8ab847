//! Node store: named node groups materialized lazily and at most once

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use ragline_core::{Error, Node, RawDocument, Result, RetryConfig, ROOT_GROUP, TransformProvider};

use crate::transform::{TransformRuntime, TransformSpec};
use crate::{SentenceSplitter, Transform};

/// Built-in chunk groups registered over the root: (name, chunk size, overlap)
pub const BUILTIN_GROUPS: [(&str, usize, usize); 3] = [
    ("CoarseChunk", 1024, 100),
    ("MediumChunk", 256, 25),
    ("FineChunk", 128, 12),
];

/// The materialized nodes of one group, in derivation order
#[derive(Debug, Default)]
pub struct GroupNodes {
    nodes: Vec<Arc<Node>>,
    index: HashMap<String, usize>,
}

impl GroupNodes {
    fn new(nodes: Vec<Arc<Node>>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(position, node)| (node.id.clone(), position))
            .collect();
        Self { nodes, index }
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Node>> {
        self.index.get(id).map(|&position| &self.nodes[position])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A named, derivable partition of nodes
pub struct NodeGroup {
    name: String,
    parent: Option<String>,
    transform: Option<TransformSpec>,
    nodes: OnceCell<Arc<GroupNodes>>,
}

impl NodeGroup {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The group this one derives from; `None` only for the root group
    pub fn source(&self) -> Option<&str> {
        match (&self.parent, &self.transform) {
            (Some(parent), _) => Some(parent),
            (None, Some(_)) => Some(ROOT_GROUP),
            (None, None) => None,
        }
    }

    pub fn is_materialized(&self) -> bool {
        self.nodes.initialized()
    }
}

/// Arena of node groups indexed by name.
///
/// Groups are declared up front and materialized on first `get_nodes`. The
/// per-group `OnceCell` guarantees concurrent first readers share a single
/// transform run.
pub struct NodeStore {
    groups: RwLock<HashMap<String, Arc<NodeGroup>>>,
    runtime: TransformRuntime,
}

impl NodeStore {
    /// Ingest `documents` as the root group and register the built-in chunk groups
    pub fn new(documents: Vec<RawDocument>) -> Result<Self> {
        let store = Self::bare(documents);
        for (name, chunk_size, chunk_overlap) in BUILTIN_GROUPS {
            let splitter = SentenceSplitter::new(chunk_size, chunk_overlap)?;
            store.create_node_group(name, None, Transform::Splitter(splitter))?;
        }
        Ok(store)
    }

    /// Ingest `documents` as the root group without registering built-in groups
    pub fn bare(documents: Vec<RawDocument>) -> Self {
        let nodes = documents
            .into_iter()
            .enumerate()
            .map(|(ordinal, document)| {
                let mut metadata = document.metadata;
                metadata
                    .entry("path".to_string())
                    .or_insert_with(|| json!(document.path));
                Arc::new(Node {
                    id: format!("{:x}", md5::compute(format!("{}:{}", ordinal, document.path))),
                    text: document.text,
                    metadata,
                    parent_id: None,
                    group_name: ROOT_GROUP.to_string(),
                })
            })
            .collect();

        let root = NodeGroup {
            name: ROOT_GROUP.to_string(),
            parent: None,
            transform: None,
            nodes: OnceCell::from(Arc::new(GroupNodes::new(nodes))),
        };

        Self {
            groups: RwLock::new(HashMap::from([(ROOT_GROUP.to_string(), Arc::new(root))])),
            runtime: TransformRuntime {
                provider: None,
                retry: RetryConfig::default(),
                concurrency: 8,
            },
        }
    }

    pub fn with_transform_provider(mut self, provider: Arc<dyn TransformProvider>) -> Self {
        self.runtime.provider = Some(provider);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.runtime.retry = retry;
        self
    }

    /// Maximum number of parent nodes transformed concurrently
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.runtime.concurrency = concurrency.max(1);
        self
    }

    /// Declare a group derived from `parent` (or from the root when `None`)
    pub fn create_node_group(
        &self,
        name: &str,
        parent: Option<&str>,
        transform: impl Into<TransformSpec>,
    ) -> Result<()> {
        let mut groups = self
            .groups
            .write()
            .map_err(|_| Error::Other("Lock error".to_string()))?;

        if groups.contains_key(name) {
            return Err(Error::DuplicateGroup(name.to_string()));
        }
        if let Some(parent) = parent {
            if !groups.contains_key(parent) {
                return Err(Error::UnknownParent {
                    group: name.to_string(),
                    parent: parent.to_string(),
                });
            }
        }

        let group = NodeGroup {
            name: name.to_string(),
            parent: parent.map(String::from),
            transform: Some(transform.into()),
            nodes: OnceCell::new(),
        };
        groups.insert(name.to_string(), Arc::new(group));
        debug!(group = name, parent = parent.unwrap_or(ROOT_GROUP), "declared node group");
        Ok(())
    }

    pub fn group(&self, name: &str) -> Result<Arc<NodeGroup>> {
        let groups = self
            .groups
            .read()
            .map_err(|_| Error::Other("Lock error".to_string()))?;
        groups
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownGroup(name.to_string()))
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.group(name).is_ok()
    }

    /// Declared group names, sorted
    pub fn group_names(&self) -> Result<Vec<String>> {
        let groups = self
            .groups
            .read()
            .map_err(|_| Error::Other("Lock error".to_string()))?;
        let mut names: Vec<String> = groups.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// The nodes of `name`, materializing it and its ancestors on first use
    pub async fn get_nodes(&self, name: &str) -> Result<Arc<GroupNodes>> {
        self.materialize(name.to_string()).await
    }

    fn materialize(&self, name: String) -> BoxFuture<'_, Result<Arc<GroupNodes>>> {
        async move {
            let group = self.group(&name)?;
            let nodes = group
                .nodes
                .get_or_try_init(|| async {
                    let (source, spec) = match (group.source(), &group.transform) {
                        (Some(source), Some(spec)) => (source.to_string(), spec),
                        _ => {
                            return Err(Error::Configuration(format!(
                                "node group '{}' has no nodes and no transform",
                                group.name
                            )));
                        }
                    };
                    let parents = self.materialize(source.clone()).await?;
                    info!(group = %group.name, source = %source, parents = parents.len(), "materializing node group");
                    let nodes = spec.derive(&group.name, parents.nodes(), &self.runtime).await?;
                    Ok::<_, Error>(Arc::new(GroupNodes::new(nodes)))
                })
                .await?;
            Ok(nodes.clone())
        }
        .boxed()
    }

    /// Map `node` to its counterpart in `target` by shared lineage.
    ///
    /// Ancestors are tried first by walking `parent_id`. If `target` derives
    /// from the node's group, the first node of `target` descending from
    /// `node` is used.
    pub async fn resolve_target(&self, node: &Arc<Node>, target: &str) -> Result<Arc<Node>> {
        if node.group_name == target {
            return Ok(node.clone());
        }
        let unresolved = || Error::UnresolvedTarget {
            node_id: node.id.clone(),
            target: target.to_string(),
        };

        let mut current = node.clone();
        while let Some(parent_id) = current.parent_id.clone() {
            let source = self
                .group(&current.group_name)?
                .source()
                .map(String::from)
                .ok_or_else(unresolved)?;
            let parents = self.get_nodes(&source).await?;
            let parent = parents.get(&parent_id).cloned().ok_or_else(unresolved)?;
            if parent.group_name == target {
                return Ok(parent);
            }
            current = parent;
        }

        let lineage = self.lineage(target)?;
        if let Some(depth) = lineage.iter().position(|group| *group == node.group_name) {
            let candidates = self.get_nodes(target).await?;
            for candidate in candidates.nodes() {
                if self.ancestor_at(candidate, depth).await?.id == node.id {
                    return Ok(candidate.clone());
                }
            }
        }

        Err(unresolved())
    }

    /// Source groups of `name`, nearest first, ending at the root
    fn lineage(&self, name: &str) -> Result<Vec<String>> {
        let mut lineage = Vec::new();
        let mut current = self.group(name)?;
        while let Some(source) = current.source() {
            lineage.push(source.to_string());
            current = self.group(source)?;
        }
        Ok(lineage)
    }

    /// The ancestor `depth + 1` generations above `node`
    async fn ancestor_at(&self, node: &Arc<Node>, depth: usize) -> Result<Arc<Node>> {
        let mut current = node.clone();
        for _ in 0..=depth {
            let (Some(parent_id), Some(source)) = (
                current.parent_id.clone(),
                self.group(&current.group_name)?.source().map(String::from),
            ) else {
                return Err(Error::UnresolvedTarget {
                    node_id: node.id.clone(),
                    target: current.group_name.clone(),
                });
            };
            let parents = self.get_nodes(&source).await?;
            current = parents
                .get(&parent_id)
                .cloned()
                .ok_or_else(|| Error::UnresolvedTarget {
                    node_id: node.id.clone(),
                    target: source.clone(),
                })?;
        }
        Ok(current)
    }
}

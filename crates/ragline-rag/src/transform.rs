//! Transforms deriving one node group from another

use futures::{StreamExt, TryStreamExt, stream};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use ragline_core::{
    Error, Node, Result, RetryConfig, TransformKind, TransformOutput, TransformProvider,
};

use crate::SentenceSplitter;

/// User-supplied derivation from one node to the texts of its children
pub type CustomFn = Arc<dyn Fn(&Node) -> Result<Vec<String>> + Send + Sync>;

/// The closed set of derivations a node group can be declared with
#[derive(Clone)]
pub enum Transform {
    Splitter(SentenceSplitter),
    Summarizer,
    KeywordExtractor,
    QAPairExtractor,
    CustomFunction(CustomFn),
}

impl Transform {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Node) -> Result<Vec<String>> + Send + Sync + 'static,
    {
        Transform::CustomFunction(Arc::new(f))
    }

    /// The provider capability this transform delegates to, if any
    pub fn provider_kind(&self) -> Option<TransformKind> {
        match self {
            Transform::Summarizer => Some(TransformKind::Summary),
            Transform::KeywordExtractor => Some(TransformKind::Keywords),
            Transform::QAPairExtractor => Some(TransformKind::QaPairs),
            Transform::Splitter(_) | Transform::CustomFunction(_) => None,
        }
    }

    async fn apply_one(
        &self,
        node: &Node,
        provider: Option<&dyn TransformProvider>,
    ) -> Result<TransformOutput> {
        match self {
            Transform::Splitter(splitter) => Ok(TransformOutput::Texts(splitter.split(&node.text))),
            Transform::CustomFunction(f) => f(node).map(TransformOutput::Texts),
            other => {
                let kind = other.provider_kind().ok_or_else(|| {
                    Error::Configuration(format!("transform {:?} has no provider capability", other))
                })?;
                let provider = provider.ok_or_else(|| {
                    Error::Configuration(format!(
                        "transform '{}' requires a transform provider",
                        kind.as_str()
                    ))
                })?;
                provider.transform(kind, &node.text).await
            }
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Splitter(splitter) => f.debug_tuple("Splitter").field(splitter).finish(),
            Transform::Summarizer => f.write_str("Summarizer"),
            Transform::KeywordExtractor => f.write_str("KeywordExtractor"),
            Transform::QAPairExtractor => f.write_str("QAPairExtractor"),
            Transform::CustomFunction(_) => f.write_str("CustomFunction"),
        }
    }
}

/// A transform together with how its outputs become nodes
#[derive(Debug, Clone)]
pub struct TransformSpec {
    pub transform: Transform,
    /// Provider outputs are full nodes whose metadata is kept
    pub trans_node: bool,
}

impl TransformSpec {
    pub fn new(transform: Transform) -> Self {
        Self {
            transform,
            trans_node: false,
        }
    }

    pub fn trans_node(mut self, trans_node: bool) -> Self {
        self.trans_node = trans_node;
        self
    }
}

impl From<Transform> for TransformSpec {
    fn from(transform: Transform) -> Self {
        Self::new(transform)
    }
}

/// Execution knobs shared by every group a store materializes
#[derive(Clone)]
pub(crate) struct TransformRuntime {
    pub provider: Option<Arc<dyn TransformProvider>>,
    pub retry: RetryConfig,
    pub concurrency: usize,
}

impl TransformSpec {
    /// Derive the nodes of `group` from its parents, preserving parent order
    pub(crate) async fn derive(
        &self,
        group: &str,
        parents: &[Arc<Node>],
        runtime: &TransformRuntime,
    ) -> Result<Vec<Arc<Node>>> {
        let provider = runtime.provider.as_deref();
        let label = format!("transform:{}", group);

        let outputs: Vec<(Arc<Node>, TransformOutput)> = stream::iter(parents.iter().cloned())
            .map(|parent| {
                let label = &label;
                async move {
                    let output = runtime
                        .retry
                        .run(label, || self.transform.apply_one(&parent, provider))
                        .await?;
                    Ok::<_, Error>((parent, output))
                }
            })
            .buffered(runtime.concurrency.max(1))
            .try_collect()
            .await?;

        let mut nodes = Vec::new();
        for (parent, output) in outputs {
            let drafts = output
                .into_drafts()
                .into_iter()
                .filter(|draft| !draft.text.trim().is_empty());

            for (ordinal, draft) in drafts.enumerate() {
                let mut metadata = parent.metadata.clone();
                if self.trans_node {
                    metadata.extend(draft.metadata);
                }
                nodes.push(Arc::new(Node {
                    id: child_id(group, &parent.id, ordinal),
                    text: draft.text,
                    metadata,
                    parent_id: Some(parent.id.clone()),
                    group_name: group.to_string(),
                }));
            }
        }

        debug!(group, parents = parents.len(), children = nodes.len(), "derived node group");
        Ok(nodes)
    }
}

/// Deterministic id of the `ordinal`-th child of `parent_id` in `group`
pub fn child_id(group: &str, parent_id: &str, ordinal: usize) -> String {
    format!("{:x}", md5::compute(format!("{}:{}:{}", group, parent_id, ordinal)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragline_core::{Metadata, NodeDraft};
    use serde_json::json;

    fn parent(id: &str, text: &str) -> Arc<Node> {
        let mut metadata = Metadata::new();
        metadata.insert("file_name".to_string(), json!("a.txt"));
        Arc::new(Node {
            id: id.to_string(),
            text: text.to_string(),
            metadata,
            parent_id: None,
            group_name: ragline_core::ROOT_GROUP.to_string(),
        })
    }

    fn runtime(provider: Option<Arc<dyn TransformProvider>>) -> TransformRuntime {
        TransformRuntime {
            provider,
            retry: RetryConfig::none(),
            concurrency: 4,
        }
    }

    struct KeywordNodes;

    #[async_trait]
    impl TransformProvider for KeywordNodes {
        async fn transform(&self, kind: TransformKind, text: &str) -> Result<TransformOutput> {
            assert_eq!(kind, TransformKind::Keywords);
            let mut draft = NodeDraft::new(text.split_whitespace().next().unwrap_or_default());
            draft.metadata.insert("kind".to_string(), json!("keyword"));
            Ok(TransformOutput::Nodes(vec![draft, NodeDraft::new("  ")]))
        }
    }

    #[tokio::test]
    async fn test_custom_function_children_inherit_lineage() {
        let spec = TransformSpec::new(Transform::custom(|node| {
            Ok(node.text.split('|').map(String::from).collect())
        }));
        let children = spec
            .derive("pieces", &[parent("p1", "a|b")], &runtime(None))
            .await
            .unwrap();

        assert_eq!(children.len(), 2);
        assert_eq!(children[0].text, "a");
        assert_eq!(children[0].parent_id.as_deref(), Some("p1"));
        assert_eq!(children[0].group_name, "pieces");
        assert_eq!(children[0].metadata["file_name"], json!("a.txt"));
        assert_eq!(children[1].id, child_id("pieces", "p1", 1));
    }

    #[tokio::test]
    async fn test_trans_node_keeps_item_metadata() {
        let provider: Arc<dyn TransformProvider> = Arc::new(KeywordNodes);
        let parents = [parent("p1", "rust ownership")];

        let plain = TransformSpec::new(Transform::KeywordExtractor)
            .derive("kw", &parents, &runtime(Some(provider.clone())))
            .await
            .unwrap();
        assert_eq!(plain.len(), 1);
        assert!(!plain[0].metadata.contains_key("kind"));

        let full = TransformSpec::new(Transform::KeywordExtractor)
            .trans_node(true)
            .derive("kw", &parents, &runtime(Some(provider)))
            .await
            .unwrap();
        assert_eq!(full[0].text, "rust");
        assert_eq!(full[0].metadata["kind"], json!("keyword"));
        assert_eq!(full[0].metadata["file_name"], json!("a.txt"));
    }

    #[tokio::test]
    async fn test_provider_transform_without_provider_is_configuration_error() {
        let err = TransformSpec::new(Transform::Summarizer)
            .derive("summary", &[parent("p1", "text")], &runtime(None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_custom_function_error_propagates() {
        let err = TransformSpec::new(Transform::custom(|_| {
            Err(Error::Transform("bad input".to_string()))
        }))
        .derive("x", &[parent("p1", "text")], &runtime(None))
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Transform(_)));
    }
}

//! Second-stage reranking of fused candidates

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use ragline_core::{Error, MergedResult, RelevanceModel, Result};
use ragline_pipeline::{BoundArgs, Stage, Value};

/// Delimiter placed between node texts when the context is joined
pub const DEFAULT_JOIN_DELIMITER: &str = "\n\n";

/// Whether the context is built from node text or keeps the nodes themselves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Content,
    Node,
}

/// How content output is assembled
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JoinMode {
    /// One text per selected node
    #[default]
    Off,
    /// Selected texts joined into one string
    Delimiter(String),
}

impl JoinMode {
    pub fn joined() -> Self {
        JoinMode::Delimiter(DEFAULT_JOIN_DELIMITER.to_string())
    }
}

impl From<bool> for JoinMode {
    fn from(join: bool) -> Self {
        if join { JoinMode::joined() } else { JoinMode::Off }
    }
}

/// A candidate with its relevance-model score
#[derive(Debug, Clone)]
pub struct RankedNode {
    pub candidate: MergedResult,
    pub relevance: f32,
}

/// The reranker's output handed to generation
#[derive(Debug, Clone)]
pub enum Context {
    Joined(String),
    Texts(Vec<String>),
    Nodes(Vec<RankedNode>),
}

impl Context {
    pub fn len(&self) -> usize {
        match self {
            Context::Joined(text) => usize::from(!text.is_empty()),
            Context::Texts(texts) => texts.len(),
            Context::Nodes(nodes) => nodes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Context> for Value {
    fn from(context: Context) -> Self {
        match context {
            Context::Joined(text) => Value::Text(text),
            Context::Texts(texts) => Value::List(texts.into_iter().map(Value::Text).collect()),
            Context::Nodes(nodes) => {
                Value::Merged(nodes.into_iter().map(|ranked| ranked.candidate).collect())
            }
        }
    }
}

/// Re-scores candidates with a relevance model that reads query and node text
/// jointly, then keeps the best `top_k`.
pub struct Reranker {
    model: Arc<dyn RelevanceModel>,
    top_k: usize,
    output_format: OutputFormat,
    join: JoinMode,
}

impl Reranker {
    pub fn new(model: Arc<dyn RelevanceModel>, top_k: usize) -> Self {
        Self {
            model,
            top_k,
            output_format: OutputFormat::default(),
            join: JoinMode::default(),
        }
    }

    pub fn with_output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = output_format;
        self
    }

    /// Only applies to [`OutputFormat::Content`]
    pub fn with_join(mut self, join: impl Into<JoinMode>) -> Self {
        self.join = join.into();
        self
    }

    /// Full re-sort by relevance, ties keeping fused order
    pub async fn rank(&self, query: &str, candidates: Vec<MergedResult>) -> Result<Vec<RankedNode>> {
        if candidates.is_empty() || self.top_k == 0 {
            return Ok(Vec::new());
        }

        let documents: Vec<String> = candidates.iter().map(|c| c.node.text.clone()).collect();
        let scores = self.model.relevance(query, &documents).await?;
        if scores.len() != candidates.len() {
            return Err(Error::retrieval(
                self.model.model_id(),
                format!(
                    "relevance model returned {} scores for {} candidates",
                    scores.len(),
                    candidates.len()
                ),
            ));
        }

        let mut ranked: Vec<RankedNode> = candidates
            .into_iter()
            .zip(scores)
            .map(|(candidate, relevance)| RankedNode {
                candidate,
                relevance,
            })
            .collect();
        ranked.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        ranked.truncate(self.top_k);

        debug!(
            model = self.model.model_id(),
            kept = ranked.len(),
            top = ranked.first().map(|r| r.relevance),
            "reranked"
        );
        Ok(ranked)
    }

    pub async fn rerank(&self, query: &str, candidates: Vec<MergedResult>) -> Result<Context> {
        let ranked = self.rank(query, candidates).await?;

        Ok(match (self.output_format, &self.join) {
            (OutputFormat::Node, _) => Context::Nodes(ranked),
            (OutputFormat::Content, JoinMode::Off) => Context::Texts(texts(ranked)),
            (OutputFormat::Content, JoinMode::Delimiter(delimiter)) => {
                Context::Joined(texts(ranked).join(delimiter))
            }
        })
    }
}

fn texts(ranked: Vec<RankedNode>) -> Vec<String> {
    ranked
        .into_iter()
        .map(|r| r.candidate.node.text.clone())
        .collect()
}

/// Takes candidates as input and the original query as the bound `query` argument
#[async_trait]
impl Stage for Reranker {
    async fn call(&self, input: Value, args: &BoundArgs) -> Result<Value> {
        let query = args.require_text("query")?;
        let candidates = input.into_candidates()?;
        Ok(self.rerank(query, candidates).await?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::{Combinator, Metadata, Node, RetrievalResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Relevance is the text length, so the ranking ignores fused scores
    struct ByLength {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RelevanceModel for ByLength {
        async fn relevance(&self, _query: &str, documents: &[String]) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(documents.iter().map(|d| d.len() as f32).collect())
        }

        fn model_id(&self) -> &str {
            "by-length"
        }
    }

    fn model() -> Arc<ByLength> {
        Arc::new(ByLength {
            calls: AtomicUsize::new(0),
        })
    }

    fn candidates(texts: &[&str]) -> Vec<MergedResult> {
        let results = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let node = Arc::new(Node {
                    id: format!("n{}", i),
                    text: text.to_string(),
                    metadata: Metadata::new(),
                    parent_id: None,
                    group_name: "g".to_string(),
                });
                RetrievalResult::new(node, 1.0 - i as f32 * 0.1, "r")
            })
            .collect();
        Combinator::Sum.merge(vec![results])
    }

    #[tokio::test]
    async fn test_full_resort_and_truncation() {
        let reranker = Reranker::new(model(), 2);
        let context = reranker
            .rerank("q", candidates(&["aa", "aaaa", "a", "aaa"]))
            .await
            .unwrap();

        let Context::Texts(texts) = context else {
            panic!("expected texts");
        };
        assert_eq!(texts, vec!["aaaa", "aaa"]);
    }

    #[tokio::test]
    async fn test_join_uses_default_delimiter() {
        let reranker = Reranker::new(model(), 3).with_join(true);
        let context = reranker.rerank("q", candidates(&["bb", "b"])).await.unwrap();

        let Context::Joined(text) = context else {
            panic!("expected joined text");
        };
        assert_eq!(text, "bb\n\nb");
    }

    #[tokio::test]
    async fn test_node_format_keeps_relevance() {
        let reranker = Reranker::new(model(), 5).with_output_format(OutputFormat::Node);
        let context = reranker.rerank("q", candidates(&["x", "xyz"])).await.unwrap();

        let Context::Nodes(nodes) = context else {
            panic!("expected nodes");
        };
        assert_eq!(nodes[0].candidate.node_id, "n1");
        assert_eq!(nodes[0].relevance, 3.0);
    }

    #[tokio::test]
    async fn test_empty_candidates_skip_the_model() {
        let model = model();
        let reranker = Reranker::new(model.clone(), 3).with_join(true);
        let context = reranker.rerank("q", Vec::new()).await.unwrap();

        assert!(context.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stage_requires_bound_query() {
        let reranker = Reranker::new(model(), 1);
        let input = Value::Merged(candidates(&["a"]));

        let err = reranker.call(input.clone(), &BoundArgs::empty()).await.unwrap_err();
        assert!(matches!(err, Error::UnboundReference { param, .. } if param == "query"));

        let output = reranker
            .call(input, &BoundArgs::empty().with("query", "q"))
            .await
            .unwrap();
        assert!(matches!(output, Value::List(items) if items.len() == 1));
    }
}

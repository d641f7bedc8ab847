//! Retrieval strategies: how a node is scored against a query

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use ragline_core::{EmbeddingProvider, Error, LexicalScorer, Node, Result};

use crate::bm25::{Bm25Params, Bm25Scorer, Tokenizer};

/// Scores nodes against a query.
///
/// `score_group` lets a strategy amortize work over a whole group (one query
/// embedding, one set of corpus statistics); the default scores node by node.
#[async_trait]
pub trait RetrievalStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn score(&self, query: &str, node: &Node) -> Result<f32>;

    async fn score_group(&self, query: &str, nodes: &[Arc<Node>]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(nodes.len());
        for node in nodes {
            scores.push(self.score(query, node).await?);
        }
        Ok(scores)
    }
}

/// Build a strategy from its configured name
pub fn strategy_from_name(
    name: &str,
    embedding: Option<Arc<dyn EmbeddingProvider>>,
) -> Result<Arc<dyn RetrievalStrategy>> {
    match name {
        "cosine" => {
            let provider = embedding.ok_or_else(|| {
                Error::Configuration("similarity 'cosine' requires an embedding provider".to_string())
            })?;
            Ok(Arc::new(CosineSimilarity::new(provider)))
        }
        "bm25" => Ok(Arc::new(Bm25Similarity::new(Tokenizer::English))),
        "bm25_chinese" => Ok(Arc::new(Bm25Similarity::new(Tokenizer::Chinese))),
        other => Err(Error::Configuration(format!(
            "unknown similarity '{}' (expected cosine, bm25 or bm25_chinese)",
            other
        ))),
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Embedding similarity; node vectors are cached by node id
pub struct CosineSimilarity {
    provider: Arc<dyn EmbeddingProvider>,
    cache: DashMap<String, Arc<Vec<f32>>>,
}

impl CosineSimilarity {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            cache: DashMap::new(),
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    async fn embedding(&self, node: &Node) -> Result<Arc<Vec<f32>>> {
        if let Some(vector) = self.cache.get(&node.id) {
            return Ok(vector.clone());
        }
        let vector = Arc::new(self.provider.embed(&node.text).await?);
        self.cache.insert(node.id.clone(), vector.clone());
        Ok(vector)
    }
}

#[async_trait]
impl RetrievalStrategy for CosineSimilarity {
    fn name(&self) -> &str {
        "cosine"
    }

    async fn score(&self, query: &str, node: &Node) -> Result<f32> {
        let query_vector = self.provider.embed(query).await?;
        let node_vector = self.embedding(node).await?;
        Ok(cosine_similarity(&query_vector, &node_vector))
    }

    async fn score_group(&self, query: &str, nodes: &[Arc<Node>]) -> Result<Vec<f32>> {
        let missing: Vec<&Arc<Node>> = nodes
            .iter()
            .filter(|node| !self.cache.contains_key(&node.id))
            .collect();

        if !missing.is_empty() {
            let texts: Vec<String> = missing.iter().map(|node| node.text.clone()).collect();
            let vectors = self.provider.embed_batch(&texts).await?;
            if vectors.len() != missing.len() {
                return Err(Error::retrieval(
                    self.provider.model_id(),
                    format!("expected {} embeddings, got {}", missing.len(), vectors.len()),
                ));
            }
            for (node, vector) in missing.into_iter().zip(vectors) {
                self.cache.insert(node.id.clone(), Arc::new(vector));
            }
            debug!(model = self.provider.model_id(), cached = self.cache.len(), "embedded nodes");
        }

        let query_vector = self.provider.embed(query).await?;
        let mut scores = Vec::with_capacity(nodes.len());
        for node in nodes {
            let node_vector = self.embedding(node).await?;
            scores.push(cosine_similarity(&query_vector, &node_vector));
        }
        Ok(scores)
    }
}

/// A fitted BM25 index over one group
struct Bm25Index {
    scorer: Bm25Scorer,
    documents: Vec<Vec<String>>,
}

/// BM25 lexical match; statistics are computed once per group
pub struct Bm25Similarity {
    name: &'static str,
    tokenizer: Tokenizer,
    params: Bm25Params,
    indexes: DashMap<String, Arc<Bm25Index>>,
}

impl Bm25Similarity {
    pub fn new(tokenizer: Tokenizer) -> Self {
        let name = match tokenizer {
            Tokenizer::English => "bm25",
            Tokenizer::Chinese => "bm25_chinese",
        };
        Self {
            name,
            tokenizer,
            params: Bm25Params::default(),
            indexes: DashMap::new(),
        }
    }

    pub fn with_params(mut self, params: Bm25Params) -> Self {
        self.params = params;
        self
    }

    fn index(&self, nodes: &[Arc<Node>]) -> Arc<Bm25Index> {
        let fit = || {
            let documents: Vec<Vec<String>> = nodes
                .iter()
                .map(|node| self.tokenizer.tokenize(&node.text))
                .collect();
            Arc::new(Bm25Index {
                scorer: Bm25Scorer::fit(&documents, self.params),
                documents,
            })
        };

        let Some(group) = nodes.first().map(|node| node.group_name.clone()) else {
            return fit();
        };
        let index = self.indexes.entry(group).or_insert_with(fit).clone();
        if index.documents.len() == nodes.len() {
            index
        } else {
            // a different slice of the group: fit just these nodes
            fit()
        }
    }
}

#[async_trait]
impl RetrievalStrategy for Bm25Similarity {
    fn name(&self) -> &str {
        self.name
    }

    async fn score(&self, query: &str, node: &Node) -> Result<f32> {
        let query_tokens = self.tokenizer.tokenize(query);
        let node_tokens = self.tokenizer.tokenize(&node.text);
        let score = match self.indexes.get(&node.group_name) {
            Some(index) => index.scorer.score(&query_tokens, &node_tokens),
            None => Bm25Scorer::fit(std::slice::from_ref(&node_tokens), self.params)
                .score(&query_tokens, &node_tokens),
        };
        Ok(score)
    }

    async fn score_group(&self, query: &str, nodes: &[Arc<Node>]) -> Result<Vec<f32>> {
        let query_tokens = self.tokenizer.tokenize(query);
        let index = self.index(nodes);
        Ok(index
            .documents
            .iter()
            .map(|tokens| index.scorer.score(&query_tokens, tokens))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AxisEmbedding {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for AxisEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                text.matches("rust").count() as f32,
                text.matches("python").count() as f32,
            ])
        }

        fn model_id(&self) -> &str {
            "axis"
        }
    }

    fn node(id: &str, text: &str) -> Arc<Node> {
        Arc::new(Node {
            id: id.to_string(),
            text: text.to_string(),
            metadata: Default::default(),
            parent_id: None,
            group_name: "g".to_string(),
        })
    }

    #[test]
    fn test_cosine_similarity() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(strategy_from_name("bm25", None).unwrap().name(), "bm25");
        assert_eq!(
            strategy_from_name("bm25_chinese", None).unwrap().name(),
            "bm25_chinese"
        );
        assert!(matches!(
            strategy_from_name("cosine", None),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            strategy_from_name("jaccard", None),
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_cosine_embeds_each_node_once() {
        let provider = Arc::new(AxisEmbedding {
            calls: AtomicUsize::new(0),
        });
        let strategy = CosineSimilarity::new(provider.clone());
        let nodes = vec![node("1", "rust rust"), node("2", "python")];

        let scores = strategy.score_group("rust", &nodes).await.unwrap();
        assert_eq!(scores, vec![1.0, 0.0]);
        assert_eq!(strategy.cached(), 2);

        // second query re-embeds only the query
        strategy.score_group("python", &nodes).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2 + 1 + 1);
    }

    #[tokio::test]
    async fn test_bm25_group_scores_follow_node_order() {
        let strategy = Bm25Similarity::new(Tokenizer::English);
        let nodes = vec![
            node("1", "python garbage collector"),
            node("2", "rust ownership and borrowing"),
        ];

        let scores = strategy.score_group("rust borrowing", &nodes).await.unwrap();
        assert_eq!(scores[0], 0.0);
        assert!(scores[1] > 0.0);

        let single = strategy.score("rust borrowing", &nodes[1]).await.unwrap();
        assert_eq!(single, scores[1]);
    }
}

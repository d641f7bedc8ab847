//! A retriever: one strategy applied to one node group

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use ragline_core::{Error, Result, RetrievalResult};
use ragline_pipeline::{BoundArgs, Stage, Value};

use crate::{NodeStore, RetrievalStrategy};

pub const DEFAULT_TOP_K: usize = 6;

/// Ranked candidates for a query from a single node group
pub struct Retriever {
    name: String,
    store: Arc<NodeStore>,
    group: String,
    strategy: Arc<dyn RetrievalStrategy>,
    cutoff: f32,
    top_k: usize,
    target: Option<String>,
}

impl Retriever {
    /// Fails with `UnknownGroup` when `group` is not declared in `store`
    pub fn new(
        name: impl Into<String>,
        store: Arc<NodeStore>,
        group: impl Into<String>,
        strategy: Arc<dyn RetrievalStrategy>,
    ) -> Result<Self> {
        let group = group.into();
        store.group(&group)?;
        Ok(Self {
            name: name.into(),
            store,
            group,
            strategy,
            cutoff: f32::NEG_INFINITY,
            top_k: DEFAULT_TOP_K,
            target: None,
        })
    }

    /// Scores strictly below `cutoff` are discarded
    pub fn with_cutoff(mut self, cutoff: f32) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Report matches as their lineage counterparts in `target`
    pub fn with_target(mut self, target: impl Into<String>) -> Result<Self> {
        let target = target.into();
        self.store.group(&target)?;
        self.target = Some(target);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievalResult>> {
        let nodes = self.store.get_nodes(&self.group).await?;
        let scores = self.strategy.score_group(query, nodes.nodes()).await?;
        if scores.len() != nodes.len() {
            return Err(Error::retrieval(
                &self.name,
                format!(
                    "strategy '{}' returned {} scores for {} nodes",
                    self.strategy.name(),
                    scores.len(),
                    nodes.len()
                ),
            ));
        }

        let mut ranked: Vec<_> = nodes
            .nodes()
            .iter()
            .zip(scores)
            .filter(|(_, score)| *score >= self.cutoff)
            .collect();
        // stable: equal scores keep discovery order
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(self.top_k);

        let mut results = Vec::with_capacity(ranked.len());
        let mut seen = HashSet::new();
        for (node, score) in ranked {
            let node = match &self.target {
                Some(target) => self.store.resolve_target(node, target).await?,
                None => node.clone(),
            };
            if !seen.insert(node.id.clone()) {
                continue;
            }
            results.push(RetrievalResult {
                node_id: node.id.clone(),
                score,
                source_group: self.group.clone(),
                source_retriever: self.name.clone(),
                node,
            });
        }

        debug!(
            retriever = %self.name,
            group = %self.group,
            strategy = self.strategy.name(),
            candidates = nodes.len(),
            results = results.len(),
            "retrieved"
        );
        Ok(results)
    }
}

#[async_trait]
impl Stage for Retriever {
    async fn call(&self, input: Value, _args: &BoundArgs) -> Result<Value> {
        let query = input.into_text()?;
        Ok(Value::Results(self.retrieve(&query).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SentenceSplitter, Transform};
    use ragline_core::{Node, RawDocument};

    /// Scores a node by the percentage it carries in its text
    struct Numeric;

    #[async_trait]
    impl RetrievalStrategy for Numeric {
        fn name(&self) -> &str {
            "numeric"
        }

        async fn score(&self, _query: &str, node: &Node) -> Result<f32> {
            node.text
                .trim_end_matches('.')
                .rsplit(' ')
                .next()
                .and_then(|n| n.parse::<f32>().ok())
                .map(|n| n / 100.0)
                .ok_or_else(|| Error::retrieval("numeric", "no score in text"))
        }
    }

    fn store() -> Arc<NodeStore> {
        let store = NodeStore::bare(vec![
            RawDocument::new("a", "first 20. second 90. third 50."),
            RawDocument::new("b", "fourth 90. fifth 0."),
        ]);
        store
            .create_node_group(
                "sentences",
                None,
                Transform::Splitter(SentenceSplitter::new(12, 0).unwrap()),
            )
            .unwrap();
        Arc::new(store)
    }

    fn texts(results: &[RetrievalResult]) -> Vec<&str> {
        results.iter().map(|r| r.node.text.as_str()).collect()
    }

    #[tokio::test]
    async fn test_sorted_with_stable_ties_and_truncated() {
        let retriever = Retriever::new("r", store(), "sentences", Arc::new(Numeric))
            .unwrap()
            .with_top_k(3);

        let results = retriever.retrieve("q").await.unwrap();
        assert_eq!(texts(&results), vec!["second 90.", "fourth 90.", "third 50."]);
        assert!(results.iter().all(|r| r.source_retriever == "r"));
        assert!(results.iter().all(|r| r.source_group == "sentences"));
    }

    #[tokio::test]
    async fn test_cutoff_discards_low_scores() {
        let retriever = Retriever::new("r", store(), "sentences", Arc::new(Numeric))
            .unwrap()
            .with_cutoff(0.003);

        let results = retriever.retrieve("q").await.unwrap();
        assert_eq!(results.len(), 4);
        assert!(!texts(&results).contains(&"fifth 0."));
    }

    #[tokio::test]
    async fn test_target_remaps_and_dedupes() {
        let retriever = Retriever::new("r", store(), "sentences", Arc::new(Numeric))
            .unwrap()
            .with_target(ragline_core::ROOT_GROUP)
            .unwrap();

        let results = retriever.retrieve("q").await.unwrap();
        // second (a), fourth (b), third (a) collapse onto two documents
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].node.metadata["path"], "a");
        assert_eq!(results[0].score, 0.9);
        assert_eq!(results[1].node.metadata["path"], "b");
        assert_eq!(results[0].source_group, "sentences");
    }

    #[tokio::test]
    async fn test_unknown_groups_rejected_at_construction() {
        assert!(matches!(
            Retriever::new("r", store(), "nope", Arc::new(Numeric)),
            Err(Error::UnknownGroup(_))
        ));
        let retriever = Retriever::new("r", store(), "sentences", Arc::new(Numeric)).unwrap();
        assert!(matches!(
            retriever.with_target("nope"),
            Err(Error::UnknownGroup(_))
        ));
    }

    #[tokio::test]
    async fn test_stage_takes_text_and_returns_results() {
        let retriever = Retriever::new("r", store(), "sentences", Arc::new(Numeric))
            .unwrap()
            .with_top_k(1);

        let output = retriever.call("q".into(), &BoundArgs::empty()).await.unwrap();
        let Value::Results(results) = output else {
            panic!("expected results");
        };
        assert_eq!(results[0].node.text, "second 90.");
    }
}

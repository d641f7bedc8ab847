//! Ranked retrieval results and their fusion

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::Node;

/// One scored candidate produced by a single retriever invocation
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub node_id: String,
    pub score: f32,
    pub source_group: String,
    pub source_retriever: String,
    #[serde(skip)]
    pub node: Arc<Node>,
}

impl RetrievalResult {
    pub fn new(node: Arc<Node>, score: f32, source_retriever: impl Into<String>) -> Self {
        Self {
            node_id: node.id.clone(),
            score,
            source_group: node.group_name.clone(),
            source_retriever: source_retriever.into(),
            node,
        }
    }
}

/// A node after fan-in, with the results that contributed to it
#[derive(Debug, Clone, Serialize)]
pub struct MergedResult {
    pub node_id: String,
    pub fused_score: f64,
    pub contributing_results: Vec<RetrievalResult>,
    #[serde(skip)]
    pub node: Arc<Node>,
}

/// How ranked lists from several retrievers are combined.
///
/// `Sum` and `Max` group results by node id and rank by the fused score.
/// Equal fused scores are ordered by number of contributing results (more
/// first), then by first discovery across the lists in declared order.
/// `Concat` keeps every result as its own entry in declared order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    #[default]
    Sum,
    Max,
    Concat,
}

impl Combinator {
    /// Merge per-retriever result lists given in declared retriever order
    pub fn merge(&self, lists: Vec<Vec<RetrievalResult>>) -> Vec<MergedResult> {
        if *self == Combinator::Concat {
            return lists
                .into_iter()
                .flatten()
                .map(|result| MergedResult {
                    node_id: result.node_id.clone(),
                    fused_score: result.score as f64,
                    node: result.node.clone(),
                    contributing_results: vec![result],
                })
                .collect();
        }

        let mut merged: Vec<MergedResult> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();

        for result in lists.into_iter().flatten() {
            match slots.get(&result.node_id) {
                Some(&slot) => merged[slot].contributing_results.push(result),
                None => {
                    slots.insert(result.node_id.clone(), merged.len());
                    merged.push(MergedResult {
                        node_id: result.node_id.clone(),
                        fused_score: 0.0,
                        node: result.node.clone(),
                        contributing_results: vec![result],
                    });
                }
            }
        }

        for entry in &mut merged {
            entry.fused_score = self.fuse(&entry.contributing_results);
        }

        // `merged` is in discovery order, so a stable sort keeps it as the last key
        merged.sort_by(|a, b| {
            b.fused_score
                .partial_cmp(&a.fused_score)
                .unwrap_or(Ordering::Equal)
        });

        merged
    }

    /// Reduce contributing scores.
    ///
    /// Scores are reduced in a canonical order so the result does not depend
    /// on which retriever finished or was declared first.
    fn fuse(&self, contributions: &[RetrievalResult]) -> f64 {
        let mut scores: Vec<f64> = contributions.iter().map(|r| r.score as f64).collect();
        scores.sort_by(|a, b| b.total_cmp(a));

        match self {
            Combinator::Sum => scores.iter().sum(),
            Combinator::Max => scores.first().copied().unwrap_or(0.0),
            Combinator::Concat => scores.iter().sum(),
        }
    }
}

impl std::str::FromStr for Combinator {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sum" => Ok(Combinator::Sum),
            "max" => Ok(Combinator::Max),
            "concat" => Ok(Combinator::Concat),
            other => Err(crate::Error::Configuration(format!(
                "unknown combinator '{}'",
                other
            ))),
        }
    }
}

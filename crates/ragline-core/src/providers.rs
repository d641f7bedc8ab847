//! Capability traits for the external collaborators of the query engine

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Metadata, Result};

/// Turns text into a dense vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    fn model_id(&self) -> &str;
}

/// Scores a tokenized node against a tokenized query.
///
/// Implementations carry whatever corpus statistics they need; the scorer is
/// fitted to one node group before use.
pub trait LexicalScorer: Send + Sync {
    fn score(&self, query_tokens: &[String], node_tokens: &[String]) -> f32;
}

/// The derivations a [`TransformProvider`] knows how to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Summary,
    Keywords,
    QaPairs,
}

impl TransformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformKind::Summary => "summary",
            TransformKind::Keywords => "keywords",
            TransformKind::QaPairs => "qa",
        }
    }
}

/// A node produced by a transform before it is assigned an id and lineage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDraft {
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NodeDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Metadata::new(),
        }
    }
}

/// Output of a single transform invocation on one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransformOutput {
    /// Plain texts; children inherit the parent's metadata
    Texts(Vec<String>),
    /// Full nodes carrying their own metadata
    Nodes(Vec<NodeDraft>),
}

impl TransformOutput {
    pub fn into_drafts(self) -> Vec<NodeDraft> {
        match self {
            TransformOutput::Texts(texts) => texts.into_iter().map(NodeDraft::new).collect(),
            TransformOutput::Nodes(drafts) => drafts,
        }
    }
}

/// Text-processing service used to derive summary, keyword and QA-pair groups.
///
/// Must be idempotent on a fixed input: a transform may be re-invoked on retry.
#[async_trait]
pub trait TransformProvider: Send + Sync {
    async fn transform(&self, kind: TransformKind, text: &str) -> Result<TransformOutput>;
}

/// Cross-encoder style relevance model used by the reranker
#[async_trait]
pub trait RelevanceModel: Send + Sync {
    /// One relevance score per document, in input order
    async fn relevance(&self, query: &str, documents: &[String]) -> Result<Vec<f32>>;

    fn model_id(&self) -> &str;
}

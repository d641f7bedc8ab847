//! Retrieval-augmented generation building blocks for ragline
//!
//! A [`NodeStore`] holds the ingested corpus as a root group and any number
//! of derived node groups, each produced by a [`Transform`] and materialized
//! once on first use. [`Retriever`]s score one group under a
//! [`RetrievalStrategy`]; a [`FanoutExecutor`] runs several of them
//! concurrently and fuses their results, and a [`Reranker`] picks the final
//! context for the [`Generator`]. Every stage implements
//! [`ragline_pipeline::Stage`] so the pieces compose into a pipeline.

mod bm25;
mod fanout;
mod generator;
mod local;
mod reranker;
mod retriever;
mod similarity;
mod splitter;
mod store;
mod transform;


pub use bm25::{Bm25Params, Bm25Scorer, Tokenizer};
pub use fanout::FanoutExecutor;
pub use generator::{
    CONTEXT_KEY, DEFAULT_INSTRUCTION, Generator, Prompt, Prompter, QUERY_KEY, context_formatter,
};
pub use local::{ExtractiveGenerator, HashEmbedding, LexicalRelevance, term_overlap};
pub use reranker::{Context, DEFAULT_JOIN_DELIMITER, JoinMode, OutputFormat, RankedNode, Reranker};
pub use retriever::{DEFAULT_TOP_K, Retriever};
pub use similarity::{
    Bm25Similarity, CosineSimilarity, RetrievalStrategy, cosine_similarity, strategy_from_name,
};
pub use splitter::SentenceSplitter;
pub use store::{BUILTIN_GROUPS, GroupNodes, NodeGroup, NodeStore};
pub use transform::{CustomFn, Transform, TransformSpec, child_id};

// Re-export core types for convenience
pub use ragline_core::{
    Combinator, EmbeddingProvider, Error, FanoutPolicy, LLMProvider, MergedResult, Node,
    RawDocument, RelevanceModel, Result, RetrievalResult, ROOT_GROUP, TransformProvider,
};

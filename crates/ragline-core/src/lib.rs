//! Core traits and types for ragline
//!
//! This crate defines the fundamental types shared across the query engine:
//! corpus nodes, ranked retrieval results and their fusion, the error taxonomy,
//! and the narrow capability traits for the external collaborators (embedding,
//! lexical scoring, generation, transforms, relevance models).

pub mod error;
pub mod fanout;
pub mod llm;
pub mod node;
pub mod providers;
pub mod retrieval;
pub mod types;


pub use error::{Error, Result};
pub use fanout::{FanoutPolicy, gather};
pub use llm::{GenerationConfig, GenerationResult, LLMProvider};
pub use node::{Metadata, Node, RawDocument, ROOT_GROUP};
pub use providers::{
    EmbeddingProvider, LexicalScorer, NodeDraft, RelevanceModel, TransformKind,
    TransformOutput, TransformProvider,
};
pub use retrieval::{Combinator, MergedResult, RetrievalResult};
pub use types::RetryConfig;

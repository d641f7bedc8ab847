//! Online providers for ragline
//!
//! HTTP clients for an OpenAI-compatible service implementing the generation,
//! embedding and relevance traits, plus an LLM-backed transform provider.

mod client;
mod config;
mod parser;

#[cfg(test)]
mod tests;

pub use client::OnlineClient;
pub use config::{
    DEFAULT_API_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBED_MODEL, DEFAULT_RERANK_MODEL, OnlineConfig,
};
pub use parser::{Language, LlmParser, parse_keywords, parse_qa_pairs};

// Re-export core types for convenience
pub use ragline_core::{
    EmbeddingProvider, Error, GenerationConfig, GenerationResult, LLMProvider, RelevanceModel,
    Result, TransformProvider,
};

//! Local providers that need no network access

use async_trait::async_trait;
use std::collections::HashSet;

use ragline_core::{
    EmbeddingProvider, GenerationConfig, GenerationResult, LLMProvider, RelevanceModel, Result,
};

use crate::Tokenizer;

/// Hashed bag-of-words embeddings
pub struct HashEmbedding {
    dimensions: usize,
    tokenizer: Tokenizer,
}

impl HashEmbedding {
    pub fn new(dimensions: usize, tokenizer: Tokenizer) -> Self {
        Self {
            dimensions: dimensions.max(1),
            tokenizer,
        }
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(256, Tokenizer::Chinese)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in self.tokenizer.tokenize(text) {
            let digest = md5::compute(token.as_bytes());
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dimensions;
            let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn model_id(&self) -> &str {
        "local-hash"
    }
}

/// Fraction of the query's terms found in the text
pub fn term_overlap(tokenizer: Tokenizer, query: &str, text: &str) -> f32 {
    let query_terms: HashSet<String> = tokenizer.tokenize(query).into_iter().collect();
    if query_terms.is_empty() {
        return 0.0;
    }
    let text_terms: HashSet<String> = tokenizer.tokenize(text).into_iter().collect();
    let matches = query_terms.intersection(&text_terms).count();
    matches as f32 / query_terms.len() as f32
}

/// Relevance by query term overlap
pub struct LexicalRelevance {
    tokenizer: Tokenizer,
}

impl LexicalRelevance {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }
}

#[async_trait]
impl RelevanceModel for LexicalRelevance {
    async fn relevance(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        Ok(documents
            .iter()
            .map(|document| term_overlap(self.tokenizer, query, document))
            .collect())
    }

    fn model_id(&self) -> &str {
        "local-lexical"
    }
}

/// Answers with the context line that best overlaps the question.
///
/// Reads the context from the system prompt, one candidate per line.
pub struct ExtractiveGenerator {
    tokenizer: Tokenizer,
}

impl ExtractiveGenerator {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }
}

#[async_trait]
impl LLMProvider for ExtractiveGenerator {
    async fn generate_with_config(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<GenerationResult> {
        let system = config.system_prompt.as_deref().unwrap_or_default();
        let context = system.split_once("### ").map(|(_, rest)| rest).unwrap_or_default();

        let best = context
            .lines()
            .skip(1)
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| (term_overlap(self.tokenizer, prompt, line), line))
            .fold(None::<(f32, &str)>, |best, candidate| match best {
                Some(current) if current.0 >= candidate.0 => Some(current),
                _ => Some(candidate),
            });

        let text = match best {
            Some((score, line)) if score > 0.0 => line.to_string(),
            _ => "I could not find an answer in the provided context.".to_string(),
        };

        Ok(GenerationResult {
            text,
            model_id: self.model_id().to_string(),
            tokens_used: None,
        })
    }

    fn model_id(&self) -> &str {
        "local-extractive"
    }
}

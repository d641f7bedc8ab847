//! BM25 lexical scoring with locale-aware tokenization
//!
//! score(q, d) = Σ IDF(t) · TF(t,d)·(k1 + 1) / (TF(t,d) + k1·(1 − b + b·|d|/avgdl))
//!
//! with IDF(t) = ln((N − df + 0.5) / (df + 0.5) + 1), which stays positive for
//! terms present in every document.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use ragline_core::LexicalScorer;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("word pattern is valid"));

const ENGLISH_STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "in", "is", "it", "of", "on", "or",
    "the", "to", "was", "with",
];

/// How text is cut into terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tokenizer {
    /// Lowercased alphanumeric words, common stopwords removed
    English,
    /// Each CJK character is a term; runs of other letters and digits stay whole
    Chinese,
}

impl Tokenizer {
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        match self {
            Tokenizer::English => WORD
                .find_iter(text)
                .map(|m| m.as_str().to_lowercase())
                .filter(|word| !ENGLISH_STOPWORDS.contains(&word.as_str()))
                .collect(),
            Tokenizer::Chinese => {
                let mut tokens = Vec::new();
                for word in WORD.find_iter(text) {
                    let mut run = String::new();
                    for c in word.as_str().chars() {
                        if is_cjk(c) {
                            if !run.is_empty() {
                                tokens.push(std::mem::take(&mut run).to_lowercase());
                            }
                            tokens.push(c.to_string());
                        } else {
                            run.push(c);
                        }
                    }
                    if !run.is_empty() {
                        tokens.push(run.to_lowercase());
                    }
                }
                tokens
            }
        }
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{20000}'..='\u{2A6DF}')
}

/// BM25 tuning parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term frequency saturation
    pub k1: f32,
    /// Length normalization
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

/// Corpus statistics of one node group
#[derive(Debug, Clone)]
pub struct Bm25Scorer {
    params: Bm25Params,
    doc_freq: HashMap<String, usize>,
    total_docs: usize,
    avg_doc_len: f32,
}

impl Bm25Scorer {
    pub fn fit(documents: &[Vec<String>], params: Bm25Params) -> Self {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0;

        for tokens in documents {
            total_len += tokens.len();
            let unique: HashSet<&String> = tokens.iter().collect();
            for term in unique {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }

        let total_docs = documents.len();
        let avg_doc_len = if total_docs > 0 {
            total_len as f32 / total_docs as f32
        } else {
            0.0
        };

        Self {
            params,
            doc_freq,
            total_docs,
            avg_doc_len,
        }
    }

    pub fn idf(&self, term: &str) -> f32 {
        let n = self.total_docs as f32;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }
}

impl LexicalScorer for Bm25Scorer {
    fn score(&self, query_tokens: &[String], node_tokens: &[String]) -> f32 {
        if node_tokens.is_empty() || self.avg_doc_len == 0.0 {
            return 0.0;
        }

        let mut tf: HashMap<&str, f32> = HashMap::new();
        for token in node_tokens {
            *tf.entry(token.as_str()).or_insert(0.0) += 1.0;
        }

        let Bm25Params { k1, b } = self.params;
        let dl = node_tokens.len() as f32;
        let mut seen = HashSet::new();
        let mut score = 0.0;

        for term in query_tokens {
            if !seen.insert(term.as_str()) {
                continue;
            }
            let Some(&term_tf) = tf.get(term.as_str()) else {
                continue;
            };
            let numerator = term_tf * (k1 + 1.0);
            let denominator = term_tf + k1 * (1.0 - b + b * dl / self.avg_doc_len);
            score += self.idf(term) * numerator / denominator;
        }

        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(tokenizer: Tokenizer, texts: &[&str]) -> Vec<Vec<String>> {
        texts.iter().map(|t| tokenizer.tokenize(t)).collect()
    }

    #[test]
    fn test_english_tokenizer() {
        assert_eq!(
            Tokenizer::English.tokenize("The Borrow-Checker is strict, in Rust 2024!"),
            vec!["borrow", "checker", "strict", "rust", "2024"]
        );
    }

    #[test]
    fn test_chinese_tokenizer_splits_characters_keeps_ascii_words() {
        assert_eq!(
            Tokenizer::Chinese.tokenize("何为天道？Rust语言"),
            vec!["何", "为", "天", "道", "rust", "语", "言"]
        );
    }

    #[test]
    fn test_matching_document_scores_higher() {
        let docs = tokens(
            Tokenizer::English,
            &["rust ownership rules", "python garbage collector", "rust async runtime"],
        );
        let scorer = Bm25Scorer::fit(&docs, Bm25Params::default());
        let query = Tokenizer::English.tokenize("rust ownership");

        let scores: Vec<f32> = docs.iter().map(|d| scorer.score(&query, d)).collect();
        assert!(scores[0] > scores[2]);
        assert!(scores[2] > 0.0);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn test_rare_terms_weigh_more() {
        let docs = tokens(Tokenizer::English, &["rust tokio", "rust serde", "rust clap"]);
        let scorer = Bm25Scorer::fit(&docs, Bm25Params::default());
        assert!(scorer.idf("tokio") > scorer.idf("rust"));
        assert!(scorer.idf("rust") > 0.0);
    }

    #[test]
    fn test_repeated_query_terms_count_once() {
        let docs = tokens(Tokenizer::English, &["rust tokio", "serde"]);
        let scorer = Bm25Scorer::fit(&docs, Bm25Params::default());
        let once = scorer.score(&["rust".to_string()], &docs[0]);
        let twice = scorer.score(&["rust".to_string(), "rust".to_string()], &docs[0]);
        assert_eq!(once, twice);
    }
}

//! Sentence-aware chunking

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use ragline_core::{Error, Result};

static SENTENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s).+?(?:[.!?;。！？；]+\s*|\n+|$)").expect("sentence pattern is valid")
});

/// Packs whole sentences into chunks of at most `chunk_size` characters.
///
/// Consecutive chunks share trailing sentences totalling at most
/// `chunk_overlap` characters. A single sentence longer than `chunk_size` is
/// cut into fixed windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl SentenceSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Configuration(
                "splitter chunk_size must be positive".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::Configuration(format!(
                "splitter chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        for sentence in SENTENCE.find_iter(text).map(|m| m.as_str()) {
            if sentence.trim().is_empty() {
                continue;
            }
            if char_len(sentence) > self.chunk_size {
                pieces.extend(self.windows(sentence));
            } else {
                pieces.push(sentence.to_string());
            }
        }

        let mut chunks = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_len = 0;

        for piece in pieces {
            let piece_len = char_len(&piece);
            if current_len + piece_len > self.chunk_size && !current.is_empty() {
                chunks.push(current.concat());

                let mut carried: Vec<String> = Vec::new();
                let mut carried_len = 0;
                for previous in current.iter().rev() {
                    let len = char_len(previous);
                    if carried_len + len > self.chunk_overlap {
                        break;
                    }
                    carried_len += len;
                    carried.push(previous.clone());
                }
                carried.reverse();

                while !carried.is_empty() && carried_len + piece_len > self.chunk_size {
                    let dropped = carried.remove(0);
                    carried_len -= char_len(&dropped);
                }

                current = carried;
                current_len = carried_len;
            }
            current_len += piece_len;
            current.push(piece);
        }
        if !current.is_empty() {
            chunks.push(current.concat());
        }

        chunks
            .into_iter()
            .map(|chunk| chunk.trim().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    /// Fixed character windows with overlap, for sentences that do not fit
    fn windows(&self, content: &str) -> Vec<String> {
        let mut windows = Vec::new();
        let chars: Vec<char> = content.chars().collect();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            windows.push(chars[start..end].iter().collect());

            if end >= chars.len() {
                break;
            }

            start = end - self.chunk_overlap;
        }

        windows
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

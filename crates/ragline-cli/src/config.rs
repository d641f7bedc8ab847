//! Pipeline configuration file

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use ragline_core::{Combinator, Error, FanoutPolicy, Result};
use ragline_online::Language;
use ragline_rag::{DEFAULT_INSTRUCTION, JoinMode, OutputFormat};

/// How a node group derives its nodes from its parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transform", rename_all = "snake_case")]
pub enum TransformConfig {
    SentenceSplitter {
        chunk_size: usize,
        chunk_overlap: usize,
    },
    Summary,
    Keywords,
    Qa,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(flatten)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub trans_node: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverConfig {
    pub name: String,
    pub group: String,
    pub similarity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cutoff: Option<f32>,
    #[serde(default = "default_top_k")]
    pub topk: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

fn default_top_k() -> usize {
    ragline_rag::DEFAULT_TOP_K
}

/// `join = true`, `join = false` or `join = "<delimiter>"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JoinConfig {
    Flag(bool),
    Delimiter(String),
}

impl From<JoinConfig> for JoinMode {
    fn from(join: JoinConfig) -> Self {
        match join {
            JoinConfig::Flag(flag) => JoinMode::from(flag),
            JoinConfig::Delimiter(delimiter) => JoinMode::Delimiter(delimiter),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankerConfig {
    pub topk: usize,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default = "default_join")]
    pub join: JoinConfig,
}

fn default_join() -> JoinConfig {
    JoinConfig::Flag(false)
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            topk: 1,
            output_format: OutputFormat::Content,
            join: JoinConfig::Flag(true),
        }
    }
}

/// Shape of the question-answering pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default)]
    pub combinator: Combinator,
    #[serde(default)]
    pub policy: FanoutPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
    /// Prompt language for LLM-backed transforms
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    pub retrievers: Vec<RetrieverConfig>,
    #[serde(default)]
    pub reranker: RerankerConfig,
}

fn default_system_prompt() -> String {
    DEFAULT_INSTRUCTION.to_string()
}

impl Default for PipelineConfig {
    /// Sentence-level cosine retrieval alongside Chinese BM25 over coarse
    /// chunks, summed, reranked down to one joined context
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            combinator: Combinator::Sum,
            policy: FanoutPolicy::Strict,
            deadline_secs: None,
            language: Language::Zh,
            groups: vec![GroupConfig {
                name: "sentences".to_string(),
                parent: None,
                transform: TransformConfig::SentenceSplitter {
                    chunk_size: 1024,
                    chunk_overlap: 100,
                },
                trans_node: false,
            }],
            retrievers: vec![
                RetrieverConfig {
                    name: "retriever1".to_string(),
                    group: "sentences".to_string(),
                    similarity: "cosine".to_string(),
                    cutoff: Some(0.003),
                    topk: 3,
                    target: None,
                },
                RetrieverConfig {
                    name: "retriever2".to_string(),
                    group: "CoarseChunk".to_string(),
                    similarity: "bm25_chinese".to_string(),
                    cutoff: Some(0.003),
                    topk: 3,
                    target: None,
                },
            ],
            reranker: RerankerConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| Error::Configuration(format!("invalid pipeline config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    /// Structural checks that do not need the corpus
    pub fn validate(&self) -> Result<()> {
        if self.retrievers.is_empty() {
            return Err(Error::Configuration(
                "pipeline config declares no retrievers".to_string(),
            ));
        }

        let mut names = std::collections::HashSet::new();
        for retriever in &self.retrievers {
            if !names.insert(retriever.name.as_str()) {
                return Err(Error::Configuration(format!(
                    "duplicate retriever name '{}'",
                    retriever.name
                )));
            }
        }

        if self.deadline_secs == Some(0) {
            return Err(Error::Configuration(
                "deadline_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

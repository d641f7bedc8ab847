//! LLM-backed node transforms: summaries, keywords and question/answer pairs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use ragline_core::{
    Error, GenerationConfig, LLMProvider, NodeDraft, Result, TransformKind, TransformOutput,
    TransformProvider,
};

/// Prompt language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Zh,
    En,
}

/// Derives nodes by asking a chat model to summarise, extract keywords from,
/// or write question/answer pairs about each parent node
pub struct LlmParser {
    llm: Arc<dyn LLMProvider>,
    language: Language,
    config: GenerationConfig,
}

impl LlmParser {
    pub fn new(llm: Arc<dyn LLMProvider>, language: Language) -> Self {
        let config = GenerationConfig {
            model_id: llm.model_id().to_string(),
            temperature: Some(0.0),
            ..Default::default()
        };
        Self {
            llm,
            language,
            config,
        }
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn instruction(&self, kind: TransformKind) -> &'static str {
        match (self.language, kind) {
            (Language::Zh, TransformKind::Summary) => {
                "请为下面的文本写一段简洁的摘要，只输出摘要内容。"
            }
            (Language::Zh, TransformKind::Keywords) => {
                "请从下面的文本中提取最多五个关键词，用逗号分隔，只输出关键词。"
            }
            (Language::Zh, TransformKind::QaPairs) => {
                "请根据下面的文本生成若干问答对，每个问题以\"Q:\"开头，每个答案以\"A:\"开头，各占一行。"
            }
            (Language::En, TransformKind::Summary) => {
                "Write a concise summary of the following text. Output only the summary."
            }
            (Language::En, TransformKind::Keywords) => {
                "Extract at most five keywords from the following text, separated by commas. Output only the keywords."
            }
            (Language::En, TransformKind::QaPairs) => {
                "Write question and answer pairs about the following text. Start each question with \"Q:\" and each answer with \"A:\", one per line."
            }
        }
    }
}

/// Splits a keyword answer on ASCII and CJK separators
pub fn parse_keywords(answer: &str) -> Vec<String> {
    answer
        .split(|c: char| matches!(c, ',' | '，' | '、' | ';' | '；' | '\n'))
        .map(|k| k.trim().trim_matches(|c: char| c == '-' || c == '*').trim())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Pairs up `Q:`/`A:` lines; a question without an answer is dropped
pub fn parse_qa_pairs(answer: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut question: Option<String> = None;

    for line in answer.lines().map(str::trim) {
        if let Some(q) = strip_label(line, &["Q:", "Q：", "问:", "问："]) {
            question = Some(q.to_string());
        } else if let Some(a) = strip_label(line, &["A:", "A：", "答:", "答："]) {
            if let Some(q) = question.take() {
                if !q.is_empty() && !a.is_empty() {
                    pairs.push((q, a.to_string()));
                }
            }
        }
    }
    pairs
}

fn strip_label<'a>(line: &'a str, labels: &[&str]) -> Option<&'a str> {
    labels
        .iter()
        .find_map(|label| line.strip_prefix(label))
        .map(str::trim)
}

#[async_trait]
impl TransformProvider for LlmParser {
    async fn transform(&self, kind: TransformKind, text: &str) -> Result<TransformOutput> {
        let config = GenerationConfig {
            system_prompt: Some(self.instruction(kind).to_string()),
            ..self.config.clone()
        };
        let answer = self
            .llm
            .generate_with_config(text, &config)
            .await
            .map_err(|e| match e {
                Error::Network(_) | Error::Timeout(_) | Error::Authentication(_) => e,
                other => Error::Transform(other.to_string()),
            })?
            .text;

        debug!(kind = kind.as_str(), chars = answer.len(), "transform answered");

        Ok(match kind {
            TransformKind::Summary => {
                let mut draft = NodeDraft::new(answer.trim());
                draft.metadata.insert("kind".to_string(), json!("summary"));
                TransformOutput::Nodes(vec![draft])
            }
            TransformKind::Keywords => {
                let keywords = parse_keywords(&answer);
                if keywords.is_empty() {
                    return Ok(TransformOutput::Nodes(Vec::new()));
                }
                let mut draft = NodeDraft::new(keywords.join(", "));
                draft.metadata.insert("kind".to_string(), json!("keywords"));
                draft.metadata.insert("keywords".to_string(), json!(keywords));
                TransformOutput::Nodes(vec![draft])
            }
            TransformKind::QaPairs => TransformOutput::Nodes(
                parse_qa_pairs(&answer)
                    .into_iter()
                    .map(|(question, answer)| {
                        let mut draft = NodeDraft::new(question);
                        draft.metadata.insert("kind".to_string(), json!("qa"));
                        draft.metadata.insert("answer".to_string(), json!(answer));
                        draft
                    })
                    .collect(),
            ),
        })
    }
}

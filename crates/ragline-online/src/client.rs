//! OpenAI-compatible HTTP client

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, warn};

use ragline_core::{
    EmbeddingProvider, Error, GenerationConfig, GenerationResult, LLMProvider, RelevanceModel,
    Result,
};

use crate::config::OnlineConfig;

/// Client for a chat/embedding/rerank service speaking the OpenAI wire format
pub struct OnlineClient {
    config: OnlineConfig,
    client: Client,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: Option<u32>,
}

#[derive(Deserialize, Default)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: MessageContent,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: MessageContent,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<Usage>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
    return_documents: bool,
}

#[derive(Deserialize)]
struct RerankItem {
    index: usize,
    relevance_score: f32,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankItem>,
}

impl OnlineClient {
    /// Create a new client from configuration
    pub fn new(config: OnlineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Create a new client from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OnlineConfig::from_env()?)
    }

    pub fn config(&self) -> &OnlineConfig {
        &self.config
    }

    async fn send<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        let url = self.config.endpoint(path);
        debug!(%url, "posting request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &text));
        }
        Ok(response)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String> {
        self.send(path, body)
            .await?
            .text()
            .await
            .map_err(transport_error)
    }

    async fn perform_chat(&self, prompt: &str, config: &GenerationConfig) -> Result<GenerationResult> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = config.system_prompt.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model: &config.model_id,
            messages,
            stream: config.stream,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        };
        let (text, tokens_used) = if config.stream {
            let response = self.send("chat/completions", &request).await?;
            read_sse(response.bytes_stream().map(|chunk| chunk.map_err(transport_error))).await?
        } else {
            parse_chat(&self.post("chat/completions", &request).await?)?
        };

        if text.trim().is_empty() {
            return Err(Error::Generation(format!(
                "empty response from {}",
                config.model_id
            )));
        }

        Ok(GenerationResult {
            text: text.trim().to_string(),
            model_id: config.model_id.clone(),
            tokens_used,
        })
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Network(e.to_string())
    }
}

/// Maps an HTTP failure onto the error taxonomy; throttling and server
/// faults stay retryable
pub(crate) fn status_error(status: StatusCode, body: &str) -> Error {
    let message = format!("request failed with status {}: {}", status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Authentication(message),
        StatusCode::TOO_MANY_REQUESTS => Error::Network(message),
        s if s.is_server_error() => Error::Network(message),
        _ => Error::InvalidInput(message),
    }
}

/// Reads a non-streaming chat completion
pub(crate) fn parse_chat(body: &str) -> Result<(String, Option<u32>)> {
    let response: ChatResponse = serde_json::from_str(body)?;
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();
    Ok((text, response.usage.and_then(|u| u.total_tokens)))
}

/// Concatenated deltas of a Server-Sent Events chat stream
#[derive(Default)]
pub(crate) struct SseAnswer {
    answer: String,
    tokens: Option<u32>,
    parsed_any: bool,
}

impl SseAnswer {
    /// Feeds one line of the stream. Returns true once `[DONE]` arrives.
    pub(crate) fn push_line(&mut self, line: &str) -> bool {
        let Some(data) = line.strip_prefix("data:") else {
            return false;
        };
        let data = data.trim();
        if data.is_empty() {
            return false;
        }
        if data == "[DONE]" {
            return true;
        }

        match serde_json::from_str::<ChatChunk>(data) {
            Ok(chunk) => {
                self.parsed_any = true;
                for choice in chunk.choices {
                    if let Some(content) = choice.delta.content {
                        self.answer.push_str(&content);
                    }
                }
                if let Some(total) = chunk.usage.and_then(|u| u.total_tokens) {
                    self.tokens = Some(total);
                }
            }
            Err(e) => warn!(line = data, error = %e, "skipping unparseable stream chunk"),
        }
        false
    }

    pub(crate) fn finish(self) -> Result<(String, Option<u32>)> {
        if !self.parsed_any {
            return Err(Error::Serialization(
                "stream contained no data events".to_string(),
            ));
        }
        Ok((self.answer, self.tokens))
    }
}

/// Reads an event stream chunk by chunk as it arrives. Lines, and the
/// characters in them, may be split across chunks.
pub(crate) async fn read_sse<S, B>(stream: S) -> Result<(String, Option<u32>)>
where
    S: Stream<Item = Result<B>>,
    B: AsRef<[u8]>,
{
    let mut stream = std::pin::pin!(stream);
    let mut sse = SseAnswer::default();
    let mut pending: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        pending.extend_from_slice(chunk?.as_ref());
        while let Some(end) = pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = pending.drain(..=end).collect();
            if sse.push_line(&String::from_utf8_lossy(&line)) {
                return sse.finish();
            }
        }
    }

    if !pending.is_empty() {
        sse.push_line(&String::from_utf8_lossy(&pending));
    }
    sse.finish()
}

/// Orders embeddings by their reported index
pub(crate) fn parse_embeddings(body: &str, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut response: EmbeddingResponse = serde_json::from_str(body)?;
    if response.data.len() != expected {
        return Err(Error::Serialization(format!(
            "expected {} embeddings, got {}",
            expected,
            response.data.len()
        )));
    }
    response.data.sort_by_key(|d| d.index);
    Ok(response.data.into_iter().map(|d| d.embedding).collect())
}

/// Scatters rerank results back into document order; unreported documents score zero
pub(crate) fn parse_rerank(body: &str, documents: usize) -> Result<Vec<f32>> {
    let response: RerankResponse = serde_json::from_str(body)?;
    let mut scores = vec![0.0; documents];
    for item in response.results {
        let slot = scores.get_mut(item.index).ok_or_else(|| {
            Error::Serialization(format!(
                "rerank index {} out of range for {} documents",
                item.index, documents
            ))
        })?;
        *slot = item.relevance_score;
    }
    Ok(scores)
}

#[async_trait]
impl LLMProvider for OnlineClient {
    async fn generate(&self, prompt: &str) -> Result<GenerationResult> {
        let config = GenerationConfig {
            model_id: self.config.chat_model.clone(),
            stream: self.config.stream,
            timeout: self.config.timeout,
            ..Default::default()
        };
        self.generate_with_config(prompt, &config).await
    }

    async fn generate_with_config(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<GenerationResult> {
        match timeout(config.timeout, self.perform_chat(prompt, config)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{} did not answer within {:?}",
                config.model_id, config.timeout
            ))),
        }
    }

    fn model_id(&self) -> &str {
        &self.config.chat_model
    }
}

#[async_trait]
impl EmbeddingProvider for OnlineClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::Serialization("embedding response was empty".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingRequest {
            model: &self.config.embed_model,
            input: texts,
        };
        let body = self.post("embeddings", &request).await?;
        parse_embeddings(&body, texts.len())
    }

    fn model_id(&self) -> &str {
        &self.config.embed_model
    }
}

#[async_trait]
impl RelevanceModel for OnlineClient {
    async fn relevance(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let request = RerankRequest {
            model: &self.config.rerank_model,
            query,
            documents,
            top_n: documents.len(),
            return_documents: false,
        };
        let body = self.post("rerank", &request).await?;
        parse_rerank(&body, documents.len())
    }

    fn model_id(&self) -> &str {
        &self.config.rerank_model
    }
}

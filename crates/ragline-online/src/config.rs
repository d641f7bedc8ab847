//! Online provider configuration

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use url::Url;

use ragline_core::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://open.bigmodel.cn/api/paas/v4";
pub const DEFAULT_CHAT_MODEL: &str = "glm-4";
pub const DEFAULT_EMBED_MODEL: &str = "embedding-2";
pub const DEFAULT_RERANK_MODEL: &str = "rerank";

/// Configuration for the online chat, embedding and rerank clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineConfig {
    pub api_key: String,
    pub api_url: String,
    pub chat_model: String,
    pub embed_model: String,
    pub rerank_model: String,
    pub stream: bool,
    pub timeout: Duration,
}

impl OnlineConfig {
    /// Create configuration from environment variables, reading `.env` first
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = ["RAGLINE_API_KEY", "GLM_API_KEY", "API_KEY"]
            .iter()
            .find_map(|key| lookup(key).filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                Error::Configuration(
                    "RAGLINE_API_KEY, GLM_API_KEY or API_KEY environment variable not found"
                        .to_string(),
                )
            })?;

        let api_url = lookup("RAGLINE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Url::parse(&api_url)
            .map_err(|e| Error::Configuration(format!("invalid RAGLINE_API_URL '{}': {}", api_url, e)))?;

        let stream = match lookup("RAGLINE_STREAM").as_deref().map(str::trim) {
            None | Some("") => false,
            Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => true,
            Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => false,
            Some(other) => {
                return Err(Error::Configuration(format!(
                    "RAGLINE_STREAM must be true or false, got '{}'",
                    other
                )));
            }
        };

        Ok(Self {
            api_key,
            api_url,
            chat_model: lookup("RAGLINE_CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            embed_model: lookup("RAGLINE_EMBED_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBED_MODEL.to_string()),
            rerank_model: lookup("RAGLINE_RERANK_MODEL")
                .unwrap_or_else(|| DEFAULT_RERANK_MODEL.to_string()),
            stream,
            timeout: Duration::from_secs(60),
        })
    }

    /// Create configuration with an explicit key and the default endpoint
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            rerank_model: DEFAULT_RERANK_MODEL.to_string(),
            stream: false,
            timeout: Duration::from_secs(60),
        }
    }

    /// Endpoint URL for an API path such as `chat/completions`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url.trim_end_matches('/'), path)
    }
}

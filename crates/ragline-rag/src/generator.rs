//! Prompt rendering and answer generation

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use ragline_core::{Error, GenerationConfig, LLMProvider, Result};
use ragline_pipeline::{BoundArgs, Stage, Value, stage_fn};

pub const DEFAULT_INSTRUCTION: &str = "You will play the role of an AI Q&A assistant and complete a dialogue task. \
In this task, you need to provide your answer based on the given context and question.";

/// Key under which the reranked context reaches the prompter
pub const CONTEXT_KEY: &str = "context_str";

/// Key holding the user's question
pub const QUERY_KEY: &str = "query";

/// A rendered chat turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Renders a fixed instruction plus named extra values into a system prompt,
/// with the query as the user turn
#[derive(Debug, Clone)]
pub struct Prompter {
    instruction: String,
    extra_keys: Vec<String>,
}

impl Default for Prompter {
    fn default() -> Self {
        Self::new(DEFAULT_INSTRUCTION)
    }
}

impl Prompter {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            extra_keys: vec![CONTEXT_KEY.to_string()],
        }
    }

    pub fn with_extra_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn render(&self, variables: &BTreeMap<String, Value>) -> Result<Prompt> {
        let user = variables
            .get(QUERY_KEY)
            .map(ToString::to_string)
            .ok_or_else(|| Error::Configuration(format!("prompt variable '{}' is missing", QUERY_KEY)))?;

        let mut system = self.instruction.clone();
        if !self.extra_keys.is_empty() {
            system.push_str("\n\nHere is some extra information you can refer to:\n");
        }
        for key in &self.extra_keys {
            let value = variables.get(key).ok_or_else(|| {
                Error::Configuration(format!("prompt variable '{}' is missing", key))
            })?;
            system.push_str(&format!("\n### {}:\n{}\n", key, value));
        }

        Ok(Prompt { system, user })
    }
}

/// Builds the prompter's variables from the current context and the bound `query`
pub fn context_formatter() -> impl Stage {
    stage_fn(|context: Value, args: &BoundArgs| {
        let query = args.require(QUERY_KEY)?.clone();
        Ok(Value::Map(BTreeMap::from([
            (CONTEXT_KEY.to_string(), context),
            (QUERY_KEY.to_string(), query),
        ])))
    })
}

/// Final stage: renders the prompt and asks the model for an answer
pub struct Generator {
    llm: Arc<dyn LLMProvider>,
    prompter: Prompter,
    config: GenerationConfig,
}

impl Generator {
    pub fn new(llm: Arc<dyn LLMProvider>, prompter: Prompter) -> Self {
        let config = GenerationConfig {
            model_id: llm.model_id().to_string(),
            ..Default::default()
        };
        Self {
            llm,
            prompter,
            config,
        }
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn generate(&self, variables: &BTreeMap<String, Value>) -> Result<String> {
        let prompt = self.prompter.render(variables)?;
        let config = GenerationConfig {
            system_prompt: Some(prompt.system),
            ..self.config.clone()
        };

        debug!(model = %config.model_id, stream = config.stream, "generating answer");
        let result = self
            .llm
            .generate_with_config(&prompt.user, &config)
            .await
            .map_err(|e| match e {
                Error::Generation(_) | Error::Timeout(_) | Error::Authentication(_) => e,
                other => Error::Generation(other.to_string()),
            })?;

        info!(model = %result.model_id, tokens = result.tokens_used, "answer generated");
        Ok(result.text)
    }
}

/// Accepts either a variables map or a bare query text
#[async_trait]
impl Stage for Generator {
    async fn call(&self, input: Value, _args: &BoundArgs) -> Result<Value> {
        let variables = match input {
            Value::Map(map) => map,
            Value::Text(query) => BTreeMap::from([
                (QUERY_KEY.to_string(), Value::Text(query)),
                (CONTEXT_KEY.to_string(), Value::Text(String::new())),
            ]),
            other => {
                return Err(Error::InvalidInput(format!(
                    "generator expects a map or text, got {}",
                    other.kind()
                )));
            }
        };
        Ok(Value::Text(self.generate(&variables).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::GenerationResult;
    use std::sync::Mutex;

    /// Records the prompt it was given and echoes the user turn
    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl LLMProvider for Recording {
        async fn generate_with_config(
            &self,
            prompt: &str,
            config: &GenerationConfig,
        ) -> Result<GenerationResult> {
            self.seen
                .lock()
                .unwrap()
                .push((prompt.to_string(), config.system_prompt.clone()));
            Ok(GenerationResult {
                text: format!("answer to {}", prompt),
                model_id: config.model_id.clone(),
                tokens_used: Some(7),
            })
        }

        fn model_id(&self) -> &str {
            "recording"
        }
    }

    struct Unavailable;

    #[async_trait]
    impl LLMProvider for Unavailable {
        async fn generate_with_config(
            &self,
            _prompt: &str,
            _config: &GenerationConfig,
        ) -> Result<GenerationResult> {
            Err(Error::Network("connection refused".to_string()))
        }

        fn model_id(&self) -> &str {
            "unavailable"
        }
    }

    fn variables(context: &str, query: &str) -> BTreeMap<String, Value> {
        BTreeMap::from([
            (CONTEXT_KEY.to_string(), Value::from(context)),
            (QUERY_KEY.to_string(), Value::from(query)),
        ])
    }

    #[test]
    fn test_render_places_context_in_system_prompt() {
        let prompt = Prompter::new("Answer briefly.")
            .render(&variables("Rust has no GC.", "Does Rust have a GC?"))
            .unwrap();

        assert_eq!(prompt.user, "Does Rust have a GC?");
        assert_eq!(
            prompt.system,
            "Answer briefly.\n\nHere is some extra information you can refer to:\n\n### context_str:\nRust has no GC.\n"
        );
    }

    #[test]
    fn test_missing_extra_key_is_configuration_error() {
        let mut vars = variables("ctx", "q");
        vars.remove(CONTEXT_KEY);
        assert!(matches!(
            Prompter::default().render(&vars),
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_formatter_pairs_context_with_bound_query() {
        let formatter = context_formatter();
        let args = BoundArgs::empty().with(QUERY_KEY, "why?");
        let output = formatter.call("ctx".into(), &args).await.unwrap();

        let map = output.into_map().unwrap();
        assert_eq!(map[CONTEXT_KEY].as_text(), Some("ctx"));
        assert_eq!(map[QUERY_KEY].as_text(), Some("why?"));
    }

    #[tokio::test]
    async fn test_generator_sends_system_prompt() {
        let llm = Arc::new(Recording::default());
        let generator = Generator::new(llm.clone(), Prompter::default());

        let output = generator
            .call(Value::Map(variables("ctx", "what?")), &BoundArgs::empty())
            .await
            .unwrap();

        assert_eq!(output.as_text(), Some("answer to what?"));
        let seen = llm.seen.lock().unwrap();
        assert!(seen[0].1.as_deref().unwrap().starts_with(DEFAULT_INSTRUCTION));
        assert!(seen[0].1.as_deref().unwrap().ends_with("### context_str:\nctx\n"));
    }

    #[tokio::test]
    async fn test_provider_failure_surfaces_as_generation_error() {
        let generator = Generator::new(Arc::new(Unavailable), Prompter::default());
        let err = generator
            .call(Value::Map(variables("ctx", "q")), &BoundArgs::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Generation(message) if message.contains("connection refused")));
    }
}

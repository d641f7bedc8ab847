//! Assembly of the node store and the question-answering pipeline

use std::sync::Arc;
use tracing::info;

use ragline_core::{
    EmbeddingProvider, GenerationConfig, LLMProvider, RawDocument, RelevanceModel, Result,
    TransformProvider,
};
use ragline_online::{LlmParser, OnlineClient};
use ragline_pipeline::{CaptureRef, Pipeline, StageExt};
use ragline_rag::{
    ExtractiveGenerator, FanoutExecutor, Generator, HashEmbedding, JoinMode, LexicalRelevance,
    NodeStore, Prompter, Reranker, Retriever, SentenceSplitter, Tokenizer, Transform,
    TransformSpec, context_formatter, strategy_from_name,
};

use crate::config::{GroupConfig, PipelineConfig, TransformConfig};

/// The external models a pipeline talks to
pub struct Providers {
    pub embedding: Arc<dyn EmbeddingProvider>,
    pub relevance: Arc<dyn RelevanceModel>,
    pub llm: Arc<dyn LLMProvider>,
    pub transforms: Option<Arc<dyn TransformProvider>>,
    pub generation: Option<GenerationConfig>,
}

impl Providers {
    /// Local stand-ins that need no credentials; LLM-backed groups are unavailable
    pub fn offline() -> Self {
        Self {
            embedding: Arc::new(HashEmbedding::default()),
            relevance: Arc::new(LexicalRelevance::new(Tokenizer::Chinese)),
            llm: Arc::new(ExtractiveGenerator::new(Tokenizer::Chinese)),
            transforms: None,
            generation: None,
        }
    }

    /// One client serves chat, embeddings, rerank and the LLM-backed transforms
    pub fn online(client: OnlineClient, config: &PipelineConfig) -> Self {
        let generation = GenerationConfig {
            model_id: client.config().chat_model.clone(),
            stream: client.config().stream,
            timeout: client.config().timeout,
            ..Default::default()
        };
        let client = Arc::new(client);
        let parser = LlmParser::new(client.clone(), config.language);

        Self {
            embedding: client.clone(),
            relevance: client.clone(),
            llm: client,
            transforms: Some(Arc::new(parser)),
            generation: Some(generation),
        }
    }
}

fn transform_spec(group: &GroupConfig) -> Result<TransformSpec> {
    let transform = match group.transform {
        TransformConfig::SentenceSplitter {
            chunk_size,
            chunk_overlap,
        } => Transform::Splitter(SentenceSplitter::new(chunk_size, chunk_overlap)?),
        TransformConfig::Summary => Transform::Summarizer,
        TransformConfig::Keywords => Transform::KeywordExtractor,
        TransformConfig::Qa => Transform::QAPairExtractor,
    };
    Ok(TransformSpec::new(transform).trans_node(group.trans_node))
}

/// Ingests the corpus and declares the configured node groups
pub fn build_store(
    config: &PipelineConfig,
    documents: Vec<RawDocument>,
    providers: &Providers,
) -> Result<Arc<NodeStore>> {
    let mut store = NodeStore::new(documents)?;
    if let Some(transforms) = &providers.transforms {
        store = store.with_transform_provider(transforms.clone());
    }

    for group in &config.groups {
        store.create_node_group(&group.name, group.parent.as_deref(), transform_spec(group)?)?;
    }
    Ok(Arc::new(store))
}

/// Fan-out retrieval, rerank, prompt formatting and generation, in that order
pub fn build_pipeline(
    config: &PipelineConfig,
    store: Arc<NodeStore>,
    providers: &Providers,
) -> Result<Pipeline> {
    let mut retrievers = Vec::with_capacity(config.retrievers.len());
    for spec in &config.retrievers {
        let strategy = strategy_from_name(&spec.similarity, Some(providers.embedding.clone()))?;
        let mut retriever = Retriever::new(&spec.name, store.clone(), &spec.group, strategy)?
            .with_top_k(spec.topk);
        if let Some(cutoff) = spec.cutoff {
            retriever = retriever.with_cutoff(cutoff);
        }
        if let Some(target) = &spec.target {
            retriever = retriever.with_target(target)?;
        }
        retrievers.push(Arc::new(retriever));
    }

    let fanout = FanoutExecutor::new(retrievers)
        .with_combinator(config.combinator)
        .with_policy(config.policy);

    let reranker = Reranker::new(providers.relevance.clone(), config.reranker.topk)
        .with_output_format(config.reranker.output_format)
        .with_join(JoinMode::from(config.reranker.join.clone()));

    let mut generator = Generator::new(
        providers.llm.clone(),
        Prompter::new(config.system_prompt.clone()),
    );
    if let Some(generation) = &providers.generation {
        generator = generator.with_config(generation.clone());
    }

    let mut builder = Pipeline::builder()
        .stage("prl", fanout)
        .stage("reranker", reranker.bind("query", CaptureRef::Input))
        .stage("formatter", context_formatter().bind("query", CaptureRef::Input))
        .stage("llm", generator);
    if let Some(deadline) = config.deadline() {
        builder = builder.deadline(deadline);
    }

    let pipeline = builder.build()?;
    info!(
        retrievers = config.retrievers.len(),
        combinator = ?config.combinator,
        policy = ?config.policy,
        "pipeline assembled"
    );
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrieverConfig;
    use ragline_core::Error;

    fn corpus() -> Vec<RawDocument> {
        vec![
            RawDocument::new("tiandao.txt", "天道酬勤，人道酬诚。"),
            RawDocument::new("tokio.txt", "Tokio schedules async tasks on a thread pool."),
            RawDocument::new("serde.txt", "Serde serializes Rust data structures."),
        ]
    }

    #[tokio::test]
    async fn test_default_pipeline_runs_offline() {
        let config = PipelineConfig::default();
        let providers = Providers::offline();
        let store = build_store(&config, corpus(), &providers).unwrap();
        let pipeline = build_pipeline(&config, store, &providers).unwrap();

        assert_eq!(pipeline.step_names(), vec!["prl", "reranker", "formatter", "llm"]);
        let answer = pipeline.invoke("何为天道").await.unwrap();
        assert_eq!(answer.to_string(), "天道酬勤，人道酬诚。");
    }

    #[tokio::test]
    async fn test_unknown_retriever_group_is_rejected() {
        let mut config = PipelineConfig::default();
        config.retrievers.push(RetrieverConfig {
            name: "missing".to_string(),
            group: "nowhere".to_string(),
            similarity: "bm25".to_string(),
            cutoff: None,
            topk: 3,
            target: None,
        });
        let providers = Providers::offline();
        let store = build_store(&config, corpus(), &providers).unwrap();

        assert!(matches!(
            build_pipeline(&config, store, &providers),
            Err(Error::UnknownGroup(group)) if group == "nowhere"
        ));
    }

    #[tokio::test]
    async fn test_llm_group_without_provider_fails_at_query_time() {
        let mut config = PipelineConfig::default();
        config.groups.push(GroupConfig {
            name: "doc_summary".to_string(),
            parent: None,
            transform: TransformConfig::Summary,
            trans_node: true,
        });
        config.retrievers = vec![RetrieverConfig {
            name: "summaries".to_string(),
            group: "doc_summary".to_string(),
            similarity: "bm25_chinese".to_string(),
            cutoff: None,
            topk: 3,
            target: None,
        }];
        let providers = Providers::offline();
        let store = build_store(&config, corpus(), &providers).unwrap();
        let pipeline = build_pipeline(&config, store, &providers).unwrap();

        assert!(matches!(
            pipeline.invoke("天道").await,
            Err(Error::Configuration(_))
        ));
    }
}

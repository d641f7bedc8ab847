//! Snapshot tests for the online providers

#[cfg(test)]
mod snapshot_tests {
    use crate::client::{parse_chat, parse_embeddings, parse_rerank, read_sse};
    use crate::{
        Error, GenerationConfig, GenerationResult, LLMProvider, Language, LlmParser, OnlineConfig,
        Result, TransformProvider,
    };
    use async_trait::async_trait;
    use insta::assert_yaml_snapshot;
    use ragline_core::{TransformKind, TransformOutput};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_snapshot() {
        let config =
            OnlineConfig::from_lookup(lookup(&[("GLM_API_KEY", "test-key"), ("RAGLINE_STREAM", "true")]))
                .unwrap();

        assert_yaml_snapshot!(config, @r###"
        api_key: test-key
        api_url: "https://open.bigmodel.cn/api/paas/v4"
        chat_model: glm-4
        embed_model: embedding-2
        rerank_model: rerank
        stream: true
        timeout:
          secs: 60
          nanos: 0
        "###);
    }

    #[test]
    fn test_config_prefers_ragline_key() {
        let config = OnlineConfig::from_lookup(lookup(&[
            ("RAGLINE_API_KEY", "primary"),
            ("API_KEY", "fallback"),
        ]))
        .unwrap();
        assert_eq!(config.api_key, "primary");
        assert_eq!(config.endpoint("embeddings"), "https://open.bigmodel.cn/api/paas/v4/embeddings");
    }

    #[test]
    fn test_config_errors() {
        assert!(matches!(
            OnlineConfig::from_lookup(lookup(&[])),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            OnlineConfig::from_lookup(lookup(&[("API_KEY", "k"), ("RAGLINE_API_URL", "not a url")])),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            OnlineConfig::from_lookup(lookup(&[("API_KEY", "k"), ("RAGLINE_STREAM", "maybe")])),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_chat_response_snapshot() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "天道酬勤。"}}],
            "usage": {"prompt_tokens": 20, "completion_tokens": 5, "total_tokens": 25}
        }"#;
        assert_yaml_snapshot!(parse_chat(body).unwrap(), @r###"
        - 天道酬勤。
        - 25
        "###);
    }

    #[tokio::test]
    async fn test_stream_response_snapshot() {
        let body = concat!(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"天道\"}}]}\n\n",
            "data: not-json\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"酬勤\"}}],\"usage\":{\"total_tokens\":9}}\n\n",
            "data: [DONE]\n\n",
        );
        let events = futures::stream::iter([Ok::<_, Error>(body.as_bytes())]);
        assert_yaml_snapshot!(read_sse(events).await.unwrap(), @r###"
        - 天道酬勤
        - 9
        "###);
    }

    #[test]
    fn test_embeddings_follow_reported_index() {
        let body = r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#;
        assert_yaml_snapshot!(parse_embeddings(body, 2).unwrap(), @r###"
        - - 1
          - 0
        - - 0
          - 1
        "###);
    }

    #[test]
    fn test_rerank_scores_in_document_order() {
        let body = r#"{"results":[{"index":2,"relevance_score":0.75},{"index":0,"relevance_score":0.5}]}"#;
        assert_yaml_snapshot!(parse_rerank(body, 3).unwrap(), @r###"
        - 0.5
        - 0
        - 0.75
        "###);
    }

    /// Answers with a canned reply per system instruction
    struct Canned(Vec<(&'static str, &'static str)>);

    #[async_trait]
    impl LLMProvider for Canned {
        async fn generate_with_config(
            &self,
            _prompt: &str,
            config: &GenerationConfig,
        ) -> Result<GenerationResult> {
            let system = config.system_prompt.as_deref().unwrap_or_default();
            let text = self
                .0
                .iter()
                .find(|(marker, _)| system.contains(marker))
                .map(|(_, reply)| reply.to_string())
                .ok_or_else(|| Error::Other("no canned reply".to_string()))?;
            Ok(GenerationResult {
                text,
                model_id: "canned".to_string(),
                tokens_used: None,
            })
        }

        fn model_id(&self) -> &str {
            "canned"
        }
    }

    fn parser() -> LlmParser {
        LlmParser::new(
            Arc::new(Canned(vec![
                ("摘要", "  勤奋与诚信是成功之道。 "),
                ("关键词", "天道，酬勤、诚信"),
                ("问答对", "Q: 何为天道？\nA: 天道酬勤。"),
            ])),
            Language::Zh,
        )
    }

    #[tokio::test]
    async fn test_parser_outputs_snapshot() {
        let parser = parser();
        let mut outputs = Vec::new();
        for kind in [TransformKind::Summary, TransformKind::Keywords, TransformKind::QaPairs] {
            let TransformOutput::Nodes(drafts) = parser.transform(kind, "天道酬勤，人道酬诚。").await.unwrap()
            else {
                panic!("expected nodes");
            };
            outputs.extend(drafts);
        }

        assert_yaml_snapshot!(outputs, @r###"
        - text: 勤奋与诚信是成功之道。
          metadata:
            kind: summary
        - text: "天道, 酬勤, 诚信"
          metadata:
            keywords:
              - 天道
              - 酬勤
              - 诚信
            kind: keywords
        - text: 何为天道？
          metadata:
            answer: 天道酬勤。
            kind: qa
        "###);
    }

    #[tokio::test]
    async fn test_parser_failure_is_transform_error() {
        let parser = LlmParser::new(Arc::new(Canned(Vec::new())), Language::En);
        let err = parser
            .transform(TransformKind::Summary, "text")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transform(_)));
    }
}

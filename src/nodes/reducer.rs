//! Map-reduce vertex over a chunk list produced by a splitter.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::DEFAULT_MODEL;
use crate::error::NodeError;
use crate::llm::{CompletionRequest, TokenUsage};

use super::executor::{parse_config, ExecutionFrame, NodeExecutor, OperatorOutput, OperatorServices};

const DEFAULT_REDUCE_PROMPT: &str =
    "Summarize the following content concisely, preserving the key points.";

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReduceStrategy {
    Hierarchical,
    Concatenate,
}

#[derive(Debug, Deserialize)]
struct ReducerConfig {
    strategy: ReduceStrategy,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default = "default_temperature")]
    temperature: f64,
    #[serde(default = "default_prompt")]
    prompt: String,
}

fn default_model() -> String {
    DEFAULT_MODEL.into()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_prompt() -> String {
    DEFAULT_REDUCE_PROMPT.into()
}

/// Decode a splitter chunk list; anything else is a single chunk.
fn decode_chunks(payload: &str) -> Vec<String> {
    serde_json::from_str::<Vec<String>>(payload.trim())
        .unwrap_or_else(|_| vec![payload.to_string()])
}

pub struct ReducerExecutor;

#[async_trait]
impl NodeExecutor for ReducerExecutor {
    async fn execute(
        &self,
        frame: &ExecutionFrame,
        services: &OperatorServices,
    ) -> Result<OperatorOutput, NodeError> {
        services.check_cancelled()?;
        let config: ReducerConfig = parse_config(&frame.node.config)?;
        let chunks = decode_chunks(&frame.payload);

        match config.strategy {
            ReduceStrategy::Concatenate => Ok(OperatorOutput::text(chunks.join("\n\n"))),
            ReduceStrategy::Hierarchical => {
                let sink = services.stream_sink(&frame.node.id);
                let mut usage = TokenUsage::default();

                let mut summaries = Vec::with_capacity(chunks.len());
                for chunk in &chunks {
                    services.check_cancelled()?;
                    let request = CompletionRequest::new(config.model.clone(), chunk.clone())
                        .with_system(config.prompt.clone())
                        .with_temperature(config.temperature);
                    let completion = services.gateway.complete(&request, &sink).await?;
                    usage.add(&completion.usage);
                    summaries.push(completion.text);
                }

                // Fold pairwise until a single summary remains.
                while summaries.len() > 1 {
                    let mut next = Vec::with_capacity(summaries.len().div_ceil(2));
                    for pair in summaries.chunks(2) {
                        if pair.len() == 1 {
                            next.push(pair[0].clone());
                            continue;
                        }
                        services.check_cancelled()?;
                        let joined = format!("{}\n\n{}", pair[0], pair[1]);
                        let request = CompletionRequest::new(config.model.clone(), joined)
                            .with_system(config.prompt.clone())
                            .with_temperature(config.temperature);
                        let completion = services.gateway.complete(&request, &sink).await?;
                        usage.add(&completion.usage);
                        next.push(completion.text);
                    }
                    summaries = next;
                }

                Ok(OperatorOutput::text(summaries.pop().unwrap_or_default()).with_usage(usage))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use crate::nodes::test_support::{frame, services, ScriptedGateway};

    #[test]
    fn test_decode_chunk_list() {
        assert_eq!(decode_chunks(r#"["a", "b"]"#), vec!["a", "b"]);
        assert_eq!(decode_chunks("plain text"), vec!["plain text"]);
        assert_eq!(decode_chunks(r#"{"not": "a list"}"#), vec![r#"{"not": "a list"}"#]);
    }

    #[tokio::test]
    async fn test_concatenate_joins_with_blank_lines() {
        let (services, _rx) = services(ScriptedGateway::uppercase());
        let f = frame(
            NodeKind::Reducer,
            serde_json::json!({"strategy": "concatenate"}),
            r#"["one", "two", "three"]"#,
        );
        let out = ReducerExecutor.execute(&f, &services).await.unwrap();
        assert_eq!(out.text, "one\n\ntwo\n\nthree");
    }

    #[tokio::test]
    async fn test_hierarchical_recurses_pairwise() {
        // Summaries are bracketed so the fold structure is visible.
        let gateway = ScriptedGateway::new(|req| Ok(format!("S({})", req.user_text)));
        let (services, _rx) = services(gateway.clone());
        let f = frame(
            NodeKind::Reducer,
            serde_json::json!({"strategy": "hierarchical", "model": "m1", "prompt": "sum"}),
            r#"["a", "b", "c"]"#,
        );
        let out = ReducerExecutor.execute(&f, &services).await.unwrap();
        // Leaves: S(a) S(b) S(c); pair round: S(S(a)\n\nS(b)), carry S(c);
        // final round joins the two.
        assert_eq!(out.text, "S(S(S(a)\n\nS(b))\n\nS(c))");
        assert!(out.usage.is_some());
        let requests = gateway.requests.lock();
        assert!(requests.iter().all(|r| r.system_prompt.as_deref() == Some("sum")));
    }

    #[tokio::test]
    async fn test_hierarchical_single_chunk() {
        let gateway = ScriptedGateway::new(|req| Ok(format!("S({})", req.user_text)));
        let (services, _rx) = services(gateway);
        let f = frame(
            NodeKind::Reducer,
            serde_json::json!({"strategy": "hierarchical"}),
            "just text",
        );
        let out = ReducerExecutor.execute(&f, &services).await.unwrap();
        assert_eq!(out.text, "S(just text)");
    }

    #[tokio::test]
    async fn test_missing_strategy_rejected() {
        let (services, _rx) = services(ScriptedGateway::uppercase());
        let f = frame(NodeKind::Reducer, serde_json::Value::Null, "x");
        let err = ReducerExecutor.execute(&f, &services).await.unwrap_err();
        assert_eq!(err.kind(), "operator-invalid-config");
    }
}

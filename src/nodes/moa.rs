//! Mixture-of-agents: a parallel proposer fan-out and an aggregator that
//! folds the proposals into one answer.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::NodeError;
use crate::llm::{CompletionRequest, TokenUsage};

use super::executor::{parse_config, ExecutionFrame, NodeExecutor, OperatorOutput, OperatorServices};

pub const UNAVAILABLE_PLACEHOLDER: &str = "<unavailable>";

fn default_temperature() -> f64 {
    0.7
}

#[derive(Debug, Deserialize)]
struct MoaProposerConfig {
    models: Vec<String>,
    #[serde(default = "default_temperature")]
    temperature: f64,
}

/// Issues one completion per configured model in parallel and emits a JSON
/// object `{model_id: text}` preserving the configured order. A proposer
/// that fails after retries degrades to a placeholder entry.
pub struct MoaProposerExecutor;

#[async_trait]
impl NodeExecutor for MoaProposerExecutor {
    async fn execute(
        &self,
        frame: &ExecutionFrame,
        services: &OperatorServices,
    ) -> Result<OperatorOutput, NodeError> {
        services.check_cancelled()?;
        let config: MoaProposerConfig = parse_config(&frame.node.config)?;
        if config.models.is_empty() {
            return Err(NodeError::ConfigError("models must not be empty".into()));
        }

        let sink = services.discard_sink();
        let calls = config.models.iter().map(|model| {
            let request = CompletionRequest::new(model.clone(), frame.payload.clone())
                .with_temperature(config.temperature);
            let gateway = services.gateway.clone();
            let sink = sink.clone();
            async move { gateway.complete(&request, &sink).await }
        });
        let results = join_all(calls).await;

        let mut usage = TokenUsage::default();
        let mut proposals = serde_json::Map::new();
        for (model, result) in config.models.iter().zip(results) {
            match result {
                Ok(completion) => {
                    usage.add(&completion.usage);
                    proposals.insert(model.clone(), Value::String(completion.text));
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "Proposer degraded to placeholder");
                    proposals.insert(model.clone(), Value::String(UNAVAILABLE_PLACEHOLDER.into()));
                }
            }
        }

        let text = serde_json::to_string(&Value::Object(proposals))
            .map_err(|e| NodeError::ExecutionError(e.to_string()))?;
        Ok(OperatorOutput::text(text).with_usage(usage))
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    Synthesis,
    Critique,
    Best,
}

#[derive(Debug, Deserialize)]
struct MoaAggregatorConfig {
    model: String,
    #[serde(default = "default_temperature")]
    temperature: f64,
    strategy: AggregationStrategy,
}

fn aggregator_prompt(strategy: AggregationStrategy) -> &'static str {
    match strategy {
        AggregationStrategy::Synthesis => {
            "You are an aggregator in a mixture-of-agents pipeline. The input is a JSON \
             object of candidate responses keyed by model. Combine the strongest elements \
             of the candidates into a single, coherent answer."
        }
        AggregationStrategy::Critique => {
            "You are an aggregator in a mixture-of-agents pipeline. The input is a JSON \
             object of candidate responses keyed by model. Briefly critique each candidate, \
             then select and refine the best one into a final answer."
        }
        AggregationStrategy::Best => {
            "You are an aggregator in a mixture-of-agents pipeline. The input is a JSON \
             object of candidate responses keyed by model. Select the single best candidate \
             and return it verbatim, with no commentary."
        }
    }
}

pub struct MoaAggregatorExecutor;

#[async_trait]
impl NodeExecutor for MoaAggregatorExecutor {
    async fn execute(
        &self,
        frame: &ExecutionFrame,
        services: &OperatorServices,
    ) -> Result<OperatorOutput, NodeError> {
        services.check_cancelled()?;
        let config: MoaAggregatorConfig = parse_config(&frame.node.config)?;
        let request = CompletionRequest::new(config.model, frame.payload.clone())
            .with_system(aggregator_prompt(config.strategy))
            .with_temperature(config.temperature);
        let sink = services.stream_sink(&frame.node.id);
        let completion = services.gateway.complete(&request, &sink).await?;
        Ok(OperatorOutput::text(completion.text).with_usage(completion.usage))
    }
}

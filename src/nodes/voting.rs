//! Verdict vertex over candidate answers carried in the inbound payload.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::DEFAULT_MODEL;
use crate::error::NodeError;
use crate::llm::CompletionRequest;

use super::executor::{parse_config, ExecutionFrame, NodeExecutor, OperatorOutput, OperatorServices};
use super::utils::majority_vote;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingMethod {
    Majority,
    Judge,
    Consensus,
}

fn default_method() -> VotingMethod {
    VotingMethod::Majority
}

fn default_model() -> String {
    DEFAULT_MODEL.into()
}

fn default_temperature() -> f64 {
    0.7
}

#[derive(Debug, Deserialize)]
struct VotingConfig {
    #[serde(default = "default_model")]
    model: String,
    #[serde(default = "default_method")]
    method: VotingMethod,
    #[serde(default = "default_temperature")]
    temperature: f64,
}

/// Candidate answers are newline- or comma-separated in the payload.
fn parse_candidates(payload: &str) -> Vec<String> {
    payload
        .split(['\n', ','])
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

const JUDGE_PROMPT: &str = "You are an impartial judge. Review the candidate answers or \
    positions below and deliver a reasoned verdict naming the strongest one.";
const CONSENSUS_PROMPT: &str = "Review the positions below and state the narrowest claim \
    that every position would agree with. Return only that statement.";

pub struct VotingExecutor;

#[async_trait]
impl NodeExecutor for VotingExecutor {
    async fn execute(
        &self,
        frame: &ExecutionFrame,
        services: &OperatorServices,
    ) -> Result<OperatorOutput, NodeError> {
        services.check_cancelled()?;
        let config: VotingConfig = parse_config(&frame.node.config)?;

        match config.method {
            VotingMethod::Majority => {
                let candidates = parse_candidates(&frame.payload);
                Ok(OperatorOutput::text(
                    majority_vote(&candidates).unwrap_or_default(),
                ))
            }
            VotingMethod::Judge | VotingMethod::Consensus => {
                let system = match config.method {
                    VotingMethod::Judge => JUDGE_PROMPT,
                    _ => CONSENSUS_PROMPT,
                };
                let request = CompletionRequest::new(config.model, frame.payload.clone())
                    .with_system(system)
                    .with_temperature(config.temperature);
                let sink = services.stream_sink(&frame.node.id);
                let completion = services.gateway.complete(&request, &sink).await?;
                Ok(OperatorOutput::text(completion.text).with_usage(completion.usage))
            }
        }
    }
}

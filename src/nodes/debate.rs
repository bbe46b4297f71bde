//! Multi-round debate over the inbound topic.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;

use crate::error::NodeError;
use crate::llm::{CompletionRequest, TokenUsage};

use super::executor::{parse_config, ExecutionFrame, NodeExecutor, OperatorOutput, OperatorServices};

fn default_temperature() -> f64 {
    0.7
}

#[derive(Debug, Deserialize)]
struct DebateConfig {
    model: String,
    debaters: usize,
    rounds: usize,
    #[serde(default = "default_temperature")]
    temperature: f64,
}

/// Deterministic position assignment: PRO, CON, NEUTRAL, then numbered.
pub fn position_name(index: usize) -> String {
    match index {
        0 => "PRO".into(),
        1 => "CON".into(),
        2 => "NEUTRAL".into(),
        n => format!("POSITION-{}", n + 1),
    }
}

pub struct DebateExecutor;

#[async_trait]
impl NodeExecutor for DebateExecutor {
    async fn execute(
        &self,
        frame: &ExecutionFrame,
        services: &OperatorServices,
    ) -> Result<OperatorOutput, NodeError> {
        services.check_cancelled()?;
        let config: DebateConfig = parse_config(&frame.node.config)?;
        if !(2..=5).contains(&config.debaters) {
            return Err(NodeError::ConfigError(format!(
                "debaters {} out of range [2, 5]",
                config.debaters
            )));
        }
        if !(1..=5).contains(&config.rounds) {
            return Err(NodeError::ConfigError(format!(
                "rounds {} out of range [1, 5]",
                config.rounds
            )));
        }

        let positions: Vec<String> = (0..config.debaters).map(position_name).collect();
        let sink = services.stream_sink(&frame.node.id);
        let mut transcript = String::new();
        let mut usage = TokenUsage::default();

        for round in 1..=config.rounds {
            services.check_cancelled()?;
            let statements = positions.iter().map(|position| {
                let system = format!(
                    "You are taking part in a structured debate as the {} position. \
                     This is round {} of {}. Argue your assigned side concisely.",
                    position, round, config.rounds
                );
                let user = if transcript.is_empty() {
                    format!("Debate topic:\n{}", frame.payload)
                } else {
                    format!(
                        "Debate topic:\n{}\n\nTranscript so far:\n{}",
                        frame.payload, transcript
                    )
                };
                let request = CompletionRequest::new(config.model.clone(), user)
                    .with_system(system)
                    .with_temperature(config.temperature);
                let gateway = services.gateway.clone();
                let sink = sink.clone();
                let header = format!("\n\n=== Round {} / {} ===\n", round, position);
                async move {
                    sink.push(&header);
                    gateway.complete(&request, &sink).await
                }
            });

            let results = join_all(statements).await;
            for (position, result) in positions.iter().zip(results) {
                let completion = result?;
                usage.add(&completion.usage);
                transcript.push_str(&format!(
                    "Round {} — {}: {}\n",
                    round, position, completion.text
                ));
            }
        }

        Ok(OperatorOutput::text(transcript).with_usage(usage))
    }
}

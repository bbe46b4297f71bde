//! Single LLM completion vertex.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::DEFAULT_MODEL;
use crate::error::NodeError;
use crate::llm::CompletionRequest;

use super::executor::{parse_config, ExecutionFrame, NodeExecutor, OperatorOutput, OperatorServices};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant in a node-based workflow.";

#[derive(Debug, Deserialize)]
struct LlmNodeConfig {
    #[serde(default = "default_model")]
    model: String,
    #[serde(default = "default_temperature")]
    temperature: f64,
    #[serde(default)]
    system_prompt: Option<String>,
}

fn default_model() -> String {
    DEFAULT_MODEL.into()
}

fn default_temperature() -> f64 {
    0.7
}

pub struct LlmNodeExecutor;

#[async_trait]
impl NodeExecutor for LlmNodeExecutor {
    async fn execute(
        &self,
        frame: &ExecutionFrame,
        services: &OperatorServices,
    ) -> Result<OperatorOutput, NodeError> {
        services.check_cancelled()?;
        let config: LlmNodeConfig = parse_config(&frame.node.config)?;
        if !(0.0..=2.0).contains(&config.temperature) {
            return Err(NodeError::ConfigError(format!(
                "temperature {} out of range [0, 2]",
                config.temperature
            )));
        }

        let system = config
            .system_prompt
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.into());
        let request = CompletionRequest::new(config.model, frame.payload.clone())
            .with_system(system)
            .with_temperature(config.temperature);

        let sink = services.stream_sink(&frame.node.id);
        let completion = services.gateway.complete(&request, &sink).await?;
        Ok(OperatorOutput::text(completion.text).with_usage(completion.usage))
    }
}

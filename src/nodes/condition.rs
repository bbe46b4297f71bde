//! Predicate vertex steering the true/false ports.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::NodeError;
use crate::graph::Port;

use super::executor::{parse_config, ExecutionFrame, NodeExecutor, OperatorOutput, OperatorServices};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Contains,
    Equals,
    NotContains,
}

#[derive(Debug, Deserialize)]
struct ConditionConfig {
    operator: ConditionOperator,
    #[serde(default)]
    target: String,
}

pub struct ConditionExecutor;

impl ConditionExecutor {
    fn evaluate(operator: ConditionOperator, payload: &str, target: &str) -> bool {
        match operator {
            ConditionOperator::Contains => payload.contains(target),
            ConditionOperator::NotContains => !payload.contains(target),
            ConditionOperator::Equals => payload == target,
        }
    }
}

#[async_trait]
impl NodeExecutor for ConditionExecutor {
    async fn execute(
        &self,
        frame: &ExecutionFrame,
        services: &OperatorServices,
    ) -> Result<OperatorOutput, NodeError> {
        services.check_cancelled()?;
        let config: ConditionConfig = parse_config(&frame.node.config)?;
        let outcome = Self::evaluate(config.operator, &frame.payload, &config.target);
        let port = if outcome { Port::True } else { Port::False };
        Ok(OperatorOutput::text(if outcome { "true" } else { "false" }).with_port(port))
    }
}

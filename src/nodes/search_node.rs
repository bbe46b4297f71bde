//! Web search vertex.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::NodeError;

use super::executor::{parse_config, ExecutionFrame, NodeExecutor, OperatorOutput, OperatorServices};

#[derive(Debug, Deserialize)]
struct SearchNodeConfig {
    #[serde(default)]
    query: Option<String>,
}

pub struct SearchNodeExecutor;

#[async_trait]
impl NodeExecutor for SearchNodeExecutor {
    async fn execute(
        &self,
        frame: &ExecutionFrame,
        services: &OperatorServices,
    ) -> Result<OperatorOutput, NodeError> {
        services.check_cancelled()?;
        let config: SearchNodeConfig = parse_config(&frame.node.config)?;
        let query = match config.query.as_deref() {
            Some(q) if !q.is_empty() => q,
            _ => frame.payload.as_str(),
        };
        let text = services.search.search(query, &services.cancel).await?;
        Ok(OperatorOutput::text(text))
    }
}

//! Input and output vertices.

use async_trait::async_trait;

use crate::error::NodeError;

use super::executor::{ExecutionFrame, NodeExecutor, OperatorOutput, OperatorServices};

/// `input`: emits the authoring-time seed value. No I/O.
pub struct InputExecutor;

#[async_trait]
impl NodeExecutor for InputExecutor {
    async fn execute(
        &self,
        frame: &ExecutionFrame,
        services: &OperatorServices,
    ) -> Result<OperatorOutput, NodeError> {
        services.check_cancelled()?;
        Ok(OperatorOutput::text(
            frame.node.seed.clone().unwrap_or_default(),
        ))
    }
}

/// `output`: passes the inbound payload through unchanged. Terminal kind.
pub struct OutputExecutor;

#[async_trait]
impl NodeExecutor for OutputExecutor {
    async fn execute(
        &self,
        frame: &ExecutionFrame,
        services: &OperatorServices,
    ) -> Result<OperatorOutput, NodeError> {
        services.check_cancelled()?;
        Ok(OperatorOutput::text(frame.payload.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use crate::nodes::test_support::{frame, services, ScriptedGateway};

    #[tokio::test]
    async fn test_input_emits_seed() {
        let (services, _rx) = services(ScriptedGateway::uppercase());
        let mut f = frame(NodeKind::Input, serde_json::Value::Null, "");
        f.node.seed = Some("hello".into());
        let out = InputExecutor.execute(&f, &services).await.unwrap();
        assert_eq!(out.text, "hello");
    }

    #[tokio::test]
    async fn test_input_without_seed_is_empty() {
        let (services, _rx) = services(ScriptedGateway::uppercase());
        let f = frame(NodeKind::Input, serde_json::Value::Null, "");
        let out = InputExecutor.execute(&f, &services).await.unwrap();
        assert_eq!(out.text, "");
    }

    #[tokio::test]
    async fn test_output_passthrough() {
        let (services, _rx) = services(ScriptedGateway::uppercase());
        let f = frame(NodeKind::Output, serde_json::Value::Null, "payload text");
        let out = OutputExecutor.execute(&f, &services).await.unwrap();
        assert_eq!(out.text, "payload text");
    }
}

//! Loop vertex: the controllable re-entry point for bounded iteration.
//!
//! The scheduler re-admits a loop vertex on every back-edge delivery and
//! tracks the iteration counter; this executor only decides which of the
//! two ports to enable and republishes the most recent payload.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::NodeError;
use crate::graph::Port;

use super::executor::{parse_config, ExecutionFrame, NodeExecutor, OperatorOutput, OperatorServices};

#[derive(Debug, Deserialize)]
struct LoopConfig {
    max_iterations: u32,
    #[serde(default)]
    target_text: Option<String>,
}

pub struct LoopExecutor;

#[async_trait]
impl NodeExecutor for LoopExecutor {
    async fn execute(
        &self,
        frame: &ExecutionFrame,
        services: &OperatorServices,
    ) -> Result<OperatorOutput, NodeError> {
        services.check_cancelled()?;
        let config: LoopConfig = parse_config(&frame.node.config)?;
        if config.max_iterations < 1 {
            return Err(NodeError::ConfigError(
                "max_iterations must be at least 1".into(),
            ));
        }

        // The target test applies to back-edge payloads only; on initial
        // admission there is none yet.
        let target_hit = frame.iteration > 0
            && config
                .target_text
                .as_deref()
                .is_some_and(|t| !t.is_empty() && frame.payload.contains(t));
        let iterating = frame.iteration < config.max_iterations && !target_hit;

        let port = if iterating { Port::Loop } else { Port::Done };
        Ok(OperatorOutput::text(frame.payload.clone()).with_port(port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use crate::nodes::executor::PortSelection;
    use crate::nodes::test_support::{frame, services, ScriptedGateway};

    async fn run(config: serde_json::Value, payload: &str, iteration: u32) -> OperatorOutput {
        let (services, _rx) = services(ScriptedGateway::uppercase());
        let mut f = frame(NodeKind::Loop, config, payload);
        f.iteration = iteration;
        LoopExecutor.execute(&f, &services).await.unwrap()
    }

    #[tokio::test]
    async fn test_first_admission_iterates() {
        let out = run(serde_json::json!({"max_iterations": 3}), "x", 0).await;
        assert_eq!(out.port, PortSelection::Named(Port::Loop));
        assert_eq!(out.text, "x");
    }

    #[tokio::test]
    async fn test_exits_at_max_iterations() {
        let out = run(serde_json::json!({"max_iterations": 3}), "x", 2).await;
        assert_eq!(out.port, PortSelection::Named(Port::Loop));
        let out = run(serde_json::json!({"max_iterations": 3}), "x", 3).await;
        assert_eq!(out.port, PortSelection::Named(Port::Done));
    }

    #[tokio::test]
    async fn test_target_text_stops_iteration() {
        let config = serde_json::json!({"max_iterations": 10, "target_text": "DONE"});
        let out = run(config.clone(), "still going", 1).await;
        assert_eq!(out.port, PortSelection::Named(Port::Loop));
        let out = run(config, "all DONE here", 1).await;
        assert_eq!(out.port, PortSelection::Named(Port::Done));
    }

    #[tokio::test]
    async fn test_target_ignored_on_initial_admission() {
        let config = serde_json::json!({"max_iterations": 2, "target_text": "seed"});
        let out = run(config, "the seed payload", 0).await;
        assert_eq!(out.port, PortSelection::Named(Port::Loop));
    }

    #[tokio::test]
    async fn test_zero_max_iterations_rejected() {
        let (services, _rx) = services(ScriptedGateway::uppercase());
        let f = frame(NodeKind::Loop, serde_json::json!({"max_iterations": 0}), "x");
        let err = LoopExecutor.execute(&f, &services).await.unwrap_err();
        assert_eq!(err.kind(), "operator-invalid-config");
    }

    #[tokio::test]
    async fn test_missing_max_iterations_rejected() {
        let (services, _rx) = services(ScriptedGateway::uppercase());
        let f = frame(NodeKind::Loop, serde_json::Value::Null, "x");
        let err = LoopExecutor.execute(&f, &services).await.unwrap_err();
        assert_eq!(err.kind(), "operator-invalid-config");
    }
}

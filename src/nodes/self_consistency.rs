//! Self-consistency sampling: several parallel completions at staggered
//! temperatures, one answer selected by the configured voting rule.

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Deserialize;

use crate::error::NodeError;
use crate::llm::{CompletionRequest, LlmError, TokenUsage};

use super::executor::{parse_config, ExecutionFrame, NodeExecutor, OperatorOutput, OperatorServices};
use super::utils::majority_vote;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingRule {
    Majority,
    Longest,
    First,
}

fn default_voting() -> VotingRule {
    VotingRule::Majority
}

fn default_temperature() -> f64 {
    0.7
}

#[derive(Debug, Deserialize)]
struct SelfConsistencyConfig {
    model: String,
    samples: usize,
    #[serde(default = "default_voting")]
    voting: VotingRule,
    #[serde(default = "default_temperature")]
    temperature: f64,
}

pub struct SelfConsistencyExecutor;

#[async_trait]
impl NodeExecutor for SelfConsistencyExecutor {
    async fn execute(
        &self,
        frame: &ExecutionFrame,
        services: &OperatorServices,
    ) -> Result<OperatorOutput, NodeError> {
        services.check_cancelled()?;
        let config: SelfConsistencyConfig = parse_config(&frame.node.config)?;
        if config.samples < 2 {
            return Err(NodeError::ConfigError("samples must be at least 2".into()));
        }
        if config.temperature < 0.0 {
            return Err(NodeError::ConfigError("temperature must be non-negative".into()));
        }

        // All samples stream under the same vertex id; interleaving is fine.
        let sink = services.stream_sink(&frame.node.id);
        let mut in_flight = FuturesUnordered::new();
        for k in 0..config.samples {
            let temperature = (config.temperature + 0.1 * k as f64).clamp(0.0, 2.0);
            let request = CompletionRequest::new(config.model.clone(), frame.payload.clone())
                .with_temperature(temperature);
            let gateway = services.gateway.clone();
            let sink = sink.clone();
            in_flight.push(async move { gateway.complete(&request, &sink).await });
        }

        let mut completed = Vec::with_capacity(config.samples);
        let mut usage = TokenUsage::default();
        let mut last_err: Option<LlmError> = None;
        while let Some(result) = in_flight.next().await {
            match result {
                Ok(completion) => {
                    usage.add(&completion.usage);
                    completed.push(completion.text);
                    if matches!(config.voting, VotingRule::First) {
                        break;
                    }
                }
                Err(e) => last_err = Some(e),
            }
        }
        drop(in_flight);

        if completed.is_empty() {
            return Err(last_err
                .map(NodeError::from)
                .unwrap_or_else(|| NodeError::ExecutionError("no samples completed".into())));
        }

        let winner = match config.voting {
            VotingRule::First => completed.remove(0),
            VotingRule::Longest => {
                let mut best = completed.remove(0);
                for candidate in completed {
                    if candidate.chars().count() > best.chars().count() {
                        best = candidate;
                    }
                }
                best
            }
            VotingRule::Majority => majority_vote(&completed).unwrap_or_default(),
        };

        Ok(OperatorOutput::text(winner).with_usage(usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use crate::nodes::test_support::{frame, services, ScriptedGateway};

    fn sc_config(samples: usize, voting: &str) -> serde_json::Value {
        serde_json::json!({
            "model": "m1",
            "samples": samples,
            "voting": voting,
            "temperature": 0.0,
        })
    }

    #[tokio::test]
    async fn test_majority_wins() {
        let gateway = ScriptedGateway::sequence(vec![
            Ok("42".into()),
            Ok("42".into()),
            Ok("41".into()),
        ]);
        let (services, mut rx) = services(gateway);
        let f = frame(NodeKind::SelfConsistency, sc_config(3, "majority"), "q");
        let out = SelfConsistencyExecutor.execute(&f, &services).await.unwrap();
        assert_eq!(out.text, "42");

        // Three interleaved sample streams all tagged with the vertex id.
        let mut stream_count = 0;
        while let Ok(ev) = rx.try_recv() {
            if let crate::events::ExecutionEvent::TokenStream { node_id, .. } = ev {
                assert_eq!(node_id, "n1");
                stream_count += 1;
            }
        }
        assert!(stream_count >= 3);
    }

    #[tokio::test]
    async fn test_temperatures_staggered_and_clamped() {
        let gateway = ScriptedGateway::new(|_| Ok("x".into()));
        let (services, _rx) = services(gateway.clone());
        let config = serde_json::json!({"model": "m1", "samples": 3, "temperature": 1.9});
        let f = frame(NodeKind::SelfConsistency, config, "q");
        SelfConsistencyExecutor.execute(&f, &services).await.unwrap();

        let mut temps: Vec<f64> = gateway.requests.lock().iter().map(|r| r.temperature).collect();
        temps.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(temps, vec![1.9, 2.0, 2.0]);
    }

    #[tokio::test]
    async fn test_longest_picks_by_char_count() {
        let gateway = ScriptedGateway::sequence(vec![
            Ok("short".into()),
            Ok("the longest answer".into()),
            Ok("mid size".into()),
        ]);
        let (services, _rx) = services(gateway);
        let f = frame(NodeKind::SelfConsistency, sc_config(3, "longest"), "q");
        let out = SelfConsistencyExecutor.execute(&f, &services).await.unwrap();
        assert_eq!(out.text, "the longest answer");
    }

    #[tokio::test]
    async fn test_partial_failures_tolerated() {
        let gateway = ScriptedGateway::sequence(vec![
            Err(LlmError::NetworkError("down".into())),
            Ok("ok".into()),
            Ok("ok".into()),
        ]);
        let (services, _rx) = services(gateway);
        let f = frame(NodeKind::SelfConsistency, sc_config(3, "majority"), "q");
        let out = SelfConsistencyExecutor.execute(&f, &services).await.unwrap();
        assert_eq!(out.text, "ok");
    }

    #[tokio::test]
    async fn test_all_failures_fail_the_vertex() {
        let gateway = ScriptedGateway::new(|_| Err(LlmError::NetworkError("down".into())));
        let (services, _rx) = services(gateway);
        let f = frame(NodeKind::SelfConsistency, sc_config(2, "majority"), "q");
        let err = SelfConsistencyExecutor.execute(&f, &services).await.unwrap_err();
        assert_eq!(err.kind(), "model-unavailable");
    }

    #[tokio::test]
    async fn test_samples_below_two_rejected() {
        let (services, _rx) = services(ScriptedGateway::uppercase());
        let f = frame(NodeKind::SelfConsistency, sc_config(1, "majority"), "q");
        let err = SelfConsistencyExecutor.execute(&f, &services).await.unwrap_err();
        assert_eq!(err.kind(), "operator-invalid-config");
    }
}

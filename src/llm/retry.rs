//! Retry and fallback policy around the model gateway.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use super::error::LlmError;
use super::types::{Completion, CompletionGateway, CompletionRequest, StreamSink};

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 4_000;
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    let ms = (INITIAL_BACKOFF_MS * 2u64.pow(attempt)).min(MAX_BACKOFF_MS);
    // Jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

/// Wraps a gateway with the per-call retry budget and the ordered fallback
/// model list. Each primary attempt and each fallback attempt is bounded by
/// the 120 s per-attempt timeout; cancellation preempts further attempts.
pub struct RetryingGateway {
    inner: Arc<dyn CompletionGateway>,
    fallback_models: Vec<String>,
}

impl RetryingGateway {
    pub fn new(inner: Arc<dyn CompletionGateway>, fallback_models: Vec<String>) -> Self {
        Self {
            inner,
            fallback_models,
        }
    }

    async fn attempt(
        &self,
        request: &CompletionRequest,
        sink: &StreamSink,
    ) -> Result<Completion, LlmError> {
        match tokio::time::timeout(ATTEMPT_TIMEOUT, self.inner.complete(request, sink)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout),
        }
    }
}

#[async_trait]
impl CompletionGateway for RetryingGateway {
    async fn complete(
        &self,
        request: &CompletionRequest,
        sink: &StreamSink,
    ) -> Result<Completion, LlmError> {
        let mut last_err: Option<LlmError> = None;

        for attempt in 0..MAX_ATTEMPTS {
            if sink.is_cancelled() {
                return Err(LlmError::Cancelled);
            }
            match self.attempt(request, sink).await {
                Ok(completion) => return Ok(completion),
                Err(LlmError::Cancelled) => return Err(LlmError::Cancelled),
                Err(e) => {
                    let retry = e.is_retryable() && attempt + 1 < MAX_ATTEMPTS;
                    if retry {
                        let delay = backoff_delay(attempt);
                        warn!(
                            model = %request.model,
                            attempt = attempt + 1,
                            backoff_ms = delay.as_millis() as u64,
                            error = %e,
                            "Retrying model call"
                        );
                        tokio::time::sleep(delay).await;
                        last_err = Some(e);
                        continue;
                    }
                    last_err = Some(e);
                    break;
                }
            }
        }

        // Primary exhausted, walk the fallback list.
        for fallback in &self.fallback_models {
            if fallback == &request.model {
                continue;
            }
            if sink.is_cancelled() {
                return Err(LlmError::Cancelled);
            }
            let mut fb_request = request.clone();
            fb_request.model = fallback.clone();
            match self.attempt(&fb_request, sink).await {
                Ok(completion) => {
                    info!(model = %fallback, primary = %request.model, "Fell back to alternative model");
                    return Ok(completion);
                }
                Err(LlmError::Cancelled) => return Err(LlmError::Cancelled),
                Err(e) => {
                    warn!(model = %fallback, error = %e, "Fallback model also failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| LlmError::NetworkError("all providers failed".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio_util::sync::CancellationToken;

    /// Scripted gateway: pops one behavior per call, records the model used.
    struct Scripted {
        script: Mutex<Vec<Result<String, LlmError>>>,
        models_seen: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(script: Vec<Result<String, LlmError>>) -> Self {
            Self {
                script: Mutex::new(script),
                models_seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionGateway for Scripted {
        async fn complete(
            &self,
            request: &CompletionRequest,
            sink: &StreamSink,
        ) -> Result<Completion, LlmError> {
            self.models_seen.lock().push(request.model.clone());
            let next = self.script.lock().remove(0);
            next.map(|text| {
                sink.push(&text);
                Completion {
                    text: text.clone(),
                    usage: Default::default(),
                }
            })
        }
    }

    fn sink() -> StreamSink {
        StreamSink::discard(CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let scripted = Arc::new(Scripted::new(vec![
            Err(LlmError::NetworkError("reset".into())),
            Err(LlmError::ApiError { status: 502, message: "bad".into() }),
            Ok("ok".into()),
        ]));
        let gateway = RetryingGateway::new(scripted.clone(), vec![]);
        let completion = gateway
            .complete(&CompletionRequest::new("m1", "hi"), &sink())
            .await
            .unwrap();
        assert_eq!(completion.text, "ok");
        assert_eq!(scripted.models_seen.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_after_exhaustion() {
        let scripted = Arc::new(Scripted::new(vec![
            Err(LlmError::NetworkError("a".into())),
            Err(LlmError::NetworkError("b".into())),
            Err(LlmError::NetworkError("c".into())),
            Ok("from-fallback".into()),
        ]));
        let gateway = RetryingGateway::new(scripted.clone(), vec!["small-model".into()]);
        let completion = gateway
            .complete(&CompletionRequest::new("m1", "hi"), &sink())
            .await
            .unwrap();
        assert_eq!(completion.text, "from-fallback");
        let seen = scripted.models_seen.lock().clone();
        assert_eq!(seen, vec!["m1", "m1", "m1", "small-model"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_skips_straight_to_fallback() {
        let scripted = Arc::new(Scripted::new(vec![
            Err(LlmError::AuthenticationError("bad key".into())),
            Ok("fb".into()),
        ]));
        let gateway = RetryingGateway::new(scripted.clone(), vec!["fb-model".into()]);
        let completion = gateway
            .complete(&CompletionRequest::new("m1", "hi"), &sink())
            .await
            .unwrap();
        assert_eq!(completion.text, "fb");
        assert_eq!(scripted.models_seen.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_fallbacks_return_last_error() {
        let scripted = Arc::new(Scripted::new(vec![
            Err(LlmError::NetworkError("a".into())),
            Err(LlmError::NetworkError("b".into())),
            Err(LlmError::NetworkError("c".into())),
            Err(LlmError::ApiError { status: 500, message: "fb down".into() }),
        ]));
        let gateway = RetryingGateway::new(scripted, vec!["fb-model".into()]);
        let err = gateway
            .complete(&CompletionRequest::new("m1", "hi"), &sink())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ApiError { status: 500, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_preempts_retries() {
        let scripted = Arc::new(Scripted::new(vec![
            Err(LlmError::NetworkError("a".into())),
            Ok("never reached".into()),
        ]));
        let gateway = RetryingGateway::new(scripted.clone(), vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let cancelled_sink = StreamSink::discard(cancel);
        let err = gateway
            .complete(&CompletionRequest::new("m1", "hi"), &cancelled_sink)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Cancelled));
        assert!(scripted.models_seen.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_identical_to_primary_skipped() {
        let scripted = Arc::new(Scripted::new(vec![
            Err(LlmError::AuthenticationError("bad".into())),
        ]));
        let gateway = RetryingGateway::new(scripted.clone(), vec!["m1".into()]);
        let err = gateway
            .complete(&CompletionRequest::new("m1", "hi"), &sink())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::AuthenticationError(_)));
        assert_eq!(scripted.models_seen.lock().len(), 1);
    }

    #[test]
    fn test_backoff_schedule_capped() {
        for attempt in 0..6 {
            let d = backoff_delay(attempt);
            // 0.8x jitter floor on the 500ms base, 1.2x ceiling on the 4s cap
            assert!(d >= Duration::from_millis(400));
            assert!(d <= Duration::from_millis(4_800));
        }
    }
}

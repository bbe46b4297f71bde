use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::error::LlmError;

/// One completion request against the model gateway.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    pub user_text: String,
    pub temperature: f64,
    /// Per-request key override; falls back to the gateway's configured key.
    pub api_key: Option<String>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, user_text: impl Into<String>) -> Self {
        CompletionRequest {
            model: model.into(),
            system_prompt: None,
            user_text: user_text.into(),
            temperature: 0.7,
            api_key: None,
        }
    }

    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Token counters, provider-reported or estimated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

impl TokenUsage {
    pub fn total(&self) -> i64 {
        self.input_tokens + self.output_tokens
    }

    pub fn is_empty(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }

    /// 4-chars-per-token estimate, used when the provider omits counts.
    pub fn estimate(system_prompt: &str, user_text: &str, output: &str) -> Self {
        let input_chars = system_prompt.chars().count() + user_text.chars().count();
        TokenUsage {
            input_tokens: input_chars.div_ceil(4) as i64,
            output_tokens: output.chars().count().div_ceil(4) as i64,
        }
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Final result of a completion call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// Token delta sink handed into the streaming loop: an append callback plus
/// the session cancellation token. The callback must not block.
#[derive(Clone)]
pub struct StreamSink {
    on_token: Arc<dyn Fn(&str) + Send + Sync>,
    cancel: CancellationToken,
}

impl StreamSink {
    pub fn new<F>(cancel: CancellationToken, on_token: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        StreamSink {
            on_token: Arc::new(on_token),
            cancel,
        }
    }

    /// A sink that discards deltas, for callers that only want the final text.
    pub fn discard(cancel: CancellationToken) -> Self {
        StreamSink::new(cancel, |_| {})
    }

    pub fn push(&self, token: &str) {
        (self.on_token)(token);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl std::fmt::Debug for StreamSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSink")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Abstraction over the upstream model gateway.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Stream a completion, pushing token deltas into `sink` as they arrive,
    /// and return the assembled text with usage counters.
    async fn complete(
        &self,
        request: &CompletionRequest,
        sink: &StreamSink,
    ) -> Result<Completion, LlmError>;
}

use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use async_trait::async_trait;

use super::error::LlmError;
use super::types::{Completion, CompletionGateway, CompletionRequest, StreamSink, TokenUsage};

#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        OpenRouterConfig {
            api_key: None,
            base_url: crate::config::DEFAULT_GATEWAY_BASE_URL.into(),
        }
    }
}

/// Default gateway adapter: OpenAI-compatible chat completions over SSE.
pub struct OpenRouterGateway {
    config: OpenRouterConfig,
    client: reqwest::Client,
}

impl OpenRouterGateway {
    pub fn new(config: OpenRouterConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn build_headers(&self, request: &CompletionRequest) -> Result<HeaderMap, LlmError> {
        let api_key = request
            .api_key
            .clone()
            .or_else(|| self.config.api_key.clone())
            .ok_or_else(|| LlmError::AuthenticationError("gateway API key is missing".into()))?;

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|e| LlmError::InvalidRequest(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn build_payload(request: &CompletionRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": request.user_text }));

        serde_json::json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "stream": true,
            "stream_options": { "include_usage": true },
        })
    }

    fn parse_usage(body: &Value) -> Option<TokenUsage> {
        let usage = body.get("usage")?;
        Some(TokenUsage {
            input_tokens: usage.get("prompt_tokens").and_then(|v| v.as_i64()).unwrap_or(0),
            output_tokens: usage
                .get("completion_tokens")
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
        })
    }

    /// Returns the content delta of a stream chunk; `None` means `[DONE]`.
    fn parse_stream_chunk(data: &str) -> Result<Option<(String, Option<TokenUsage>)>, LlmError> {
        if data.trim() == "[DONE]" {
            return Ok(None);
        }
        let value: Value =
            serde_json::from_str(data).map_err(|e| LlmError::SerializationError(e.to_string()))?;
        let delta = value
            .get("choices")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let usage = Self::parse_usage(&value);
        Ok(Some((delta, usage)))
    }

    fn map_error(status: u16, body: &str) -> LlmError {
        if status == 401 || status == 403 {
            return LlmError::AuthenticationError(body.to_string());
        }
        if status == 429 {
            return LlmError::RateLimitExceeded { retry_after: None };
        }
        LlmError::ApiError {
            status,
            message: body.to_string(),
        }
    }
}

#[async_trait]
impl CompletionGateway for OpenRouterGateway {
    async fn complete(
        &self,
        request: &CompletionRequest,
        sink: &StreamSink,
    ) -> Result<Completion, LlmError> {
        let headers = self.build_headers(request)?;
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let payload = Self::build_payload(request);

        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(&payload)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| LlmError::NetworkError(e.to_string()))?;
            return Err(Self::map_error(status.as_u16(), &text));
        }

        let mut stream = response.bytes_stream().eventsource();
        let mut text = String::new();
        let mut usage: Option<TokenUsage> = None;

        loop {
            let event = tokio::select! {
                _ = sink.cancel_token().cancelled() => return Err(LlmError::Cancelled),
                event = stream.next() => event,
            };
            let Some(event) = event else { break };
            let event = event.map_err(|e| LlmError::StreamError(e.to_string()))?;
            match Self::parse_stream_chunk(&event.data)? {
                Some((delta, chunk_usage)) => {
                    if !delta.is_empty() {
                        text.push_str(&delta);
                        sink.push(&delta);
                    }
                    if let Some(u) = chunk_usage {
                        usage = Some(u);
                    }
                }
                None => break,
            }
        }

        let usage = match usage.filter(|u| !u.is_empty()) {
            Some(u) => u,
            None => TokenUsage::estimate(
                request.system_prompt.as_deref().unwrap_or(""),
                &request.user_text,
                &text,
            ),
        };

        Ok(Completion { text, usage })
    }
}

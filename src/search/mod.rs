//! Web search client: one text query in, one merged text blob out.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::NodeError;

const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;
const MAX_RESULTS: u64 = 5;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },
    #[error("Timeout")]
    Timeout,
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Search API key is missing")]
    MissingKey,
    #[error("Cancelled")]
    Cancelled,
}

impl SearchError {
    fn is_retryable(&self) -> bool {
        match self {
            SearchError::NetworkError(_) | SearchError::Timeout => true,
            SearchError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<SearchError> for NodeError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::Cancelled => NodeError::Cancelled,
            other => NodeError::SearchUnavailable(other.to_string()),
        }
    }
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one query and return the top results' titles and snippets
    /// separated by blank lines. Empty results are the empty string.
    /// The call is a cancellation checkpoint: a cancelled token aborts the
    /// in-flight exchange and any remaining retries.
    async fn search(&self, query: &str, cancel: &CancellationToken)
        -> Result<String, SearchError>;
}

/// Tavily-backed provider.
pub struct TavilySearch {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl TavilySearch {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, "https://api.tavily.com".into())
    }

    pub fn with_base_url(api_key: Option<String>, base_url: String) -> Self {
        Self {
            api_key,
            base_url,
            client: reqwest::Client::new(),
        }
    }

    async fn search_once(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<String, SearchError> {
        let api_key = self.api_key.as_ref().ok_or(SearchError::MissingKey)?;
        let url = format!("{}/search", self.base_url.trim_end_matches('/'));

        let send = self
            .client
            .post(url)
            .json(&json!({
                "api_key": api_key,
                "query": query,
                "max_results": MAX_RESULTS,
            }))
            .send();
        // Cancellation closes the exchange; dropping the future drops the
        // underlying connection.
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(SearchError::Cancelled),
            sent = tokio::time::timeout(SEARCH_TIMEOUT, send) => match sent {
                Ok(Ok(resp)) => resp,
                Ok(Err(e)) => return Err(SearchError::NetworkError(e.to_string())),
                Err(_) => return Err(SearchError::Timeout),
            },
        };

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SearchError::NetworkError(e.to_string()))?;
        if !status.is_success() {
            return Err(SearchError::ApiError {
                status: status.as_u16(),
                message: text,
            });
        }

        let body: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| SearchError::SerializationError(e.to_string()))?;
        Ok(merge_results(&body))
    }
}

fn merge_results(body: &serde_json::Value) -> String {
    body.get("results")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .map(|r| {
                    let title = r.get("title").and_then(|v| v.as_str()).unwrap_or("");
                    let snippet = r.get("content").and_then(|v| v.as_str()).unwrap_or("");
                    format!("{}\n{}", title, snippet)
                })
                .collect::<Vec<_>>()
                .join("\n\n")
        })
        .unwrap_or_default()
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<String, SearchError> {
        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            // Cancellation preempts retries.
            if cancel.is_cancelled() {
                return Err(SearchError::Cancelled);
            }
            match self.search_once(query, cancel).await {
                Ok(text) => return Ok(text),
                Err(SearchError::Cancelled) => return Err(SearchError::Cancelled),
                Err(e) => {
                    if e.is_retryable() && attempt + 1 < MAX_ATTEMPTS {
                        let delay = crate::llm::retry::backoff_delay(attempt);
                        warn!(
                            attempt = attempt + 1,
                            backoff_ms = delay.as_millis() as u64,
                            error = %e,
                            "Retrying search"
                        );
                        tokio::time::sleep(delay).await;
                        last_err = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }
        Err(last_err.unwrap_or(SearchError::Timeout))
    }
}

//! Shared scaffolding for operator unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::events::{EventEmitter, EventReceiver};
use crate::graph::{GraphNode, NodeKind};
use crate::llm::{Completion, CompletionGateway, CompletionRequest, LlmError, StreamSink, TokenUsage};
use crate::search::{SearchError, SearchProvider};

use super::executor::{ExecutionFrame, OperatorServices};

type Responder = dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync;

/// Gateway whose responses are produced by a closure over the request.
/// Streams the text to the sink in two halves and records every request.
pub struct ScriptedGateway {
    respond: Box<Responder>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedGateway {
    pub fn new<F>(respond: F) -> Arc<Self>
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Echoes the user text back, uppercased.
    pub fn uppercase() -> Arc<Self> {
        Self::new(|req| Ok(req.user_text.to_uppercase()))
    }

    /// Pops queued responses in order, one per call.
    pub fn sequence(responses: Vec<Result<String, LlmError>>) -> Arc<Self> {
        let queue = Mutex::new(responses);
        Self::new(move |_| queue.lock().remove(0))
    }
}

#[async_trait]
impl CompletionGateway for ScriptedGateway {
    async fn complete(
        &self,
        request: &CompletionRequest,
        sink: &StreamSink,
    ) -> Result<Completion, LlmError> {
        self.requests.lock().push(request.clone());
        let text = (self.respond)(request)?;
        let chars: Vec<char> = text.chars().collect();
        let mid = chars.len() / 2;
        let a: String = chars[..mid].iter().collect();
        let b: String = chars[mid..].iter().collect();
        if !a.is_empty() {
            sink.push(&a);
        }
        if !b.is_empty() {
            sink.push(&b);
        }
        Ok(Completion {
            usage: TokenUsage::estimate(
                request.system_prompt.as_deref().unwrap_or(""),
                &request.user_text,
                &text,
            ),
            text,
        })
    }
}

pub struct FixedSearch(pub Result<String, &'static str>);

#[async_trait]
impl SearchProvider for FixedSearch {
    async fn search(
        &self,
        _query: &str,
        cancel: &CancellationToken,
    ) -> Result<String, SearchError> {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        self.0
            .clone()
            .map_err(|m| SearchError::NetworkError(m.into()))
    }
}

pub fn services(gateway: Arc<dyn CompletionGateway>) -> (OperatorServices, EventReceiver) {
    let (events, rx) = EventEmitter::channel();
    (
        OperatorServices {
            gateway,
            search: Arc::new(FixedSearch(Ok(String::new()))),
            events,
            cancel: CancellationToken::new(),
        },
        rx,
    )
}

pub fn frame(kind: NodeKind, config: Value, payload: &str) -> ExecutionFrame {
    ExecutionFrame {
        node: GraphNode {
            id: "n1".into(),
            kind,
            config,
            seed: None,
        },
        payload: payload.to_string(),
        iteration: 0,
    }
}

pub fn collect_tokens(rx: &mut EventReceiver) -> String {
    let mut out = String::new();
    while let Ok(ev) = rx.try_recv() {
        if let crate::events::ExecutionEvent::TokenStream { token, .. } = ev {
            out.push_str(&token);
        }
    }
    out
}

//! Shared scaffolding for end-to-end scheduler tests: a scripted gateway,
//! session construction, and event-sequence helpers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use neuroflow::events::{EventEmitter, ExecutionEvent};
use neuroflow::graph::{build_graph, validate_graph, Graph, GraphDocument};
use neuroflow::llm::{Completion, CompletionRequest, LlmError, StreamSink, TokenUsage};
use neuroflow::nodes::{NodeExecutorRegistry, OperatorServices};
use neuroflow::scheduler::ExecutionSession;
use neuroflow::search::{SearchError, SearchProvider};
use neuroflow::CompletionGateway;

type Responder = dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync;

/// Gateway scripted per request. A small artificial latency keeps worker
/// interleaving realistic (starts land before finishes on parallel fans).
pub struct ScriptedGateway {
    respond: Box<Responder>,
    pub latency: Duration,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedGateway {
    pub fn new<F>(respond: F) -> Arc<Self>
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            respond: Box::new(respond),
            latency: Duration::from_millis(20),
            requests: Mutex::new(Vec::new()),
        })
    }

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
        tokio::time::sleep(self.latency).await;
        if sink.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        let text = (self.respond)(request)?;
        let chars: Vec<char> = text.chars().collect();
        for chunk in chars.chunks(3) {
            sink.push(&chunk.iter().collect::<String>());
        }
        Ok(Completion {
            usage: TokenUsage::estimate("", &request.user_text, &text),
            text,
        })
    }
}

pub struct StubSearch(pub String);

#[async_trait]
impl SearchProvider for StubSearch {
    async fn search(
        &self,
        _query: &str,
        cancel: &CancellationToken,
    ) -> Result<String, SearchError> {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        Ok(self.0.clone())
    }
}

pub fn parse_graph(doc: serde_json::Value) -> Graph {
    let doc: GraphDocument = serde_json::from_value(doc).expect("document parses");
    let mut graph = build_graph(&doc).expect("graph builds");
    validate_graph(&mut graph).expect("graph validates");
    graph
}

/// Run a graph to completion against the scripted gateway and return every
/// emitted event in order.
pub async fn run_graph(
    doc: serde_json::Value,
    gateway: Arc<dyn CompletionGateway>,
) -> Vec<ExecutionEvent> {
    run_graph_with(doc, gateway, CancellationToken::new()).await
}

pub async fn run_graph_with(
    doc: serde_json::Value,
    gateway: Arc<dyn CompletionGateway>,
    cancel: CancellationToken,
) -> Vec<ExecutionEvent> {
    let graph = parse_graph(doc);
    let (events, mut rx) = EventEmitter::channel();
    let services = OperatorServices {
        gateway,
        search: Arc::new(StubSearch(String::new())),
        events,
        cancel,
    };
    let session = ExecutionSession::new(graph, Arc::new(NodeExecutorRegistry::new()), services, 5);
    let _ = session.run().await;

    let mut collected = Vec::new();
    while let Ok(event) = rx.try_recv() {
        collected.push(event);
    }
    collected
}

pub fn type_of(event: &ExecutionEvent) -> String {
    event.to_json()["type"].as_str().unwrap().to_string()
}

/// Positions of every `(type, node_id)` occurrence.
pub fn indices_of(events: &[ExecutionEvent], event_type: &str, node_id: &str) -> Vec<usize> {
    events
        .iter()
        .enumerate()
        .filter(|(_, e)| type_of(e) == event_type && e.node_id() == Some(node_id))
        .map(|(i, _)| i)
        .collect()
}

pub fn first_index(events: &[ExecutionEvent], event_type: &str, node_id: &str) -> usize {
    *indices_of(events, event_type, node_id)
        .first()
        .unwrap_or_else(|| panic!("no {} event for {}", event_type, node_id))
}

pub fn finish_result(events: &[ExecutionEvent], node_id: &str) -> String {
    events
        .iter()
        .find_map(|e| match e {
            ExecutionEvent::NodeFinish { node_id: id, result } if id == node_id => {
                Some(result.clone())
            }
            _ => None,
        })
        .unwrap_or_else(|| panic!("no node_finish for {}", node_id))
}

/// Every vertex gets at most one terminal event, streams never precede
/// their start, and the run ends with exactly one terminator.
pub fn assert_core_invariants(events: &[ExecutionEvent]) {
    let terminators = events
        .iter()
        .filter(|e| e.is_terminal())
        .count();
    assert_eq!(terminators, 1, "expected exactly one run terminator");
    assert!(
        events.last().unwrap().is_terminal(),
        "terminator must be the final event"
    );

    let mut node_ids: Vec<&str> = events.iter().filter_map(|e| e.node_id()).collect();
    node_ids.sort();
    node_ids.dedup();
    for id in node_ids {
        for stream_ix in indices_of(events, "token_stream", id)
            .into_iter()
            .chain(indices_of(events, "node_usage", id))
        {
            let start_ix = first_index(events, "node_start", id);
            assert!(
                start_ix < stream_ix,
                "data event for {} precedes its node_start",
                id
            );
        }

        // Every admission produces exactly one success/failure terminal.
        let starts = indices_of(events, "node_start", id).len();
        let terminals = indices_of(events, "node_finish", id).len()
            + indices_of(events, "node_failed", id).len();
        if starts > 0 {
            assert_eq!(
                starts, terminals,
                "vertex {} has {} starts but {} terminal events",
                id, starts, terminals
            );
        }
    }
}

//! One duplex connection: graph frames in, execution events out.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Settings;
use crate::events::{EventEmitter, ExecutionEvent};
use crate::graph::{build_graph, validate_graph, GraphDocument};
use crate::llm::{OpenRouterConfig, OpenRouterGateway, RetryingGateway};
use crate::nodes::{NodeExecutorRegistry, OperatorServices};
use crate::scheduler::ExecutionSession;
use crate::search::TavilySearch;

use super::AppState;

// GET /ws/execute — WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Each text frame carries one submitted graph; the connection stays open
/// for further submissions after a run terminates.
async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    info!("WebSocket client connected");
    let (mut ws_tx, mut ws_rx) = socket.split();

    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "WebSocket read error");
                break;
            }
        };
        match msg {
            Message::Text(text) => {
                let alive =
                    run_submission(&mut ws_tx, &mut ws_rx, &state.settings, text.as_str()).await;
                if !alive {
                    break;
                }
            }
            Message::Ping(data) => {
                let _ = ws_tx.send(Message::Pong(data)).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    debug!("WebSocket client disconnected");
}

async fn send_event(ws_tx: &mut WsSink, event: &ExecutionEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => ws_tx.send(Message::Text(json.into())).await.is_ok(),
        Err(_) => false,
    }
}

/// Validate and execute one submitted graph, forwarding events until the
/// terminal frame. Returns whether the connection is still usable.
async fn run_submission(
    ws_tx: &mut WsSink,
    ws_rx: &mut WsStream,
    settings: &Settings,
    raw: &str,
) -> bool {
    let run_id = Uuid::new_v4();
    let doc: GraphDocument = match serde_json::from_str(raw) {
        Ok(doc) => doc,
        Err(e) => {
            info!(%run_id, error = %e, "Rejected malformed submission");
            return send_event(
                ws_tx,
                &ExecutionEvent::ExecutionError {
                    error: format!("invalid-graph: {}", e),
                },
            )
            .await;
        }
    };

    let graph = match build_graph(&doc).and_then(|mut graph| {
        validate_graph(&mut graph)?;
        Ok(graph)
    }) {
        Ok(graph) => graph,
        Err(e) => {
            info!(%run_id, error = %e, "Rejected invalid graph");
            return send_event(
                ws_tx,
                &ExecutionEvent::ExecutionError {
                    error: e.to_string(),
                },
            )
            .await;
        }
    };

    info!(
        %run_id,
        nodes = graph.inner.node_count(),
        edges = graph.inner.edge_count(),
        "Starting run"
    );

    // The key sent with the frame overrides the server-side key for the run.
    let api_key = doc
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| settings.gateway_api_key.clone());
    let gateway = RetryingGateway::new(
        Arc::new(OpenRouterGateway::new(OpenRouterConfig {
            api_key,
            base_url: settings.gateway_base_url.clone(),
        })),
        settings.fallback_models.clone(),
    );

    let cancel = CancellationToken::new();
    let (events, mut event_rx) = EventEmitter::channel();
    let services = OperatorServices {
        gateway: Arc::new(gateway),
        search: Arc::new(TavilySearch::new(settings.search_api_key.clone())),
        events,
        cancel: cancel.clone(),
    };

    let session = ExecutionSession::new(
        graph,
        Arc::new(NodeExecutorRegistry::new()),
        services,
        settings.worker_cap,
    );
    let run = tokio::spawn(async move {
        let _ = session.run().await;
    });

    let mut alive = true;
    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(event) => {
                    let terminal = event.is_terminal();
                    if !send_event(ws_tx, &event).await {
                        cancel.cancel();
                        alive = false;
                        break;
                    }
                    if terminal {
                        break;
                    }
                }
                None => break,
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Ping(data))) => {
                    let _ = ws_tx.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    info!(%run_id, "Client went away, cancelling run");
                    cancel.cancel();
                    alive = false;
                    break;
                }
                // Frames arriving mid-run are not part of the protocol.
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = run.await;
    debug!(%run_id, "Run finished");
    alive
}

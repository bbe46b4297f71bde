//! HTTP/WebSocket surface: one duplex execution endpoint, the model
//! discovery proxy, and a health probe.

pub mod models;
pub mod session;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tracing::{info, warn};

use crate::config::Settings;

pub struct AppState {
    pub settings: Settings,
    pub http: reqwest::Client,
}

/// Credentialed CORS restricted to the configured origin allowlist.
fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Dropping unparseable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn build_router(settings: Settings) -> Router {
    let cors = cors_layer(&settings);
    let state = Arc::new(AppState {
        settings,
        http: reqwest::Client::new(),
    });

    Router::new()
        .route("/ws/execute", get(session::ws_handler))
        .route("/models", get(models::list_models))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

// GET /health — readiness probe, no auth
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// Bind and serve until the process is stopped.
pub async fn serve(settings: Settings) -> std::io::Result<()> {
    let bind = settings.bind.clone();
    let app = build_router(settings);
    let listener = TcpListener::bind(&bind).await?;
    info!(bind = %bind, "Engine listening");
    axum::serve(listener, app).await
}

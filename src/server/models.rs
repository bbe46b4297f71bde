//! Model discovery proxy against the gateway catalogue.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::warn;

use crate::config::DEFAULT_MODEL;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct ModelsQuery {
    #[serde(default)]
    pub api_key: Option<String>,
}

fn fallback_catalogue() -> serde_json::Value {
    serde_json::json!({
        "data": [ { "id": DEFAULT_MODEL, "name": "Fallback: GPT-3.5" } ]
    })
}

// GET /models?api_key=… — pricing fields pass through uninterpreted.
pub async fn list_models(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ModelsQuery>,
) -> Json<serde_json::Value> {
    let api_key = query
        .api_key
        .filter(|k| !k.is_empty())
        .or_else(|| state.settings.gateway_api_key.clone())
        .unwrap_or_default();
    let url = format!(
        "{}/models",
        state.settings.gateway_base_url.trim_end_matches('/')
    );

    let response = state
        .http
        .get(url)
        .bearer_auth(api_key)
        .send()
        .await;

    match response {
        Ok(resp) if resp.status().is_success() => match resp.json::<serde_json::Value>().await {
            Ok(body) => Json(body),
            Err(e) => {
                warn!(error = %e, "Model catalogue returned malformed JSON");
                Json(fallback_catalogue())
            }
        },
        Ok(resp) => {
            warn!(status = %resp.status(), "Model catalogue request rejected");
            Json(fallback_catalogue())
        }
        Err(e) => {
            warn!(error = %e, "Model catalogue unreachable");
            Json(fallback_catalogue())
        }
    }
}

//! Process configuration, read once at startup from the environment.

use std::env;

pub const DEFAULT_GATEWAY_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-3.5-turbo";
pub const DEFAULT_WORKER_CAP: usize = 5;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Bind address for the HTTP/WebSocket server.
    pub bind: String,
    /// Server-side gateway key; a key sent in the submitted graph overrides it.
    pub gateway_api_key: Option<String>,
    pub gateway_base_url: String,
    pub search_api_key: Option<String>,
    /// Ordered fallback model list tried after the primary's retries are spent.
    pub fallback_models: Vec<String>,
    /// Maximum concurrently executing vertices per run.
    pub worker_cap: usize,
    /// Origins allowed to reach the HTTP/WebSocket surface.
    pub cors_origins: Vec<String>,
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".into(),
        "http://127.0.0.1:5173".into(),
    ]
}

impl Settings {
    pub fn from_env() -> Self {
        let fallback_models = env::var("NEUROFLOW_FALLBACK_MODELS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|models| !models.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_MODEL.to_string()]);

        Settings {
            bind: env::var("NEUROFLOW_BIND").unwrap_or_else(|_| "127.0.0.1:8000".into()),
            gateway_api_key: env::var("OPENROUTER_API_KEY").ok().filter(|k| !k.is_empty()),
            gateway_base_url: env::var("OPENROUTER_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GATEWAY_BASE_URL.into()),
            search_api_key: env::var("TAVILY_API_KEY").ok().filter(|k| !k.is_empty()),
            fallback_models,
            worker_cap: env::var("NEUROFLOW_WORKER_CAP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_WORKER_CAP),
            cors_origins: env::var("NEUROFLOW_CORS_ORIGINS")
                .ok()
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|origins| !origins.is_empty())
                .unwrap_or_else(default_cors_origins),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            bind: "127.0.0.1:8000".into(),
            gateway_api_key: None,
            gateway_base_url: DEFAULT_GATEWAY_BASE_URL.into(),
            search_api_key: None,
            fallback_models: vec![DEFAULT_MODEL.to_string()],
            worker_cap: DEFAULT_WORKER_CAP,
            cors_origins: default_cors_origins(),
        }
    }
}

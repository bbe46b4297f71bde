pub mod error;
pub mod openrouter;
pub mod retry;
pub mod types;

pub use error::LlmError;
pub use openrouter::{OpenRouterConfig, OpenRouterGateway};
pub use retry::RetryingGateway;
pub use types::{Completion, CompletionGateway, CompletionRequest, StreamSink, TokenUsage};

//! Document chunking vertex. Output is the JSON-serialized chunk list,
//! which a downstream reducer recognizes.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::NodeError;

use super::executor::{parse_config, ExecutionFrame, NodeExecutor, OperatorOutput, OperatorServices};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    Fixed,
    Sliding,
    Semantic,
}

#[derive(Debug, Deserialize)]
struct SplitterConfig {
    strategy: SplitStrategy,
    chunk_size: usize,
    #[serde(default)]
    overlap: usize,
}

pub struct SplitterExecutor;

pub fn split_fixed(text: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|c| c.iter().collect())
        .collect()
}

pub fn split_sliding(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let stride = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += stride;
    }
    chunks
}

/// Split on blank-line boundaries, then greedily pack paragraphs up to
/// `chunk_size` characters. A paragraph is never split, even when it alone
/// exceeds the budget.
pub fn split_semantic(text: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if current.is_empty() {
            current = paragraph.to_string();
        } else if current.chars().count() + 2 + paragraph.chars().count() <= chunk_size {
            current.push_str("\n\n");
            current.push_str(paragraph);
        } else {
            chunks.push(std::mem::take(&mut current));
            current = paragraph.to_string();
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[async_trait]
impl NodeExecutor for SplitterExecutor {
    async fn execute(
        &self,
        frame: &ExecutionFrame,
        services: &OperatorServices,
    ) -> Result<OperatorOutput, NodeError> {
        services.check_cancelled()?;
        let config: SplitterConfig = parse_config(&frame.node.config)?;
        if config.chunk_size == 0 {
            return Err(NodeError::ConfigError("chunk_size must be positive".into()));
        }
        if config.overlap >= config.chunk_size {
            return Err(NodeError::ConfigError(
                "overlap must be smaller than chunk_size".into(),
            ));
        }

        let chunks = match config.strategy {
            SplitStrategy::Fixed => split_fixed(&frame.payload, config.chunk_size),
            SplitStrategy::Sliding => {
                split_sliding(&frame.payload, config.chunk_size, config.overlap)
            }
            SplitStrategy::Semantic => split_semantic(&frame.payload, config.chunk_size),
        };
        services.check_cancelled()?;

        let text = serde_json::to_string(&chunks)
            .map_err(|e| NodeError::ExecutionError(e.to_string()))?;
        Ok(OperatorOutput::text(text))
    }
}

pub mod models;
pub mod prompt;
pub mod providers;
pub mod stream;

use crate::llm::models::{ChatCompletion, ChatOptions};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    ConnectionError(String),
    #[error("LLM API responded with status code {status}: {body}")]
    ApiError { status: u16, body: String },
    #[error("LLM response error: {0}")]
    ResponseError(String),
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
}

/// A single non-streaming chat completion. The request orchestrator only
/// depends on this, so the remote provider can be swapped or mocked.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn complete(&self, prompt: &str, options: &ChatOptions)
        -> Result<ChatCompletion, LlmError>;
}

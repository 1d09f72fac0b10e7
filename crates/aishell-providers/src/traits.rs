//! LLM Provider trait — the uniform interface over every vendor API.
//!
//! Each vendor client (Claude, OpenAI, Gemini, Ollama, OpenRouter) implements
//! this trait. Callers never see vendor-specific types.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use aishell_core::types::{QueryRequest, QueryResult};

/// Failure inside a provider client.
///
/// Never escapes `query` (it becomes a `QueryResult::Failure`); it is the
/// error type carried by [`TextStream`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(reqwest::Error),

    #[error("API error: {status} — {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for ProviderError {
    /// The query string is dropped from the request URL kept in the error,
    /// so credentials passed as parameters never reach logs or transcripts.
    fn from(mut err: reqwest::Error) -> Self {
        if let Some(url) = err.url_mut() {
            url.set_query(None);
        }
        ProviderError::Http(err)
    }
}

/// Incremental response text.
///
/// Text chunks arrive as `Ok`. Any failure, before or during streaming, is
/// delivered as a single final `Err`, after which the stream ends. Empty
/// chunks are never yielded.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send + 'static>>;

/// Trait that all LLM providers implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send one prompt and wait for the full completion.
    ///
    /// Network, auth, rate-limit, and parse failures come back as
    /// `QueryResult::Failure`; this never panics or returns early.
    async fn query(&self, request: &QueryRequest) -> QueryResult;

    /// Stream the completion for one prompt.
    fn stream(&self, request: &QueryRequest) -> TextStream;

    /// Canonical provider name (`"claude"`, `"openai"`, …).
    fn name(&self) -> &str;

    /// Model identifier sent to the vendor.
    fn model(&self) -> &str;
}

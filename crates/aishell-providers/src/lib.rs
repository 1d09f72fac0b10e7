//! aishell providers — HTTP clients for each LLM vendor, the provider
//! registry, and the single/collation dispatcher.
//!
//! - [`traits`] — the `LlmProvider` trait every client implements
//! - [`registry`] — static provider table and name resolution
//! - [`dispatch`] — single, collation and streaming dispatch with transcript recording
//! - [`anthropic`], [`openai_compat`], [`gemini`], [`ollama`] — vendor clients

pub mod anthropic;
pub mod dispatch;
pub mod gemini;
mod http;
pub mod ollama;
pub mod openai_compat;
pub mod registry;
mod sse;
pub mod traits;

pub use anthropic::ClaudeProvider;
pub use dispatch::Dispatcher;
pub use gemini::GeminiProvider;
pub use http::failure_message;
pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use registry::{ProviderRegistry, ProviderSpec, PROVIDERS};
pub use traits::{LlmProvider, ProviderError, TextStream};

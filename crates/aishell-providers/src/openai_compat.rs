//! HTTP client for OpenAI-compatible `/chat/completions` APIs.
//!
//! Covers: OpenAI and OpenRouter (same wire format; OpenRouter adds
//! attribution headers).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use aishell_core::types::{ProviderConfig, ProviderKind, QueryRequest, QueryResult, Usage};

use crate::http::{build_client, check_status, failure_message};
use crate::registry::{spec, ProviderSpec};
use crate::sse::{line_stream, sse_data, LineEvent};
use crate::traits::{LlmProvider, ProviderError, TextStream};

const OPENROUTER_REFERER: &str = "https://github.com/nborwankar/aishell";
const OPENROUTER_TITLE: &str = "AIShell";

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    total_tokens: Option<u32>,
}

impl From<ChatUsage> for Usage {
    fn from(u: ChatUsage) -> Self {
        Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u
                .total_tokens
                .unwrap_or(u.prompt_tokens + u.completion_tokens),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

// ─────────────────────────────────────────────
// OpenAiCompatProvider
// ─────────────────────────────────────────────

/// Talks to any OpenAI-compatible chat completions endpoint.
pub struct OpenAiCompatProvider {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    config: ProviderConfig,
    /// Extra headers sent with each request (OpenRouter attribution).
    extra_headers: HeaderMap,
    spec: &'static ProviderSpec,
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("provider", &self.spec.display_name)
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

impl OpenAiCompatProvider {
    /// Client for api.openai.com (or a compatible base URL).
    pub fn openai(config: ProviderConfig) -> Self {
        Self::with_spec(config, spec(ProviderKind::OpenAi), HeaderMap::new())
    }

    /// Client for OpenRouter, with its attribution headers.
    pub fn openrouter(config: ProviderConfig) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert("HTTP-Referer", HeaderValue::from_static(OPENROUTER_REFERER));
        headers.insert("X-Title", HeaderValue::from_static(OPENROUTER_TITLE));
        Self::with_spec(config, spec(ProviderKind::OpenRouter), headers)
    }

    fn with_spec(
        config: ProviderConfig,
        spec: &'static ProviderSpec,
        extra_headers: HeaderMap,
    ) -> Self {
        Self {
            client: build_client(Duration::from_secs(spec.timeout_secs)),
            config,
            extra_headers,
            spec,
        }
    }

    /// Build the full chat completions URL.
    fn completions_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{}/chat/completions", base)
    }

    fn request(&self, request: &QueryRequest, stream: bool) -> reqwest::RequestBuilder {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream,
        };
        self.client
            .post(self.completions_url())
            .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
            .headers(self.extra_headers.clone())
            .json(&body)
    }

    async fn try_query(&self, request: &QueryRequest) -> Result<(String, Option<Usage>), ProviderError> {
        let response = self.request(request, false).send().await?;
        let response = check_status(self.spec.display_name, response).await?;
        let body: ChatResponse = serde_json::from_str(&response.text().await?)?;

        let content = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("response contained no choices".into()))?
            .message
            .content
            .unwrap_or_default();
        Ok((content, body.usage.map(Usage::from)))
    }
}

/// Parse one SSE line of a streamed chat completion.
fn parse_stream_line(line: &str) -> Result<LineEvent, ProviderError> {
    if line.trim() == "data: [DONE]" || line.trim() == "data:[DONE]" {
        return Ok(LineEvent::Done);
    }
    let Some(data) = sse_data(line) else {
        return Ok(LineEvent::Skip);
    };
    let chunk: StreamChunk = serde_json::from_str(data)?;
    if let Some(err) = chunk.error {
        return Err(ProviderError::Stream(err.message));
    }
    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect();
    Ok(LineEvent::Text(text))
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn query(&self, request: &QueryRequest) -> QueryResult {
        debug!(
            provider = self.spec.display_name,
            model = %self.config.model,
            prompt_len = request.prompt.len(),
            "Calling LLM"
        );

        match self.try_query(request).await {
            Ok((text, usage)) => {
                debug!(
                    provider = self.spec.display_name,
                    total_tokens = usage.as_ref().map_or(0, |u| u.total_tokens),
                    "LLM response received"
                );
                QueryResult::success(self.name(), &self.config.model, text, usage)
            }
            Err(e) => {
                error!(provider = self.spec.display_name, error = %e, "LLM query failed");
                QueryResult::failure(self.name(), failure_message(self.spec.display_name, &e))
            }
        }
    }

    fn stream(&self, request: &QueryRequest) -> TextStream {
        line_stream(
            self.spec.display_name,
            self.request(request, true),
            parse_stream_line,
        )
    }

    fn name(&self) -> &str {
        self.spec.name()
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

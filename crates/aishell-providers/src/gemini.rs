//! Google Gemini client (`models/{model}:generateContent`).
//!
//! The API key travels in the `x-goog-api-key` header. Streaming uses
//! `:streamGenerateContent?alt=sse`, where every event is a full
//! `GenerateContentResponse` carrying the next slice of text.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use aishell_core::types::{ProviderConfig, ProviderKind, QueryRequest, QueryResult, Usage};

use crate::http::{build_client, check_status, failure_message};
use crate::registry::{spec, ProviderSpec};
use crate::sse::{line_stream, sse_data, LineEvent};
use crate::traits::{LlmProvider, ProviderError, TextStream};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    total_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// Text of the first candidate, all parts joined.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
            .unwrap_or_default()
    }

    fn blocked(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
    }
}

/// Gemini via the Generative Language API.
pub struct GeminiProvider {
    client: reqwest::Client,
    config: ProviderConfig,
    spec: &'static ProviderSpec,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let spec = spec(ProviderKind::Gemini);
        Self {
            client: build_client(Duration::from_secs(spec.timeout_secs)),
            config,
            spec,
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            method
        )
    }

    fn request(&self, request: &QueryRequest, stream: bool) -> reqwest::RequestBuilder {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        };
        let key = self.config.api_key.as_deref().unwrap_or_default();
        let builder = if stream {
            self.client
                .post(self.endpoint("streamGenerateContent"))
                .query(&[("alt", "sse")])
        } else {
            self.client.post(self.endpoint("generateContent"))
        };
        builder.header("x-goog-api-key", key).json(&body)
    }

    async fn try_query(&self, request: &QueryRequest) -> Result<(String, Option<Usage>), ProviderError> {
        let response = self.request(request, false).send().await?;
        let response = check_status(self.spec.display_name, response).await?;
        let body: GenerateResponse = serde_json::from_str(&response.text().await?)?;

        if let Some(reason) = body.blocked() {
            return Err(ProviderError::Malformed(format!("prompt blocked ({reason})")));
        }
        if body.candidates.is_empty() {
            return Err(ProviderError::Malformed("response contained no candidates".into()));
        }

        let usage = body.usage_metadata.as_ref().map(|u| Usage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
            total_tokens: u
                .total_token_count
                .unwrap_or(u.prompt_token_count + u.candidates_token_count),
        });
        Ok((body.text(), usage))
    }
}

fn parse_stream_line(line: &str) -> Result<LineEvent, ProviderError> {
    let Some(data) = sse_data(line) else {
        return Ok(LineEvent::Skip);
    };
    let chunk: GenerateResponse = serde_json::from_str(data)?;
    if let Some(reason) = chunk.blocked() {
        return Err(ProviderError::Stream(format!("prompt blocked ({reason})")));
    }
    Ok(LineEvent::Text(chunk.text()))
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn query(&self, request: &QueryRequest) -> QueryResult {
        debug!(
            provider = self.spec.display_name,
            model = %self.config.model,
            prompt_len = request.prompt.len(),
            "Calling LLM"
        );

        match self.try_query(request).await {
            Ok((text, usage)) => QueryResult::success(self.name(), &self.config.model, text, usage),
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

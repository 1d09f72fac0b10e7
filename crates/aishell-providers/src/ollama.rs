//! Ollama client (`POST /api/generate`) for locally hosted models.
//!
//! No API key. Streaming responses are NDJSON: one object per line with a
//! `response` fragment, the last one carrying `done: true` and token counts.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use aishell_core::types::{ProviderConfig, ProviderKind, QueryRequest, QueryResult, Usage};

use crate::http::{build_client, check_status, failure_message};
use crate::registry::{spec, ProviderSpec};
use crate::sse::{line_stream, LineEvent};
use crate::traits::{LlmProvider, ProviderError, TextStream};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: Options,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f64,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
    error: Option<String>,
}

/// Local models served by Ollama.
pub struct OllamaProvider {
    client: reqwest::Client,
    config: ProviderConfig,
    spec: &'static ProviderSpec,
}

impl std::fmt::Debug for OllamaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaProvider")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let spec = spec(ProviderKind::Ollama);
        Self {
            client: build_client(Duration::from_secs(spec.timeout_secs)),
            config,
            spec,
        }
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.config.base_url.trim_end_matches('/'))
    }

    fn request(&self, request: &QueryRequest, stream: bool) -> reqwest::RequestBuilder {
        let body = GenerateRequest {
            model: &self.config.model,
            prompt: &request.prompt,
            stream,
            options: Options {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };
        self.client.post(self.generate_url()).json(&body)
    }

    async fn try_query(&self, request: &QueryRequest) -> Result<(String, Option<Usage>), ProviderError> {
        let response = self.request(request, false).send().await?;
        let response = check_status(self.spec.display_name, response).await?;
        let body: GenerateResponse = serde_json::from_str(&response.text().await?)?;

        if let Some(err) = body.error {
            return Err(ProviderError::Malformed(err));
        }
        let usage = match (body.prompt_eval_count, body.eval_count) {
            (None, None) => None,
            (input, output) => Some(Usage::new(input.unwrap_or(0), output.unwrap_or(0))),
        };
        Ok((body.response, usage))
    }
}

fn parse_stream_line(line: &str) -> Result<LineEvent, ProviderError> {
    let chunk: GenerateResponse = serde_json::from_str(line)?;
    if let Some(err) = chunk.error {
        return Err(ProviderError::Stream(err));
    }
    if chunk.done {
        // the final object may still carry a last fragment
        return Ok(if chunk.response.is_empty() {
            LineEvent::Done
        } else {
            LineEvent::Text(chunk.response)
        });
    }
    Ok(LineEvent::Text(chunk.response))
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn query(&self, request: &QueryRequest) -> QueryResult {
        debug!(
            provider = self.spec.display_name,
            model = %self.config.model,
            base_url = %self.config.base_url,
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

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_config(base_url: &str) -> ProviderConfig {
        ProviderConfig {
            name: "ollama".into(),
            api_key: None,
            base_url: base_url.into(),
            model: "llama3.2".into(),
            default_temperature: 0.7,
            default_max_tokens: 4096,
        }
    }

    #[test]
    fn test_parse_ndjson_lines() {
        assert_eq!(
            parse_stream_line(r#"{"model":"llama3.2","response":"Hi","done":false}"#).unwrap(),
            LineEvent::Text("Hi".into())
        );
        assert_eq!(
            parse_stream_line(r#"{"response":"","done":true,"eval_count":3}"#).unwrap(),
            LineEvent::Done
        );
        assert!(matches!(
            parse_stream_line(r#"{"error":"model not found"}"#),
            Err(ProviderError::Stream(_))
        ));
    }

    #[tokio::test]
    async fn test_query_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama3.2",
                "prompt": "What is 2+2?",
                "stream": false,
                "options": {"temperature": 0.0, "num_predict": 200}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "llama3.2",
                "response": "4",
                "done": true,
                "prompt_eval_count": 26,
                "eval_count": 2
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = OllamaProvider::new(make_config(&mock_server.uri()));
        let request = QueryRequest::new("What is 2+2?").temperature(0.0).max_tokens(200);
        let result = provider.query(&request).await;

        assert_eq!(result.text(), Some("4"));
        assert_eq!(result.usage().unwrap().total_tokens, 28);
    }

    #[tokio::test]
    async fn test_query_model_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": "model \"llama9\" not found, try pulling it first"
            })))
            .mount(&mock_server)
            .await;

        let provider = OllamaProvider::new(make_config(&mock_server.uri()));
        let result = provider.query(&QueryRequest::new("hi")).await;
        let msg = result.error_message().unwrap();
        assert!(msg.starts_with("Ollama API error: 404 Not Found"));
        assert!(msg.contains("try pulling it first"));
    }

    #[tokio::test]
    async fn test_query_connection_refused() {
        // nothing listens on port 9 (discard) in the test environment
        let provider = OllamaProvider::new(make_config("http://127.0.0.1:9"));
        let result = provider.query(&QueryRequest::new("hi")).await;
        assert!(!result.is_success());
        assert!(result.error_message().unwrap().starts_with("Ollama"));
    }

    #[tokio::test]
    async fn test_stream_ndjson() {
        let mock_server = MockServer::start().await;

        let body = concat!(
            "{\"response\":\"The\",\"done\":false}\n",
            "{\"response\":\" answer\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true,\"eval_count\":2}\n",
        );
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({ "stream": true })))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;

        let provider = OllamaProvider::new(make_config(&mock_server.uri()));
        let chunks: Vec<String> = provider
            .stream(&QueryRequest::new("hi"))
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec!["The", " answer"]);
    }
}

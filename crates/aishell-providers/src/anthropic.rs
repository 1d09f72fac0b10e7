//! Anthropic Messages API client (`POST /v1/messages`).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use aishell_core::types::{ProviderConfig, ProviderKind, QueryRequest, QueryResult, Usage};

use crate::http::{build_client, check_status, failure_message};
use crate::registry::{spec, ProviderSpec};
use crate::sse::{line_stream, sse_data, LineEvent};
use crate::traits::{LlmProvider, ProviderError, TextStream};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// One SSE `data:` payload. Only the fields we read are modelled.
#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    delta: Option<StreamDelta>,
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

/// Claude via the Anthropic Messages API.
pub struct ClaudeProvider {
    client: reqwest::Client,
    config: ProviderConfig,
    spec: &'static ProviderSpec,
}

impl std::fmt::Debug for ClaudeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeProvider")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

impl ClaudeProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let spec = spec(ProviderKind::Claude);
        Self {
            client: build_client(Duration::from_secs(spec.timeout_secs)),
            config,
            spec,
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }

    fn request(&self, request: &QueryRequest, stream: bool) -> reqwest::RequestBuilder {
        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            stream,
        };
        self.client
            .post(self.messages_url())
            .header("x-api-key", self.config.api_key.as_deref().unwrap_or_default())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
    }

    async fn try_query(&self, request: &QueryRequest) -> Result<(String, Option<Usage>), ProviderError> {
        let response = self.request(request, false).send().await?;
        let response = check_status(self.spec.display_name, response).await?;
        let body: MessagesResponse = serde_json::from_str(&response.text().await?)?;

        let text: String = body
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text)
            .collect();
        let usage = body
            .usage
            .map(|u| Usage::new(u.input_tokens, u.output_tokens));
        Ok((text, usage))
    }
}

fn parse_stream_line(line: &str) -> Result<LineEvent, ProviderError> {
    let Some(data) = sse_data(line) else {
        return Ok(LineEvent::Skip);
    };
    let event: StreamEvent = serde_json::from_str(data)?;
    match event.kind.as_str() {
        "content_block_delta" => Ok(LineEvent::Text(
            event.delta.and_then(|d| d.text).unwrap_or_default(),
        )),
        "message_stop" => Ok(LineEvent::Done),
        "error" => Err(ProviderError::Stream(
            event
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "unknown stream error".to_string()),
        )),
        _ => Ok(LineEvent::Skip),
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
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

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_config(base_url: &str) -> ProviderConfig {
        ProviderConfig {
            name: "claude".into(),
            api_key: Some("sk-ant-test".into()),
            base_url: base_url.into(),
            model: "claude-3-5-sonnet-20241022".into(),
            default_temperature: 0.7,
            default_max_tokens: 4096,
        }
    }

    #[test]
    fn test_parse_stream_events() {
        let delta = r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#;
        assert_eq!(parse_stream_line(delta).unwrap(), LineEvent::Text("Hi".into()));
        assert_eq!(parse_stream_line("event: ping").unwrap(), LineEvent::Skip);
        assert_eq!(
            parse_stream_line(r#"data: {"type":"message_stop"}"#).unwrap(),
            LineEvent::Done
        );
        let err = r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert!(matches!(
            parse_stream_line(err),
            Err(ProviderError::Stream(ref m)) if m == "Overloaded"
        ));
    }

    #[tokio::test]
    async fn test_query_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(serde_json::json!({
                "model": "claude-3-5-sonnet-20241022",
                "messages": [{"role": "user", "content": "What is 2+2?"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_01",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": "4"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 14, "output_tokens": 1}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = ClaudeProvider::new(make_config(&mock_server.uri()));
        let result = provider.query(&QueryRequest::new("What is 2+2?")).await;

        assert_eq!(result.text(), Some("4"));
        assert_eq!(result.provider_name(), "claude");
        let usage = result.usage().unwrap();
        assert_eq!((usage.input_tokens, usage.output_tokens, usage.total_tokens), (14, 1, 15));
    }

    #[tokio::test]
    async fn test_query_invalid_key() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "type": "error",
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .mount(&mock_server)
            .await;

        let provider = ClaudeProvider::new(make_config(&mock_server.uri()));
        let result = provider.query(&QueryRequest::new("hi")).await;
        assert_eq!(
            result.error_message(),
            Some("Claude API error: 401 Unauthorized — invalid x-api-key")
        );
    }

    #[tokio::test]
    async fn test_stream_text_deltas() {
        let mock_server = MockServer::start().await;

        let body = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Two plus\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" two is 4\"}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(serde_json::json!({ "stream": true })))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;

        let provider = ClaudeProvider::new(make_config(&mock_server.uri()));
        let text: String = provider
            .stream(&QueryRequest::new("hi"))
            .map(|c| c.unwrap())
            .collect::<Vec<_>>()
            .await
            .concat();
        assert_eq!(text, "Two plus two is 4");
    }

    #[tokio::test]
    async fn test_stream_error_event_ends_stream() {
        let mock_server = MockServer::start().await;

        let body = concat!(
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"partial\"}}\n\n",
            "data: {\"type\":\"error\",\"error\":{\"message\":\"Overloaded\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"never\"}}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;

        let provider = ClaudeProvider::new(make_config(&mock_server.uri()));
        let items: Vec<_> = provider.stream(&QueryRequest::new("hi")).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(items[1].is_err());
    }
}

//! Minimal MCP (Model Context Protocol) client: JSON-RPC 2.0 over HTTP POST
//! to `{server}/mcp`.
//!
//! Transport failures and non-200 statuses are returned as error-carrying
//! [`McpResponse`] values, so callers handle one shape for every outcome.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

const PROTOCOL_VERSION: &str = "0.1.0";

/// JSON-RPC "internal error" code, used for transport and decoding failures.
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("invalid MCP server URL '{0}'")]
    InvalidUrl(String),

    #[error("unknown MCP server '{name}' (configured: {known})")]
    UnknownServer { name: String, known: String },

    #[error("unknown MCP method '{0}'")]
    UnknownMethod(String),

    #[error("failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

// ─────────────────────────────────────────────
// Protocol types
// ─────────────────────────────────────────────

/// Methods the client knows how to send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum McpMethod {
    Initialize,
    Ping,
    ToolsList,
    ToolsCall,
    ResourcesList,
    ResourcesRead,
    PromptsList,
    PromptsGet,
}

impl McpMethod {
    pub const ALL: [McpMethod; 8] = [
        McpMethod::Initialize,
        McpMethod::Ping,
        McpMethod::ToolsList,
        McpMethod::ToolsCall,
        McpMethod::ResourcesList,
        McpMethod::ResourcesRead,
        McpMethod::PromptsList,
        McpMethod::PromptsGet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            McpMethod::Initialize => "initialize",
            McpMethod::Ping => "ping",
            McpMethod::ToolsList => "tools/list",
            McpMethod::ToolsCall => "tools/call",
            McpMethod::ResourcesList => "resources/list",
            McpMethod::ResourcesRead => "resources/read",
            McpMethod::PromptsList => "prompts/list",
            McpMethod::PromptsGet => "prompts/get",
        }
    }
}

impl fmt::Display for McpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for McpMethod {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| McpError::UnknownMethod(s.to_string()))
    }
}

/// A JSON-RPC 2.0 request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A JSON-RPC 2.0 response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct McpResponse {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<McpRpcError>,
}

/// A JSON-RPC 2.0 error object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct McpRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

impl McpResponse {
    /// Error response for request `id`.
    pub fn failure(id: u64, code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id: Some(json!(id)),
            result: None,
            error: Some(McpRpcError {
                code,
                message: message.into(),
                data,
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

// ─────────────────────────────────────────────
// McpClient
// ─────────────────────────────────────────────

/// Client for one MCP server.
#[derive(Debug)]
pub struct McpClient {
    server_url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl McpClient {
    /// `url` is the server base; requests go to `{url}/mcp`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, McpError> {
        let server_url = url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&server_url).map_err(|_| McpError::InvalidUrl(url.to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("aishell/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            server_url,
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Send one request and wait for its response.
    pub async fn send(&self, method: &str, params: Option<Value>) -> McpResponse {
        let request = McpRequest {
            jsonrpc: jsonrpc_version(),
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            method: method.to_string(),
            params,
        };
        let id = request.id;
        debug!(server = %self.server_url, method = %method, id = id, "Sending MCP request");

        let response = match self
            .http
            .post(format!("{}/mcp", self.server_url))
            .json(&request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(server = %self.server_url, "MCP request failed: {}", e);
                return McpResponse::failure(id, INTERNAL_ERROR, "Internal error", Some(json!(e.to_string())));
            }
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(server = %self.server_url, status = status.as_u16(), "MCP server returned an error status");
            return McpResponse::failure(
                id,
                i64::from(status.as_u16()),
                format!("HTTP error: {}", status.as_u16()),
                Some(json!(body)),
            );
        }

        match response.json::<McpResponse>().await {
            Ok(parsed) => parsed,
            Err(e) => McpResponse::failure(id, INTERNAL_ERROR, "Internal error", Some(json!(e.to_string()))),
        }
    }

    /// Send a known method.
    pub async fn call(&self, method: McpMethod, params: Option<Value>) -> McpResponse {
        self.send(method.as_str(), params).await
    }

    pub async fn initialize(&self, client_info: Option<Value>) -> McpResponse {
        let mut params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": true, "resources": true, "prompts": true}
        });
        if let Some(info) = client_info {
            params["clientInfo"] = info;
        }
        self.call(McpMethod::Initialize, Some(params)).await
    }

    pub async fn ping(&self) -> McpResponse {
        self.call(McpMethod::Ping, None).await
    }

    pub async fn list_tools(&self) -> McpResponse {
        self.call(McpMethod::ToolsList, None).await
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpResponse {
        self.call(
            McpMethod::ToolsCall,
            Some(json!({"name": name, "arguments": arguments})),
        )
        .await
    }

    pub async fn list_resources(&self) -> McpResponse {
        self.call(McpMethod::ResourcesList, None).await
    }

    pub async fn read_resource(&self, uri: &str) -> McpResponse {
        self.call(McpMethod::ResourcesRead, Some(json!({"uri": uri})))
            .await
    }

    pub async fn list_prompts(&self) -> McpResponse {
        self.call(McpMethod::PromptsList, None).await
    }

    pub async fn get_prompt(&self, name: &str, arguments: Option<Value>) -> McpResponse {
        let mut params = json!({"name": name});
        if let Some(args) = arguments {
            params["arguments"] = args;
        }
        self.call(McpMethod::PromptsGet, Some(params)).await
    }
}

/// Map a server argument to a URL: URLs pass through, anything else is
/// looked up among the configured servers.
pub fn resolve_server(server: &str, servers: &BTreeMap<String, String>) -> Result<String, McpError> {
    if server.starts_with("http://") || server.starts_with("https://") {
        return Ok(server.to_string());
    }
    servers
        .get(server)
        .or_else(|| servers.get(&server.to_lowercase()))
        .cloned()
        .ok_or_else(|| McpError::UnknownServer {
            name: server.to_string(),
            known: if servers.is_empty() {
                "none".to_string()
            } else {
                servers.keys().cloned().collect::<Vec<_>>().join(", ")
            },
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(uri: &str) -> McpClient {
        McpClient::new(uri, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_method_names_round_trip() {
        for m in McpMethod::ALL {
            assert_eq!(m.as_str().parse::<McpMethod>().unwrap(), m);
        }
        assert!(matches!(
            "tools/delete".parse::<McpMethod>(),
            Err(McpError::UnknownMethod(_))
        ));
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            McpClient::new("not a url", Duration::from_secs(1)),
            Err(McpError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_resolve_server() {
        let servers: BTreeMap<String, String> =
            [("files".to_string(), "http://localhost:8000".to_string())].into();
        assert_eq!(resolve_server("files", &servers).unwrap(), "http://localhost:8000");
        assert_eq!(resolve_server("https://x.dev", &servers).unwrap(), "https://x.dev");
        let err = resolve_server("git", &servers).unwrap_err();
        assert!(err.to_string().contains("configured: files"));
    }

    #[tokio::test]
    async fn test_initialize_sends_protocol_version() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({
                "jsonrpc": "2.0",
                "method": "initialize",
                "params": {
                    "protocolVersion": "0.1.0",
                    "capabilities": {"tools": true, "resources": true, "prompts": true},
                    "clientInfo": {"name": "aishell"}
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"serverInfo": {"name": "test-server"}}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let response = client(&mock_server.uri())
            .initialize(Some(json!({"name": "aishell"})))
            .await;
        assert!(!response.is_error());
        assert_eq!(response.result.unwrap()["serverInfo"]["name"], "test-server");
    }

    #[tokio::test]
    async fn test_ids_increment() {
        let mock_server = MockServer::start().await;

        for id in [1, 2] {
            Mock::given(method("POST"))
                .and(path("/mcp"))
                .and(body_partial_json(json!({"id": id, "method": "ping"})))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "jsonrpc": "2.0", "id": id, "result": {}
                })))
                .expect(1)
                .mount(&mock_server)
                .await;
        }

        let client = client(&format!("{}/", mock_server.uri()));
        assert_eq!(client.ping().await.id, Some(json!(1)));
        assert_eq!(client.ping().await.id, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_call_tool_params() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({
                "method": "tools/call",
                "params": {"name": "echo", "arguments": {"text": "hi"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"content": [{"type": "text", "text": "hi"}]}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let response = client(&mock_server.uri())
            .call_tool("echo", json!({"text": "hi"}))
            .await;
        assert_eq!(response.result.unwrap()["content"][0]["text"], "hi");
    }

    #[tokio::test]
    async fn test_rpc_error_passes_through() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32601, "message": "Method not found"}
            })))
            .mount(&mock_server)
            .await;

        let response = client(&mock_server.uri()).read_resource("file:///x").await;
        let error = response.error.unwrap();
        assert_eq!(error.code, -32601);
        assert_eq!(error.message, "Method not found");
    }

    #[tokio::test]
    async fn test_http_status_becomes_error_value() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&mock_server)
            .await;

        let response = client(&mock_server.uri()).list_tools().await;
        let error = response.error.unwrap();
        assert_eq!(error.code, 503);
        assert_eq!(error.message, "HTTP error: 503");
        assert_eq!(error.data, Some(json!("overloaded")));
    }

    #[tokio::test]
    async fn test_transport_failure_becomes_internal_error() {
        // nothing listens on the discard port
        let response = client("http://127.0.0.1:9").list_prompts().await;
        let error = response.error.unwrap();
        assert_eq!(error.code, INTERNAL_ERROR);
        assert_eq!(response.id, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_invalid_json_becomes_internal_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let response = client(&mock_server.uri()).get_prompt("greet", None).await;
        assert_eq!(response.error.unwrap().code, INTERNAL_ERROR);
    }
}

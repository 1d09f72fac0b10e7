//! Natural-language requests → MCP calls.
//!
//! Common phrasings ("list tools", "call the weather tool with city=Paris",
//! "read resource file:///notes.md") are matched with regular expressions.
//! Anything else can be handed to an LLM that answers with a JSON-RPC
//! message.

use std::sync::LazyLock;

use anyhow::anyhow;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info};

use aishell_core::types::QueryRequest;
use aishell_providers::Dispatcher;

use crate::mcp::McpMethod;

const TEMPERATURE: f64 = 0.3;
const MAX_TOKENS: u32 = 200;

/// Starters offered when a request could not be translated.
const STARTERS: &[&str] = &[
    "list tools",
    "list resources",
    "list prompts",
    "call tool",
    "read resource",
    "get prompt",
    "ping server",
    "use tool",
    "show available tools",
    "what can you do",
];

/// A method plus parameters, ready for [`McpClient::call`](crate::McpClient::call).
#[derive(Clone, Debug, PartialEq)]
pub struct McpCall {
    pub method: McpMethod,
    pub params: Option<Value>,
}

impl McpCall {
    fn bare(method: McpMethod) -> Self {
        Self { method, params: None }
    }
}

#[derive(Clone, Copy, Debug)]
enum Operation {
    ListTools,
    CallTool,
    ListResources,
    ReadResource,
    ListPrompts,
    GetPrompt,
    Ping,
}

// Checked in order; the first matching pattern that yields a call wins.
const PATTERNS: &[(Operation, &[&str])] = &[
    (
        Operation::ListTools,
        &[
            r"(list|show|get|what).*(tools?|functions?|capabilities)",
            r"what can (you|the server) do",
            r"available (tools?|functions?)",
        ],
    ),
    (
        Operation::CallTool,
        &[
            r"(call|run|execute|use)\s+(?:the\s+)?(\w+)\s+(?:tool|function)",
            r"(\w+)\s+tool\s+with",
            r"use\s+(\w+)\s+to",
        ],
    ),
    (
        Operation::ListResources,
        &[
            r"(list|show|get|what).*(resources?|files?|data)",
            r"available (resources?|files?)",
        ],
    ),
    (
        Operation::ReadResource,
        &[
            r"(read|get|show|fetch)\s+(?:the\s+)?(?:resource|file)\s+(.+)",
            r"(read|get|show)\s+(.+)\s+(?:resource|file)",
        ],
    ),
    (
        Operation::ListPrompts,
        &[
            r"(list|show|get|what).*(prompts?|templates?)",
            r"available (prompts?|templates?)",
        ],
    ),
    (
        Operation::GetPrompt,
        &[
            r"(get|show|use)\s+(?:the\s+)?(\w+)\s+prompt",
            r"prompt\s+(?:named\s+)?(\w+)",
        ],
    ),
    (Operation::Ping, &[r"ping", r"test connection", r"check server"]),
];

static COMPILED: LazyLock<Vec<(Operation, Regex)>> = LazyLock::new(|| {
    PATTERNS
        .iter()
        .flat_map(|(op, patterns)| {
            patterns
                .iter()
                .filter_map(move |p| Regex::new(p).ok().map(|re| (*op, re)))
        })
        .collect()
});

static JSON_OBJECT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\{[^}]+\}").ok());

static KEY_VALUE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(\w+)=(?:"([^"]*)"|'([^']*)'|([^"'\s]+))"#).ok());

/// Arguments written inline in a request.
///
/// A `{…}` JSON object wins; otherwise `key=value` pairs (values may be
/// quoted) become a string map.
pub fn extract_json_args(text: &str) -> Option<Value> {
    if let Some(m) = JSON_OBJECT.as_ref().and_then(|re| re.find(text)) {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(m.as_str()) {
            return Some(value);
        }
    }

    let re = KEY_VALUE.as_ref()?;
    let pairs: Map<String, Value> = re
        .captures_iter(text)
        .filter_map(|caps| {
            let value = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4))?;
            Some((caps[1].to_string(), Value::String(value.as_str().to_string())))
        })
        .collect();
    (!pairs.is_empty()).then_some(Value::Object(pairs))
}

/// Translate a request with the built-in patterns only.
pub fn parse_simple(query: &str) -> Option<McpCall> {
    let query = query.trim();
    // ASCII lowering keeps byte offsets aligned with `query`
    let lower = query.to_ascii_lowercase();

    for (op, re) in COMPILED.iter() {
        let Some(caps) = re.captures(&lower) else {
            continue;
        };
        let last = caps.iter().skip(1).flatten().last();
        let call = match op {
            Operation::ListTools => Some(McpCall::bare(McpMethod::ToolsList)),
            Operation::ListResources => Some(McpCall::bare(McpMethod::ResourcesList)),
            Operation::ListPrompts => Some(McpCall::bare(McpMethod::PromptsList)),
            Operation::Ping => Some(McpCall::bare(McpMethod::Ping)),
            Operation::CallTool => last.map(|name| McpCall {
                method: McpMethod::ToolsCall,
                params: Some(serde_json::json!({
                    "name": name.as_str(),
                    "arguments": extract_json_args(query).unwrap_or_else(|| Value::Object(Map::new())),
                })),
            }),
            Operation::ReadResource => last.map(|uri| McpCall {
                method: McpMethod::ResourcesRead,
                params: Some(serde_json::json!({ "uri": query[uri.range()].trim() })),
            }),
            Operation::GetPrompt => last.map(|name| {
                let mut params = Map::new();
                params.insert("name".into(), Value::String(name.as_str().to_string()));
                if let Some(args) = extract_json_args(query) {
                    params.insert("arguments".into(), args);
                }
                McpCall {
                    method: McpMethod::PromptsGet,
                    params: Some(Value::Object(params)),
                }
            }),
        };
        if call.is_some() {
            debug!(operation = ?op, pattern = re.as_str(), "Matched MCP request");
            return call;
        }
    }
    None
}

/// Up to five request starters beginning with `partial`.
pub fn suggestions(partial: &str) -> Vec<&'static str> {
    let partial = partial.trim().to_lowercase();
    STARTERS
        .iter()
        .copied()
        .filter(|s| s.starts_with(&partial))
        .take(5)
        .collect()
}

/// Pull the first JSON-RPC message out of a model answer.
pub fn parse_llm_answer(answer: &str) -> Option<McpCall> {
    let start = answer.find('{')?;
    let value = serde_json::Deserializer::from_str(&answer[start..])
        .into_iter::<Value>()
        .next()?
        .ok()?;
    let method: McpMethod = value.get("method")?.as_str()?.parse().ok()?;
    let params = value.get("params").filter(|p| !p.is_null()).cloned();
    Some(McpCall { method, params })
}

/// Pattern translation with an optional LLM fallback.
#[derive(Clone, Debug, Default)]
pub struct McpTranslator {
    llm: Option<(Dispatcher, String)>,
    context: Option<String>,
}

impl McpTranslator {
    /// Translator that only uses the built-in patterns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask `provider` when no pattern matches.
    pub fn with_llm(mut self, dispatcher: Dispatcher, provider: impl Into<String>) -> Self {
        self.llm = Some((dispatcher, provider.into()));
        self
    }

    /// Extra context (usually [`context_prompt`](crate::mcp_capabilities::context_prompt))
    /// included in the LLM prompt.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Translate `query`.
    ///
    /// `Ok(None)` when neither the patterns nor the model produced a usable
    /// call. A failed model query is an error.
    pub async fn translate(&self, query: &str) -> anyhow::Result<Option<McpCall>> {
        if let Some(call) = parse_simple(query) {
            return Ok(Some(call));
        }
        let Some((dispatcher, provider)) = &self.llm else {
            return Ok(None);
        };

        info!(provider = %provider, "Translating MCP request with LLM");
        let request = QueryRequest::new(self.build_prompt(query))
            .temperature(TEMPERATURE)
            .max_tokens(MAX_TOKENS);
        let result = dispatcher.dispatch_single(provider, &request).await?;
        match result.text() {
            Some(text) => Ok(parse_llm_answer(text)),
            None => Err(anyhow!(
                "{}",
                result.error_message().unwrap_or("translation failed")
            )),
        }
    }

    fn build_prompt(&self, query: &str) -> String {
        let methods = McpMethod::ALL
            .iter()
            .map(|m| format!("- {}{}", m.as_str(), method_params(*m)))
            .collect::<Vec<_>>()
            .join("\n");
        let context = self
            .context
            .as_deref()
            .map(|c| format!("{c}\n\n"))
            .unwrap_or_default();
        format!(
            "{context}Convert the following natural language query into an MCP (Model Context Protocol) JSON-RPC message.\n\n\
             Available MCP methods:\n{methods}\n\n\
             Query: {query}\n\n\
             Respond with ONLY the JSON-RPC message object, no explanation. Example:\n\
             {{\"jsonrpc\": \"2.0\", \"method\": \"tools/list\"}}"
        )
    }
}

fn method_params(method: McpMethod) -> &'static str {
    match method {
        McpMethod::ToolsCall => " (params: name, arguments)",
        McpMethod::ResourcesRead => " (params: uri)",
        McpMethod::PromptsGet => " (params: name, arguments)",
        McpMethod::Initialize => " (params: clientInfo)",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use aishell_core::types::{ProviderConfig, ProviderKind, QueryResult};
    use aishell_core::{Config, TranscriptLogger};
    use aishell_providers::{LlmProvider, ProviderError, ProviderRegistry, TextStream};

    #[test]
    fn list_requests() {
        assert_eq!(parse_simple("list tools").unwrap(), McpCall::bare(McpMethod::ToolsList));
        assert_eq!(parse_simple("What can you do?").unwrap().method, McpMethod::ToolsList);
        assert_eq!(parse_simple("show me the resources").unwrap().method, McpMethod::ResourcesList);
        assert_eq!(parse_simple("list prompts").unwrap().method, McpMethod::PromptsList);
        assert_eq!(parse_simple("ping").unwrap().method, McpMethod::Ping);
        assert_eq!(parse_simple("test connection").unwrap().method, McpMethod::Ping);
    }

    #[test]
    fn call_tool_with_key_values() {
        let call = parse_simple("call the weather tool with city=Paris units=\"metric\"").unwrap();
        assert_eq!(call.method, McpMethod::ToolsCall);
        assert_eq!(
            call.params.unwrap(),
            json!({"name": "weather", "arguments": {"city": "Paris", "units": "metric"}})
        );
    }

    #[test]
    fn call_tool_with_json_and_no_args() {
        let call = parse_simple(r#"run echo tool {"text": "hi"}"#).unwrap();
        assert_eq!(call.params.unwrap(), json!({"name": "echo", "arguments": {"text": "hi"}}));

        let call = parse_simple("use search to find things").unwrap();
        assert_eq!(call.params.unwrap(), json!({"name": "search", "arguments": {}}));
    }

    #[test]
    fn read_resource_keeps_uri_case() {
        let call = parse_simple("read resource file:///Notes/TODO.md").unwrap();
        assert_eq!(call.method, McpMethod::ResourcesRead);
        assert_eq!(call.params.unwrap(), json!({"uri": "file:///Notes/TODO.md"}));
    }

    #[test]
    fn get_prompt_with_arguments() {
        let call = parse_simple("prompt named review lang=rust").unwrap();
        assert_eq!(call.method, McpMethod::PromptsGet);
        assert_eq!(
            call.params.unwrap(),
            json!({"name": "review", "arguments": {"lang": "rust"}})
        );

        let call = parse_simple("use the summary prompt").unwrap();
        assert_eq!(call.params.unwrap(), json!({"name": "summary"}));
    }

    #[test]
    fn unmatched_request() {
        assert!(parse_simple("make me a sandwich").is_none());
    }

    #[test]
    fn extract_args() {
        assert_eq!(extract_json_args(r#"x {"a": 1} y"#), Some(json!({"a": 1})));
        assert_eq!(extract_json_args("a='one two' b=3"), Some(json!({"a": "one two", "b": "3"})));
        assert_eq!(extract_json_args("nothing here"), None);
    }

    #[test]
    fn suggestion_prefixes() {
        assert_eq!(suggestions("list"), vec!["list tools", "list resources", "list prompts"]);
        assert_eq!(suggestions("").len(), 5);
        assert!(suggestions("zzz").is_empty());
    }

    #[test]
    fn llm_answer_parsing() {
        let call = parse_llm_answer(
            "Sure:\n```json\n{\"jsonrpc\": \"2.0\", \"method\": \"resources/read\", \"params\": {\"uri\": \"db://users\"}}\n```",
        )
        .unwrap();
        assert_eq!(call.method, McpMethod::ResourcesRead);
        assert_eq!(call.params.unwrap(), json!({"uri": "db://users"}));

        assert!(parse_llm_answer("{\"method\": \"resources/write\"}").is_none());
        assert!(parse_llm_answer("no json").is_none());
    }

    struct CannedProvider {
        answer: String,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        async fn query(&self, request: &QueryRequest) -> QueryResult {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            QueryResult::success("ollama", "mock", &self.answer, None)
        }

        fn stream(&self, _request: &QueryRequest) -> TextStream {
            Box::pin(futures::stream::empty::<Result<String, ProviderError>>())
        }

        fn name(&self) -> &str {
            "ollama"
        }

        fn model(&self) -> &str {
            "mock"
        }
    }

    fn translator(answer: &str) -> (McpTranslator, Arc<Mutex<Vec<String>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&prompts);
        let answer = answer.to_string();
        let registry = ProviderRegistry::new(Arc::new(Config::default())).with_constructor(
            ProviderKind::Ollama,
            move |_: ProviderConfig| {
                Arc::new(CannedProvider {
                    answer: answer.clone(),
                    prompts: Arc::clone(&seen),
                }) as Arc<dyn LlmProvider>
            },
        );
        let dispatcher = Dispatcher::new(Arc::new(registry), Arc::new(TranscriptLogger::disabled()));
        (
            McpTranslator::new()
                .with_llm(dispatcher, "ollama")
                .with_context("## GITHUB - GitHub repository and API management"),
            prompts,
        )
    }

    #[tokio::test]
    async fn patterns_win_over_llm() {
        let (t, prompts) = translator(r#"{"method": "ping"}"#);
        let call = t.translate("list tools").await.unwrap().unwrap();
        assert_eq!(call.method, McpMethod::ToolsList);
        assert!(prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn llm_fallback() {
        let (t, prompts) = translator(
            r#"{"jsonrpc": "2.0", "method": "tools/call", "params": {"name": "issues", "arguments": {"state": "open"}}}"#,
        );
        let call = t.translate("how many bugs are open on the tracker").await.unwrap().unwrap();
        assert_eq!(call.method, McpMethod::ToolsCall);
        assert_eq!(call.params.unwrap()["name"], "issues");

        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("## GITHUB"));
        assert!(prompts[0].contains("- resources/read (params: uri)"));
        assert!(prompts[0].contains("Query: how many bugs are open on the tracker"));
    }

    #[tokio::test]
    async fn unusable_llm_answer() {
        let (t, _) = translator("I cannot help with that.");
        assert_eq!(t.translate("how many bugs are open").await.unwrap(), None);
    }

    #[tokio::test]
    async fn no_llm_configured() {
        assert_eq!(McpTranslator::new().translate("make me a sandwich").await.unwrap(), None);
    }
}

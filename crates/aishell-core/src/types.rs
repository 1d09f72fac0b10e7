//! Dispatch data model — provider names, requests, results, transcript entries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::schema::Defaults;
use crate::error::RegistryError;

// ─────────────────────────────────────────────
// ProviderKind
// ─────────────────────────────────────────────

/// The closed set of supported LLM providers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Claude,
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
    Ollama,
    #[serde(rename = "openrouter")]
    OpenRouter,
}

impl ProviderKind {
    /// Every provider, in display order.
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::Claude,
        ProviderKind::OpenAi,
        ProviderKind::Gemini,
        ProviderKind::Ollama,
        ProviderKind::OpenRouter,
    ];

    /// Canonical lowercase name used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "claude",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenRouter => "openrouter",
        }
    }

    /// Vendor API base URL used when none is configured.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "https://api.anthropic.com",
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::Ollama => "http://localhost:11434",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "claude-3-5-sonnet-20241022",
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Gemini => "gemini-1.5-flash",
            ProviderKind::Ollama => "llama3.2",
            ProviderKind::OpenRouter => "anthropic/claude-3.5-sonnet",
        }
    }

    /// Whether the provider refuses to run without an API key.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }

    /// Comma-separated list of every valid name, for error messages.
    pub fn valid_names() -> String {
        Self::ALL
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| RegistryError::UnknownProvider {
                name: s.to_string(),
                valid: Self::valid_names(),
            })
    }
}

// ─────────────────────────────────────────────
// ProviderConfig
// ─────────────────────────────────────────────

/// Fully resolved settings for one provider client.
///
/// Produced from a [`Config`](crate::config::Config) snapshot; never mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub default_temperature: f64,
    pub default_max_tokens: u32,
}

// ─────────────────────────────────────────────
// QueryRequest
// ─────────────────────────────────────────────

/// One prompt plus sampling parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryRequest {
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
}

impl QueryRequest {
    /// Create a request with the stock parameters (0.7, 4096 tokens).
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: 0.7,
            max_tokens: 4096,
            stream: false,
        }
    }

    /// Create a request using the configured defaults.
    pub fn from_defaults(prompt: impl Into<String>, defaults: &Defaults) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            stream: false,
        }
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

// ─────────────────────────────────────────────
// QueryResult
// ─────────────────────────────────────────────

/// Token usage reported by a vendor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Build usage with `total = input + output`.
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "input_tokens: {}, output_tokens: {}, total_tokens: {}",
            self.input_tokens, self.output_tokens, self.total_tokens
        )
    }
}

/// Outcome of one provider query: text or an error, never both.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum QueryResult {
    Success {
        text: String,
        usage: Option<Usage>,
        provider_name: String,
        model_name: String,
    },
    Failure {
        provider_name: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl QueryResult {
    /// Successful result; the text is trimmed.
    pub fn success(
        provider_name: impl Into<String>,
        model_name: impl Into<String>,
        text: impl AsRef<str>,
        usage: Option<Usage>,
    ) -> Self {
        QueryResult::Success {
            text: text.as_ref().trim().to_string(),
            usage,
            provider_name: provider_name.into(),
            model_name: model_name.into(),
        }
    }

    /// Failed result stamped with the current time.
    pub fn failure(provider_name: impl Into<String>, error_message: impl Into<String>) -> Self {
        QueryResult::Failure {
            provider_name: provider_name.into(),
            error_message: error_message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, QueryResult::Success { .. })
    }

    pub fn provider_name(&self) -> &str {
        match self {
            QueryResult::Success { provider_name, .. } => provider_name,
            QueryResult::Failure { provider_name, .. } => provider_name,
        }
    }

    /// Response text, if this is a success.
    pub fn text(&self) -> Option<&str> {
        match self {
            QueryResult::Success { text, .. } => Some(text),
            QueryResult::Failure { .. } => None,
        }
    }

    /// Error message, if this is a failure.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            QueryResult::Success { .. } => None,
            QueryResult::Failure { error_message, .. } => Some(error_message),
        }
    }

    pub fn model_name(&self) -> Option<&str> {
        match self {
            QueryResult::Success { model_name, .. } => Some(model_name),
            QueryResult::Failure { .. } => None,
        }
    }

    pub fn usage(&self) -> Option<&Usage> {
        match self {
            QueryResult::Success { usage, .. } => usage.as_ref(),
            QueryResult::Failure { .. } => None,
        }
    }
}

// ─────────────────────────────────────────────
// CollationResult
// ─────────────────────────────────────────────

/// One result per requested provider, in request order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CollationResult(Vec<QueryResult>);

impl CollationResult {
    pub fn new(results: Vec<QueryResult>) -> Self {
        Self(results)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QueryResult> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[QueryResult] {
        &self.0
    }

    pub fn successes(&self) -> impl Iterator<Item = &QueryResult> {
        self.0.iter().filter(|r| r.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &QueryResult> {
        self.0.iter().filter(|r| !r.is_success())
    }

    pub fn into_inner(self) -> Vec<QueryResult> {
        self.0
    }
}

impl<'a> IntoIterator for &'a CollationResult {
    type Item = &'a QueryResult;
    type IntoIter = std::slice::Iter<'a, QueryResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ─────────────────────────────────────────────
// TranscriptEntry
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DispatchKind {
    Single,
    Collation,
}

/// A completed dispatch, as recorded in the transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: DispatchKind,
    pub provider_names: Vec<String>,
    pub query_text: String,
    pub results: Vec<QueryResult>,
}

impl TranscriptEntry {
    pub fn single(query_text: impl Into<String>, result: QueryResult) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: DispatchKind::Single,
            provider_names: vec![result.provider_name().to_string()],
            query_text: query_text.into(),
            results: vec![result],
        }
    }

    pub fn collation(
        query_text: impl Into<String>,
        provider_names: Vec<String>,
        results: Vec<QueryResult>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: DispatchKind::Collation,
            provider_names,
            query_text: query_text.into(),
            results,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

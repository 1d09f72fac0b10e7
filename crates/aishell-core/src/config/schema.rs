//! Configuration schema.
//!
//! Hierarchy: `Config` → `Defaults`, `ProvidersConfig`, `TranscriptConfig`,
//! `ShellConfig`, `SearchConfig`, `McpConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{ProviderConfig, ProviderKind};

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.aishell/config.json`, `.env`, and env vars.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub defaults: Defaults,
    pub providers: ProvidersConfig,
    pub transcript: TranscriptConfig,
    pub shell: ShellConfig,
    pub search: SearchConfig,
    pub mcp: McpConfig,
}

impl Config {
    /// Resolve the full client settings for one provider.
    ///
    /// Unset base URLs and models fall back to the provider's stock values.
    pub fn provider_config(&self, kind: ProviderKind) -> ProviderConfig {
        let settings = self.providers.get(kind);
        ProviderConfig {
            name: kind.as_str().to_string(),
            api_key: settings.api_key().map(String::from),
            base_url: settings
                .base_url
                .clone()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| kind.default_base_url().to_string()),
            model: if settings.model.is_empty() {
                kind.default_model().to_string()
            } else {
                settings.model.clone()
            },
            default_temperature: self.defaults.temperature,
            default_max_tokens: self.defaults.max_tokens,
        }
    }
}

// ─────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────

/// Global query defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Defaults {
    /// Provider used when none is named (shell `?` conversion, `llm` fallback).
    pub provider: String,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// Maximum tokens to generate per response.
    pub max_tokens: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            provider: "claude".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// Settings for a single LLM provider.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSettings {
    /// API key for authentication. Empty means not configured.
    #[serde(default)]
    pub api_key: String,
    /// Custom API base URL (overrides the provider default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Model identifier. Empty means the provider default.
    #[serde(default)]
    pub model: String,
}

impl ProviderSettings {
    /// Whether this provider has a configured API key.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// The API key, if one is set.
    pub fn api_key(&self) -> Option<&str> {
        if self.api_key.is_empty() {
            None
        } else {
            Some(&self.api_key)
        }
    }
}

/// All provider settings, one per supported provider.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub claude: ProviderSettings,
    #[serde(default)]
    pub openai: ProviderSettings,
    #[serde(default)]
    pub gemini: ProviderSettings,
    #[serde(default)]
    pub ollama: ProviderSettings,
    #[serde(default)]
    pub openrouter: ProviderSettings,
}

impl ProvidersConfig {
    pub fn get(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::Claude => &self.claude,
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Gemini => &self.gemini,
            ProviderKind::Ollama => &self.ollama,
            ProviderKind::OpenRouter => &self.openrouter,
        }
    }

    pub fn get_mut(&mut self, kind: ProviderKind) -> &mut ProviderSettings {
        match kind {
            ProviderKind::Claude => &mut self.claude,
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::Gemini => &mut self.gemini,
            ProviderKind::Ollama => &mut self.ollama,
            ProviderKind::OpenRouter => &mut self.openrouter,
        }
    }
}

// ─────────────────────────────────────────────
// Transcript
// ─────────────────────────────────────────────

/// Where dispatches are logged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptConfig {
    pub enabled: bool,
    /// Markdown transcript path (`~` expanded).
    pub path: String,
    /// Error detail log path (`~` expanded).
    pub error_path: String,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "~/.aishell/LLMTranscript.md".to_string(),
            error_path: "~/.aishell/LLMErrors.log".to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Shell
// ─────────────────────────────────────────────

/// Interactive shell settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShellConfig {
    /// Maximum history entries kept.
    pub history_size: usize,
    /// External command timeout in seconds.
    pub command_timeout_secs: u64,
    /// Extra aliases, merged over the built-in set.
    pub aliases: BTreeMap<String, String>,
    /// Provider for `?request` conversion: empty for the default provider,
    /// `"offline"` for built-in patterns only.
    pub nl_provider: String,
}

impl ShellConfig {
    /// Provider used for natural-language conversion.
    pub fn converter_provider<'a>(&'a self, defaults: &'a Defaults) -> &'a str {
        if self.nl_provider.trim().is_empty() {
            &defaults.provider
        } else {
            self.nl_provider.trim()
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            history_size: 1000,
            command_timeout_secs: 300,
            aliases: BTreeMap::new(),
            nl_provider: String::new(),
        }
    }
}

// ─────────────────────────────────────────────
// Search
// ─────────────────────────────────────────────

/// Web search settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchConfig {
    /// `"duckduckgo"` or `"brave"`.
    pub engine: String,
    pub limit: usize,
    #[serde(default)]
    pub brave_api_key: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            engine: "duckduckgo".to_string(),
            limit: 10,
            brave_api_key: String::new(),
        }
    }
}

// ─────────────────────────────────────────────
// MCP
// ─────────────────────────────────────────────

/// MCP server registry: short name → base URL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpConfig {
    pub servers: BTreeMap<String, String>,
    pub timeout_secs: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            servers: BTreeMap::new(),
            timeout_secs: 30,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.defaults.provider, "claude");
        assert_eq!(config.defaults.temperature, 0.7);
        assert_eq!(config.defaults.max_tokens, 4096);
        assert!(config.transcript.enabled);
        assert_eq!(config.shell.history_size, 1000);
        assert_eq!(config.search.engine, "duckduckgo");
    }

    #[test]
    fn test_config_from_json_camel_case() {
        let json = serde_json::json!({
            "defaults": {
                "provider": "ollama",
                "maxTokens": 1024,
                "temperature": 0.3
            },
            "providers": {
                "openai": { "apiKey": "sk-123", "model": "gpt-4o" }
            },
            "shell": { "commandTimeoutSecs": 10 }
        });

        let config: Config = serde_json::from_value(json).unwrap();
        assert_eq!(config.defaults.provider, "ollama");
        assert_eq!(config.defaults.max_tokens, 1024);
        assert_eq!(config.providers.openai.api_key, "sk-123");
        assert_eq!(config.providers.openai.model, "gpt-4o");
        assert_eq!(config.shell.command_timeout_secs, 10);
        // untouched sections keep defaults
        assert_eq!(config.shell.history_size, 1000);
    }

    #[test]
    fn test_converter_provider_falls_back_to_default() {
        let mut config = Config::default();
        assert_eq!(config.shell.converter_provider(&config.defaults), "claude");
        config.shell.nl_provider = " offline ".into();
        assert_eq!(config.shell.converter_provider(&config.defaults), "offline");
    }

    #[test]
    fn test_config_json_uses_camel_case() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert!(json["defaults"].get("maxTokens").is_some());
        assert!(json["transcript"].get("errorPath").is_some());
        assert!(json["defaults"].get("max_tokens").is_none());
    }

    #[test]
    fn test_provider_settings_is_configured() {
        let empty = ProviderSettings::default();
        assert!(!empty.is_configured());
        assert!(empty.api_key().is_none());

        let with_key = ProviderSettings {
            api_key: "sk-123".to_string(),
            ..Default::default()
        };
        assert!(with_key.is_configured());
        assert_eq!(with_key.api_key(), Some("sk-123"));
    }

    #[test]
    fn test_provider_config_uses_stock_values() {
        let config = Config::default();
        let pc = config.provider_config(ProviderKind::Ollama);
        assert_eq!(pc.name, "ollama");
        assert_eq!(pc.base_url, "http://localhost:11434");
        assert_eq!(pc.model, "llama3.2");
        assert!(pc.api_key.is_none());
        assert_eq!(pc.default_max_tokens, 4096);
    }

    #[test]
    fn test_provider_config_overrides() {
        let mut config = Config::default();
        config.providers.openrouter = ProviderSettings {
            api_key: "sk-or-1".into(),
            base_url: Some("https://proxy.local/v1".into()),
            model: "meta-llama/llama-3-70b-instruct".into(),
        };
        config.defaults.temperature = 0.1;

        let pc = config.provider_config(ProviderKind::OpenRouter);
        assert_eq!(pc.api_key.as_deref(), Some("sk-or-1"));
        assert_eq!(pc.base_url, "https://proxy.local/v1");
        assert_eq!(pc.model, "meta-llama/llama-3-70b-instruct");
        assert_eq!(pc.default_temperature, 0.1);
    }

    #[test]
    fn test_mcp_servers_from_json() {
        let json = serde_json::json!({
            "mcp": { "servers": { "postgres": "http://localhost:5000" } }
        });
        let config: Config = serde_json::from_value(json).unwrap();
        assert_eq!(
            config.mcp.servers.get("postgres").map(String::as_str),
            Some("http://localhost:5000")
        );
        assert_eq!(config.mcp.timeout_secs, 30);
    }
}

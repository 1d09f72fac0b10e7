//! Config loader — reads `~/.aishell/config.json`, the `.env` file, and
//! merges environment variables.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.aishell/config.json`
//! 3. `.env` in the working directory (never overrides variables already set)
//! 4. Process environment variables (override JSON)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::schema::{Config, ProviderSettings};
use crate::error::ConfigError;
use crate::types::ProviderKind;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Default `.env` path (working directory).
pub fn get_env_file_path() -> PathBuf {
    PathBuf::from(".env")
}

/// Load configuration from the given (or default) path + process env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    let env: BTreeMap<String, String> = std::env::vars().collect();
    apply_env_overrides(load_config_from_path(&config_path), &env)
}

/// Load config from a specific file path, without env overrides.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return Config::default();
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return Config::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config {}: {}", path.display(), e);
            Config::default()
        }
    }
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> Result<(), ConfigError> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

// ─────────────────────────────────────────────
// .env handling
// ─────────────────────────────────────────────

/// Parse a `.env` file into key/value pairs without touching the process env.
///
/// A missing file yields an empty map.
pub fn read_env_file(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let mut vars = BTreeMap::new();
    for item in dotenvy::from_path_iter(path)? {
        let (key, value) = item?;
        vars.insert(key, value);
    }
    Ok(vars)
}

/// Load a `.env` file into the process environment.
///
/// Variables already present in the process are left alone. Returns every
/// pair the file defines; a missing or malformed file is logged and yields
/// an empty map.
pub fn load_env_file(path: &Path) -> BTreeMap<String, String> {
    let vars = match read_env_file(path) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            return BTreeMap::new();
        }
    };
    for (key, value) in &vars {
        if std::env::var_os(key).is_none() {
            std::env::set_var(key, value);
        }
    }
    if !vars.is_empty() {
        debug!(count = vars.len(), "Loaded variables from {}", path.display());
    }
    vars
}

// ─────────────────────────────────────────────
// Environment overrides
// ─────────────────────────────────────────────

/// Env var names for one provider: API key(s), model, base URL(s).
/// The first API key name is the one reported when the key is missing.
pub struct ProviderEnv {
    pub kind: ProviderKind,
    pub key_vars: &'static [&'static str],
    pub model_var: &'static str,
    pub base_url_vars: &'static [&'static str],
}

pub const PROVIDER_ENV: &[ProviderEnv] = &[
    ProviderEnv {
        kind: ProviderKind::Claude,
        key_vars: &["ANTHROPIC_API_KEY"],
        model_var: "CLAUDE_MODEL",
        base_url_vars: &["ANTHROPIC_BASE_URL"],
    },
    ProviderEnv {
        kind: ProviderKind::OpenAi,
        key_vars: &["OPENAI_API_KEY"],
        model_var: "OPENAI_MODEL",
        base_url_vars: &["OPENAI_BASE_URL"],
    },
    ProviderEnv {
        kind: ProviderKind::Gemini,
        key_vars: &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        model_var: "GEMINI_MODEL",
        base_url_vars: &["GEMINI_BASE_URL"],
    },
    ProviderEnv {
        kind: ProviderKind::Ollama,
        key_vars: &[],
        model_var: "OLLAMA_MODEL",
        base_url_vars: &["OLLAMA_BASE_URL", "OLLAMA_URL"],
    },
    ProviderEnv {
        kind: ProviderKind::OpenRouter,
        key_vars: &["OPENROUTER_API_KEY"],
        model_var: "OPENROUTER_MODEL",
        base_url_vars: &["OPENROUTER_BASE_URL"],
    },
];

/// Look up the env var table entry for a provider.
pub fn provider_env(kind: ProviderKind) -> &'static ProviderEnv {
    PROVIDER_ENV
        .iter()
        .find(|e| e.kind == kind)
        .unwrap_or(&PROVIDER_ENV[0])
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Supported overrides:
/// - `{ANTHROPIC,OPENAI,GEMINI|GOOGLE,OPENROUTER}_API_KEY` → `providers.<name>.api_key`
/// - `{CLAUDE,OPENAI,GEMINI,OLLAMA,OPENROUTER}_MODEL` → `providers.<name>.model`
/// - `*_BASE_URL` (and `OLLAMA_URL`) → `providers.<name>.base_url`
/// - `DEFAULT_LLM_PROVIDER`, `DEFAULT_TEMPERATURE`, `DEFAULT_MAX_TOKENS` → `defaults.*`
/// - `MCP_<NAME>_SERVER` → `mcp.servers.<name>`
/// - `AISHELL_TRANSCRIPT_PATH` → `transcript.path`
/// - `BRAVE_API_KEY` → `search.brave_api_key`
pub fn apply_env_overrides(mut config: Config, env: &BTreeMap<String, String>) -> Config {
    let get = |name: &str| env.get(name).filter(|v| !v.is_empty()).cloned();

    for entry in PROVIDER_ENV {
        apply_provider_env(config.providers.get_mut(entry.kind), entry, &get);
    }

    if let Some(val) = get("DEFAULT_LLM_PROVIDER") {
        config.defaults.provider = val.trim().to_lowercase();
    }
    if let Some(val) = get("DEFAULT_TEMPERATURE") {
        match val.parse::<f64>() {
            Ok(t) => config.defaults.temperature = t,
            Err(_) => warn!("Ignoring invalid DEFAULT_TEMPERATURE '{}'", val),
        }
    }
    if let Some(val) = get("DEFAULT_MAX_TOKENS") {
        match val.parse::<u32>() {
            Ok(n) => config.defaults.max_tokens = n,
            Err(_) => warn!("Ignoring invalid DEFAULT_MAX_TOKENS '{}'", val),
        }
    }

    if let Some(val) = get("AISHELL_TRANSCRIPT_PATH") {
        config.transcript.path = val;
    }
    if let Some(val) = get("BRAVE_API_KEY") {
        config.search.brave_api_key = val;
    }

    for (key, value) in env {
        if let Some(name) = mcp_server_name(key) {
            if !value.is_empty() {
                config.mcp.servers.insert(name, value.clone());
            }
        }
    }

    config
}

/// Apply env var overrides for a single provider.
fn apply_provider_env(
    provider: &mut ProviderSettings,
    entry: &ProviderEnv,
    get: &impl Fn(&str) -> Option<String>,
) {
    if let Some(val) = entry.key_vars.iter().find_map(|k| get(k)) {
        provider.api_key = val;
    }
    if let Some(val) = get(entry.model_var) {
        provider.model = val;
    }
    if let Some(val) = entry.base_url_vars.iter().find_map(|k| get(k)) {
        provider.base_url = Some(val);
    }
}

/// `MCP_POSTGRES_SERVER` → `postgres`.
fn mcp_server_name(key: &str) -> Option<String> {
    let name = key.strip_prefix("MCP_")?.strip_suffix("_SERVER")?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_lowercase())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

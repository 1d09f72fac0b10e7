//! Provider registry — static specs for the five supported providers and the
//! name → client resolution used by every dispatch.
//!
//! The registry maps each [`ProviderKind`] to a constructor closure, built
//! once from the static [`PROVIDERS`] table. Resolution validates a whole
//! batch of names before constructing any client.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use aishell_core::config::Config;
use aishell_core::types::{ProviderConfig, ProviderKind};
use aishell_core::RegistryError;

use crate::anthropic::ClaudeProvider;
use crate::gemini::GeminiProvider;
use crate::ollama::OllamaProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;

// ─────────────────────────────────────────────
// ProviderSpec — static metadata for one provider
// ─────────────────────────────────────────────

/// Static metadata describing one LLM provider.
#[derive(Clone, Debug)]
pub struct ProviderSpec {
    pub kind: ProviderKind,
    /// Human-readable name for logs and error messages. E.g. `"OpenRouter"`.
    pub display_name: &'static str,
    /// Environment variable for the API key, reported when it's missing.
    /// Empty for providers that don't need one.
    pub env_key: &'static str,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// Default client constructor.
    pub build: fn(ProviderConfig) -> Arc<dyn LlmProvider>,
}

impl ProviderSpec {
    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn default_base_url(&self) -> &'static str {
        self.kind.default_base_url()
    }

    pub fn default_model(&self) -> &'static str {
        self.kind.default_model()
    }

    pub fn requires_api_key(&self) -> bool {
        self.kind.requires_api_key()
    }
}

/// All supported providers, in display order.
pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        kind: ProviderKind::Claude,
        display_name: "Claude",
        env_key: "ANTHROPIC_API_KEY",
        timeout_secs: 120,
        build: build_claude,
    },
    ProviderSpec {
        kind: ProviderKind::OpenAi,
        display_name: "OpenAI",
        env_key: "OPENAI_API_KEY",
        timeout_secs: 120,
        build: build_openai,
    },
    ProviderSpec {
        kind: ProviderKind::Gemini,
        display_name: "Gemini",
        env_key: "GEMINI_API_KEY",
        timeout_secs: 120,
        build: build_gemini,
    },
    // Local models can be slow to load; no API key
    ProviderSpec {
        kind: ProviderKind::Ollama,
        display_name: "Ollama",
        env_key: "",
        timeout_secs: 300,
        build: build_ollama,
    },
    ProviderSpec {
        kind: ProviderKind::OpenRouter,
        display_name: "OpenRouter",
        env_key: "OPENROUTER_API_KEY",
        timeout_secs: 120,
        build: build_openrouter,
    },
];

fn build_claude(config: ProviderConfig) -> Arc<dyn LlmProvider> {
    Arc::new(ClaudeProvider::new(config))
}

fn build_openai(config: ProviderConfig) -> Arc<dyn LlmProvider> {
    Arc::new(OpenAiCompatProvider::openai(config))
}

fn build_gemini(config: ProviderConfig) -> Arc<dyn LlmProvider> {
    Arc::new(GeminiProvider::new(config))
}

fn build_ollama(config: ProviderConfig) -> Arc<dyn LlmProvider> {
    Arc::new(OllamaProvider::new(config))
}

fn build_openrouter(config: ProviderConfig) -> Arc<dyn LlmProvider> {
    Arc::new(OpenAiCompatProvider::openrouter(config))
}

/// Look up the static spec for a provider.
pub fn spec(kind: ProviderKind) -> &'static ProviderSpec {
    PROVIDERS
        .iter()
        .find(|s| s.kind == kind)
        .unwrap_or(&PROVIDERS[0])
}

/// Find a provider spec by name (case-insensitive, whitespace-trimmed).
pub fn find_by_name(name: &str) -> Option<&'static ProviderSpec> {
    name.parse::<ProviderKind>().ok().map(spec)
}

// ─────────────────────────────────────────────
// ProviderRegistry
// ─────────────────────────────────────────────

/// Builds a client from resolved settings.
pub type ProviderConstructor = Arc<dyn Fn(ProviderConfig) -> Arc<dyn LlmProvider> + Send + Sync>;

/// Resolves provider names to ready clients against one config snapshot.
#[derive(Clone)]
pub struct ProviderRegistry {
    config: Arc<Config>,
    constructors: HashMap<ProviderKind, ProviderConstructor>,
}

impl ProviderRegistry {
    /// Registry with the stock HTTP client for every provider.
    pub fn new(config: Arc<Config>) -> Self {
        let constructors = PROVIDERS
            .iter()
            .map(|s| {
                let build = s.build;
                let ctor: ProviderConstructor = Arc::new(build);
                (s.kind, ctor)
            })
            .collect();
        Self {
            config,
            constructors,
        }
    }

    /// Replace the constructor for one provider.
    pub fn with_constructor<F>(mut self, kind: ProviderKind, constructor: F) -> Self
    where
        F: Fn(ProviderConfig) -> Arc<dyn LlmProvider> + Send + Sync + 'static,
    {
        self.constructors.insert(kind, Arc::new(constructor));
        self
    }

    /// The configuration snapshot this registry resolves against.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Resolve one provider name to a client.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn LlmProvider>, RegistryError> {
        let kind: ProviderKind = name.parse()?;
        let provider_config = self.checked_config(kind)?;
        Ok(self.construct(kind, provider_config))
    }

    /// Resolve a batch of names, all or nothing.
    ///
    /// Every name is parsed first, then every credential is checked; only
    /// when the whole batch is valid are clients constructed.
    pub fn resolve_all<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<Vec<Arc<dyn LlmProvider>>, RegistryError> {
        let kinds = names
            .iter()
            .map(|n| n.as_ref().parse::<ProviderKind>())
            .collect::<Result<Vec<_>, _>>()?;

        let configs = kinds
            .iter()
            .map(|kind| self.checked_config(*kind))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(kinds
            .into_iter()
            .zip(configs)
            .map(|(kind, config)| self.construct(kind, config))
            .collect())
    }

    /// Resolve a batch of names, one slot per name.
    ///
    /// An unknown name fails the whole batch before any client is built.
    /// A missing credential only fails its own slot, so the remaining
    /// providers can still be queried.
    pub fn resolve_each<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<Vec<Result<Arc<dyn LlmProvider>, RegistryError>>, RegistryError> {
        let kinds = names
            .iter()
            .map(|n| n.as_ref().parse::<ProviderKind>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(kinds
            .into_iter()
            .map(|kind| {
                self.checked_config(kind)
                    .map(|config| self.construct(kind, config))
            })
            .collect())
    }

    /// Providers that would resolve right now.
    pub fn available(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.checked_config(*kind).is_ok())
            .collect()
    }

    fn checked_config(&self, kind: ProviderKind) -> Result<ProviderConfig, RegistryError> {
        let provider_config = self.config.provider_config(kind);
        if kind.requires_api_key() && provider_config.api_key.is_none() {
            return Err(RegistryError::MissingCredential {
                provider: kind.as_str().to_string(),
                env_var: spec(kind).env_key.to_string(),
            });
        }
        Ok(provider_config)
    }

    fn construct(&self, kind: ProviderKind, config: ProviderConfig) -> Arc<dyn LlmProvider> {
        debug!(
            provider = kind.as_str(),
            model = %config.model,
            base_url = %config.base_url,
            "Creating LLM provider"
        );
        match self.constructors.get(&kind) {
            Some(ctor) => ctor(config),
            None => (spec(kind).build)(config),
        }
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.constructors.len())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_keys() -> Config {
        let mut config = Config::default();
        config.providers.claude.api_key = "sk-ant".into();
        config.providers.openai.api_key = "sk-oai".into();
        config
    }

    #[test]
    fn test_providers_table_covers_every_kind() {
        assert_eq!(PROVIDERS.len(), ProviderKind::ALL.len());
        for kind in ProviderKind::ALL {
            assert_eq!(spec(kind).kind, kind);
        }
    }

    #[test]
    fn test_find_by_name() {
        assert_eq!(find_by_name("Claude").unwrap().display_name, "Claude");
        assert_eq!(find_by_name("openrouter").unwrap().display_name, "OpenRouter");
        assert!(find_by_name("anthropic").is_none());
    }

    #[test]
    fn test_ollama_has_longer_timeout_and_no_key() {
        let ollama = spec(ProviderKind::Ollama);
        assert_eq!(ollama.timeout_secs, 300);
        assert!(!ollama.requires_api_key());
        assert!(ollama.env_key.is_empty());
    }

    #[test]
    fn test_resolve_unknown_provider() {
        let registry = ProviderRegistry::new(Arc::new(config_with_keys()));
        let err = registry.resolve("bogus").err().unwrap();
        assert!(matches!(err, RegistryError::UnknownProvider { ref name, .. } if name == "bogus"));
        assert!(err.to_string().contains("claude, openai, gemini, ollama, openrouter"));
    }

    #[test]
    fn test_resolve_missing_credential() {
        let registry = ProviderRegistry::new(Arc::new(Config::default()));
        let err = registry.resolve("gemini").err().unwrap();
        assert_eq!(
            err,
            RegistryError::MissingCredential {
                provider: "gemini".into(),
                env_var: "GEMINI_API_KEY".into(),
            }
        );
    }

    #[test]
    fn test_resolve_ollama_without_key() {
        let registry = ProviderRegistry::new(Arc::new(Config::default()));
        let provider = registry.resolve(" OLLAMA ").unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model(), "llama3.2");
    }

    #[test]
    fn test_resolve_uses_configured_model() {
        let mut config = config_with_keys();
        config.providers.openai.model = "gpt-4o".into();
        let registry = ProviderRegistry::new(Arc::new(config));
        assert_eq!(registry.resolve("openai").unwrap().model(), "gpt-4o");
    }

    #[test]
    fn test_resolve_all_is_atomic() {
        let registry = ProviderRegistry::new(Arc::new(config_with_keys()));
        let err = registry
            .resolve_all(&["claude", "nope", "openai"])
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::UnknownProvider { .. }));
    }

    #[test]
    fn test_resolve_all_reports_unknown_before_missing_key() {
        let registry = ProviderRegistry::new(Arc::new(Config::default()));
        let err = registry.resolve_all(&["gemini", "bogus"]).err().unwrap();
        assert!(matches!(err, RegistryError::UnknownProvider { ref name, .. } if name == "bogus"));
    }

    #[test]
    fn test_resolve_all_keeps_order_and_duplicates() {
        let registry = ProviderRegistry::new(Arc::new(config_with_keys()));
        let providers = registry
            .resolve_all(&["openai", "claude", "openai"])
            .unwrap();
        let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["openai", "claude", "openai"]);
    }

    #[test]
    fn test_resolve_each_fails_only_the_keyless_slot() {
        let registry = ProviderRegistry::new(Arc::new(config_with_keys()));
        let slots = registry.resolve_each(&["claude", "gemini", "ollama"]).unwrap();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].as_ref().unwrap().name(), "claude");
        assert!(matches!(
            slots[1],
            Err(RegistryError::MissingCredential { ref provider, .. }) if provider == "gemini"
        ));
        assert_eq!(slots[2].as_ref().unwrap().name(), "ollama");
    }

    #[test]
    fn test_resolve_each_rejects_unknown_name() {
        let registry = ProviderRegistry::new(Arc::new(Config::default()));
        let err = registry.resolve_each(&["gemini", "bogus"]).err().unwrap();
        assert!(matches!(err, RegistryError::UnknownProvider { ref name, .. } if name == "bogus"));
    }

    #[test]
    fn test_available() {
        let registry = ProviderRegistry::new(Arc::new(config_with_keys()));
        assert_eq!(
            registry.available(),
            vec![ProviderKind::Claude, ProviderKind::OpenAi, ProviderKind::Ollama]
        );
    }
}

//! Error types shared across the workspace.
//!
//! Provider-level failures are not errors here: they travel as
//! [`QueryResult::Failure`](crate::types::QueryResult) values. Only request
//! validation and config I/O surface as `Err`.

use thiserror::Error;

/// Failure to turn provider names into ready clients.
///
/// Raised before any network call or transcript write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The name is not one of the supported providers.
    #[error("unknown provider '{name}' (valid providers: {valid})")]
    UnknownProvider { name: String, valid: String },

    /// The provider needs an API key and none is configured.
    #[error("no API key configured for {provider} (set {env_var})")]
    MissingCredential { provider: String, env_var: String },
}

/// Failure to read or write the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(".env error: {0}")]
    Dotenv(#[from] dotenvy::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_lists_valid_names() {
        let err = RegistryError::UnknownProvider {
            name: "bogus".into(),
            valid: "claude, openai".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("bogus"));
        assert!(msg.contains("claude, openai"));
    }

    #[test]
    fn missing_credential_names_env_var() {
        let err = RegistryError::MissingCredential {
            provider: "openai".into(),
            env_var: "OPENAI_API_KEY".into(),
        };
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}

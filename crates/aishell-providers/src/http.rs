//! Shared HTTP plumbing for the vendor clients: client construction, status
//! checks, vendor error decoding, and failure messages.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::{error, warn};

use crate::traits::ProviderError;

/// Build a pooled client with a whole-request timeout.
pub(crate) fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!("Failed to build HTTP client with timeout, using defaults: {}", e);
            reqwest::Client::new()
        })
}

/// Turn a non-2xx response into `ProviderError::Api`, decoding the vendor's
/// error body when possible.
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string());
    error!(provider, status = %status, body = %body, "API error");
    Err(ProviderError::Api {
        status: status.as_u16(),
        message: extract_error_message(&body),
    })
}

/// Pull a readable message out of a vendor error body.
///
/// Handles `{"error": {"message": …}}`, `{"error": "…"}`, and
/// `{"message": …}`; anything else falls back to the raw (trimmed) body.
pub(crate) fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let candidates = [
            value.pointer("/error/message"),
            value.get("error").filter(|v| v.is_string()),
            value.get("message"),
            value.pointer("/0/error/message"),
        ];
        if let Some(msg) = candidates.into_iter().flatten().find_map(|v| v.as_str()) {
            return msg.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        aishell_core::utils::truncate_string(trimmed, 500)
    }
}

/// Human-readable failure text, prefixed with the provider's display name.
pub fn failure_message(display_name: &str, err: &ProviderError) -> String {
    match err {
        ProviderError::Api { status, message } => {
            let status = StatusCode::from_u16(*status)
                .map(|s| s.to_string())
                .unwrap_or_else(|_| status.to_string());
            format!("{display_name} API error: {status} — {message}")
        }
        ProviderError::Http(e) if e.is_timeout() => {
            format!("{display_name} request timed out")
        }
        ProviderError::Http(e) if e.is_connect() => {
            format!("{display_name} connection failed: {e}")
        }
        ProviderError::Http(e) => format!("{display_name} request failed: {e}"),
        ProviderError::Parse(e) => format!("{display_name} response parse error: {e}"),
        ProviderError::Malformed(m) => format!("{display_name} returned a malformed response: {m}"),
        ProviderError::Stream(m) => format!("{display_name} stream error: {m}"),
        ProviderError::Configuration(m) => format!("{display_name} configuration error: {m}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_nested_error_message() {
        let body = r#"{"error": {"message": "Rate limit exceeded", "type": "rate_limit"}}"#;
        assert_eq!(extract_error_message(body), "Rate limit exceeded");
    }

    #[test]
    fn test_extract_string_error() {
        assert_eq!(
            extract_error_message(r#"{"error": "model 'x' not found"}"#),
            "model 'x' not found"
        );
    }

    #[test]
    fn test_extract_gemini_array_error() {
        let body = r#"[{"error": {"code": 400, "message": "API key not valid"}}]"#;
        assert_eq!(extract_error_message(body), "API key not valid");
    }

    #[test]
    fn test_extract_falls_back_to_raw_body() {
        assert_eq!(extract_error_message("  Bad Gateway \n"), "Bad Gateway");
        assert_eq!(extract_error_message(""), "empty response body");
    }

    #[test]
    fn test_failure_message_for_api_error() {
        let err = ProviderError::Api {
            status: 429,
            message: "Rate limit exceeded".into(),
        };
        assert_eq!(
            failure_message("OpenAI", &err),
            "OpenAI API error: 429 Too Many Requests — Rate limit exceeded"
        );
    }

    #[test]
    fn test_failure_message_for_malformed() {
        let err = ProviderError::Malformed("no choices".into());
        assert!(failure_message("OpenRouter", &err).starts_with("OpenRouter returned"));
    }
}

//! Single-query and collation dispatch.
//!
//! A dispatch resolves provider names through the [`ProviderRegistry`],
//! runs the queries, records one transcript entry, and hands the results
//! back. An unknown provider name surfaces as an error before any network
//! call or transcript write. A provider without an API key, like any other
//! provider failure, comes back as data.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::{stream, StreamExt};
use tracing::{info, warn};

use aishell_core::types::{CollationResult, QueryRequest, QueryResult, TranscriptEntry};
use aishell_core::{RegistryError, TranscriptLogger};

use crate::http::failure_message;
use crate::registry::{find_by_name, ProviderRegistry};
use crate::traits::{LlmProvider, ProviderError, TextStream};

/// Runs dispatches against one registry and records them in one transcript.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    transcript: Arc<TranscriptLogger>,
    collation_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ProviderRegistry>, transcript: Arc<TranscriptLogger>) -> Self {
        Self {
            registry,
            transcript,
            collation_timeout: None,
        }
    }

    /// Give every provider in a collation at most `timeout` to answer.
    ///
    /// Providers still pending when it expires are reported as failures;
    /// the others keep their results.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.collation_timeout = Some(timeout);
        self
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Query one provider.
    pub async fn dispatch_single(
        &self,
        provider_name: &str,
        request: &QueryRequest,
    ) -> Result<QueryResult, RegistryError> {
        let provider = match self.registry.resolve(provider_name) {
            Ok(provider) => provider,
            Err(RegistryError::MissingCredential { provider, env_var }) => {
                let result = QueryResult::failure(&provider, missing_key_message(&provider, &env_var));
                warn!(provider = %provider, env_var = %env_var, "API key not configured");
                self.transcript
                    .record(&TranscriptEntry::single(&request.prompt, result.clone()))
                    .await;
                return Ok(result);
            }
            Err(e) => return Err(e),
        };

        info!(provider = provider.name(), model = provider.model(), "Dispatching query");
        let result = provider.query(request).await;
        if let Some(err) = result.error_message() {
            warn!(provider = provider.name(), error = %err, "Query failed");
        }

        self.transcript
            .record(&TranscriptEntry::single(&request.prompt, result.clone()))
            .await;
        Ok(result)
    }

    /// Query several providers concurrently, results in request order.
    ///
    /// An empty list returns an empty result without touching the network
    /// or the transcript. Duplicate names are dispatched independently.
    /// A provider without an API key fills its slot with a failure.
    pub async fn dispatch_collation<S: AsRef<str>>(
        &self,
        provider_names: &[S],
        request: &QueryRequest,
    ) -> Result<CollationResult, RegistryError> {
        if provider_names.is_empty() {
            return Ok(CollationResult::default());
        }

        let slots = self.registry.resolve_each(provider_names)?;

        info!(providers = slots.len(), "Dispatching collation");

        let timeout = self.collation_timeout;
        let queries = slots.iter().map(|slot| async move {
            match slot {
                Ok(provider) => query_with_timeout(provider.as_ref(), request, timeout).await,
                Err(e) => unavailable(e),
            }
        });
        let results = join_all(queries).await;
        let names: Vec<String> = results.iter().map(|r| r.provider_name().to_string()).collect();

        let collated = CollationResult::new(results);
        info!(
            succeeded = collated.successes().count(),
            failed = collated.failures().count(),
            "Collation complete"
        );

        self.transcript
            .record(&TranscriptEntry::collation(
                &request.prompt,
                names,
                collated.as_slice().to_vec(),
            ))
            .await;
        Ok(collated)
    }

    /// Stream one provider's answer.
    ///
    /// When the stream finishes (or fails) the accumulated text is recorded
    /// as a single transcript entry. A stream dropped before its end is not
    /// recorded.
    pub fn stream_single(
        &self,
        provider_name: &str,
        request: &QueryRequest,
    ) -> Result<TextStream, RegistryError> {
        let provider = match self.registry.resolve(provider_name) {
            Ok(provider) => provider,
            Err(RegistryError::MissingCredential { provider, env_var }) => {
                return Ok(self.missing_key_stream(request, provider, env_var));
            }
            Err(e) => return Err(e),
        };
        info!(provider = provider.name(), model = provider.model(), "Dispatching stream");

        let mut inner = provider.stream(request);
        let transcript = Arc::clone(&self.transcript);
        let prompt = request.prompt.clone();
        let name = provider.name().to_string();
        let model = provider.model().to_string();
        let display_name = display_name(&name);

        Ok(Box::pin(async_stream::stream! {
            let mut text = String::new();
            while let Some(item) = inner.next().await {
                match item {
                    Ok(chunk) => {
                        text.push_str(&chunk);
                        yield Ok(chunk);
                    }
                    Err(e) => {
                        let result = QueryResult::failure(&name, failure_message(display_name, &e));
                        transcript.record(&TranscriptEntry::single(&prompt, result)).await;
                        yield Err(e);
                        return;
                    }
                }
            }
            let result = QueryResult::success(&name, &model, &text, None);
            transcript.record(&TranscriptEntry::single(&prompt, result)).await;
        }))
    }

    /// A stream that records the missing key and yields it as its only item.
    fn missing_key_stream(&self, request: &QueryRequest, provider: String, env_var: String) -> TextStream {
        let transcript = Arc::clone(&self.transcript);
        let prompt = request.prompt.clone();
        warn!(provider = %provider, env_var = %env_var, "API key not configured");

        stream::once(async move {
            let result = QueryResult::failure(&provider, missing_key_message(&provider, &env_var));
            transcript.record(&TranscriptEntry::single(&prompt, result)).await;
            Err::<String, _>(missing_key_error(&env_var))
        })
        .boxed()
    }
}

fn display_name(provider: &str) -> &'static str {
    find_by_name(provider).map_or("Provider", |spec| spec.display_name)
}

fn missing_key_error(env_var: &str) -> ProviderError {
    ProviderError::Configuration(format!("API key not configured (set {env_var})"))
}

fn missing_key_message(provider: &str, env_var: &str) -> String {
    failure_message(display_name(provider), &missing_key_error(env_var))
}

/// Failure standing in for a provider that could not be built.
fn unavailable(err: &RegistryError) -> QueryResult {
    match err {
        RegistryError::MissingCredential { provider, env_var } => {
            warn!(provider = %provider, env_var = %env_var, "API key not configured");
            QueryResult::failure(provider, missing_key_message(provider, env_var))
        }
        RegistryError::UnknownProvider { name, .. } => QueryResult::failure(name, err.to_string()),
    }
}

async fn query_with_timeout(
    provider: &dyn LlmProvider,
    request: &QueryRequest,
    timeout: Option<Duration>,
) -> QueryResult {
    match timeout {
        None => provider.query(request).await,
        Some(limit) => match tokio::time::timeout(limit, provider.query(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(provider = provider.name(), timeout = ?limit, "Provider timed out");
                QueryResult::failure(
                    provider.name(),
                    format!("timeout after {}s", limit.as_secs_f64()),
                )
            }
        },
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

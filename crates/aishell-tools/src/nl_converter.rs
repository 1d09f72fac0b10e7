//! Natural-language → shell command conversion.
//!
//! Requests normally go through an LLM provider. The offline backend matches
//! a fixed set of phrasings instead, for use without any API access.

use std::path::PathBuf;

use anyhow::anyhow;
use tracing::{debug, info};

use aishell_core::types::QueryRequest;
use aishell_providers::Dispatcher;

const TEMPERATURE: f64 = 0.0;
const MAX_TOKENS: u32 = 200;

/// Provider name selecting the pattern backend.
pub const OFFLINE: &str = "offline";

/// Phrase → command, checked in order.
const FIXED_COMMANDS: &[(&str, &str)] = &[
    ("list files", "ls -la"),
    ("show files", "ls"),
    ("current directory", "pwd"),
    ("go home", "cd ~"),
    ("go back", "cd .."),
    ("clear screen", "clear"),
    ("show history", "history"),
    ("disk usage", "df -h"),
    ("memory usage", "free -h"),
    ("running processes", "ps aux"),
    ("network connections", "netstat -an"),
];

/// Where the converted command will run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShellContext {
    pub cwd: PathBuf,
    pub os: String,
    pub shell: String,
}

/// Turns requests like "list all python files" into a single command line.
#[derive(Clone, Debug)]
pub struct NlConverter {
    dispatcher: Option<Dispatcher>,
    provider: String,
}

impl NlConverter {
    /// Converter backed by `provider`; [`OFFLINE`] selects the patterns.
    pub fn new(dispatcher: Dispatcher, provider: impl Into<String>) -> Self {
        let provider = provider.into();
        if provider == OFFLINE {
            return Self::offline();
        }
        Self {
            dispatcher: Some(dispatcher),
            provider,
        }
    }

    /// Converter that never leaves the machine.
    pub fn offline() -> Self {
        Self {
            dispatcher: None,
            provider: OFFLINE.to_string(),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn is_offline(&self) -> bool {
        self.dispatcher.is_none()
    }

    /// Convert `input` to a command.
    ///
    /// `Ok(None)` when the model answered with nothing usable. Unknown
    /// providers and failed queries are errors.
    pub async fn convert(&self, input: &str, context: &ShellContext) -> anyhow::Result<Option<String>> {
        let Some(dispatcher) = &self.dispatcher else {
            return Ok(convert_offline(input));
        };
        let request = QueryRequest::new(build_prompt(input, context))
            .temperature(TEMPERATURE)
            .max_tokens(MAX_TOKENS);

        info!(provider = %self.provider, "Converting natural language request");
        let result = dispatcher.dispatch_single(&self.provider, &request).await?;

        match result.text() {
            Some(text) => {
                let command = clean_command(text);
                debug!(command = ?command, "Converted request");
                Ok(command)
            }
            None => Err(anyhow!(
                "{}",
                result.error_message().unwrap_or("conversion failed")
            )),
        }
    }
}

/// Convert `input` with the built-in phrasings.
pub fn convert_offline(input: &str) -> Option<String> {
    // ASCII lowering keeps byte offsets aligned with `input`
    let lower = input.to_ascii_lowercase();
    if let Some((_, command)) = FIXED_COMMANDS.iter().find(|(phrase, _)| lower.contains(phrase)) {
        return Some(command.to_string());
    }

    let after = |marker: &str| -> Option<String> {
        let start = lower.rfind(marker)? + marker.len();
        let rest = input[start..].trim().replace('\'', "");
        (!rest.is_empty()).then_some(rest)
    };
    if let Some(name) = after("find") {
        return Some(format!("find . -name '*{name}*'"));
    }
    if let Some(text) = after("search for") {
        return Some(format!("grep -r '{text}' ."));
    }
    if lower.contains("create directory") {
        return after("directory").map(|dir| format!("mkdir {dir}"));
    }
    after("delete").map(|target| format!("rm {target}"))
}

/// Instruction prompt sent to the model.
pub fn build_prompt(input: &str, context: &ShellContext) -> String {
    format!(
        "Convert this natural language request to a shell command.\n\
         Return ONLY the command, no explanation or markdown.\n\n\
         Context:\n\
         Current directory: {}\n\
         Operating system: {}\n\
         Shell: {}\n\n\
         Request: {}\n\n\
         Command:",
        context.cwd.display(),
        context.os,
        context.shell,
        input
    )
}

/// Extract the command line from a model answer.
///
/// Drops code fences and surrounding backticks, keeps the first non-empty
/// line, and strips a leading `$ ` prompt marker.
pub fn clean_command(answer: &str) -> Option<String> {
    let line = answer
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("```"))?;

    let line = line.trim_matches('`').trim();
    let line = line.strip_prefix("$ ").unwrap_or(line).trim();
    (!line.is_empty()).then(|| line.to_string())
}

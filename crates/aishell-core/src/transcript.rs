//! Append-only Markdown transcript of every dispatch.
//!
//! File format (`LLMTranscript.md`):
//! - Header: `# LLM Interaction Transcript`, a description line, `---`
//! - One block per dispatch, each ending with `---`
//!
//! Failed provider results are also appended to a plain error log, one line
//! per failure: `timestamp | provider | message`.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::types::{DispatchKind, QueryResult, TranscriptEntry};
use crate::utils::display_timestamp;

const HEADER: &str = "# LLM Interaction Transcript\n\n\
This file contains a log of all LLM interactions from aishell.\n\n\
---\n\n";

// ─────────────────────────────────────────────
// TranscriptLogger
// ─────────────────────────────────────────────

/// Serializes transcript writes so entries never interleave.
///
/// Logging failures are reported with `warn!` and never reach the caller.
#[derive(Debug)]
pub struct TranscriptLogger {
    files: Option<TranscriptFiles>,
    lock: Mutex<()>,
}

#[derive(Debug)]
struct TranscriptFiles {
    transcript: PathBuf,
    errors: PathBuf,
}

impl TranscriptLogger {
    /// Create a logger writing to `transcript_path` and `error_path`.
    ///
    /// Nothing touches the disk until the first [`record`](Self::record),
    /// which creates the transcript with its header.
    pub fn new(transcript_path: impl Into<PathBuf>, error_path: impl Into<PathBuf>) -> Self {
        Self {
            files: Some(TranscriptFiles {
                transcript: transcript_path.into(),
                errors: error_path.into(),
            }),
            lock: Mutex::new(()),
        }
    }

    /// A logger that records nothing.
    pub fn disabled() -> Self {
        Self {
            files: None,
            lock: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.files.is_some()
    }

    pub fn transcript_path(&self) -> Option<&Path> {
        self.files.as_ref().map(|f| f.transcript.as_path())
    }

    /// Append one entry (and its failures to the error log).
    pub async fn record(&self, entry: &TranscriptEntry) {
        let Some(files) = &self.files else {
            return;
        };

        let _guard = self.lock.lock().await;

        let block = render_entry(entry);
        if let Err(e) = append_transcript(&files.transcript, &block).await {
            warn!(
                path = %files.transcript.display(),
                "Failed to write transcript entry: {}", e
            );
        }

        let error_lines = render_error_lines(entry);
        if !error_lines.is_empty() {
            if let Err(e) = append(&files.errors, &error_lines).await {
                warn!(
                    path = %files.errors.display(),
                    "Failed to write error log: {}", e
                );
            }
        }

        debug!(
            kind = ?entry.kind,
            providers = entry.provider_names.len(),
            "Transcript entry recorded"
        );
    }
}

async fn append_transcript(path: &Path, block: &str) -> std::io::Result<()> {
    let mut file = open_append(path).await?;
    let mut buf = String::with_capacity(HEADER.len() + block.len());
    if file.metadata().await?.len() == 0 {
        buf.push_str(HEADER);
    }
    buf.push_str(block);
    file.write_all(buf.as_bytes()).await?;
    file.flush().await
}

async fn append(path: &Path, text: &str) -> std::io::Result<()> {
    let mut file = open_append(path).await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await
}

async fn open_append(path: &Path) -> std::io::Result<tokio::fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}

// ─────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────

/// Render one entry as a Markdown block ending with `---`.
pub fn render_entry(entry: &TranscriptEntry) -> String {
    let ts = display_timestamp(&entry.timestamp);
    let mut lines: Vec<String> = Vec::new();

    match entry.kind {
        DispatchKind::Single => {
            let result = entry.results.first();
            let provider = entry
                .provider_names
                .first()
                .map(String::as_str)
                .or_else(|| result.map(QueryResult::provider_name))
                .unwrap_or_default()
                .to_uppercase();
            let heading = match result.and_then(QueryResult::model_name) {
                Some(model) => format!("**{ts} | {provider} ({model})**"),
                None => format!("**{ts} | {provider}**"),
            };
            lines.push(heading);
            lines.push(String::new());
            lines.push(format!("**Query:** {}", entry.query_text));
            lines.push(String::new());
            lines.push("**Response:**".to_string());
            match result {
                Some(QueryResult::Success { text, usage, .. }) => {
                    lines.push(text.clone());
                    lines.push(String::new());
                    if let Some(usage) = usage {
                        lines.push(format!("**Usage:** {usage}"));
                        lines.push(String::new());
                    }
                }
                Some(QueryResult::Failure { error_message, .. }) => {
                    lines.push(format!("*Error: {error_message}*"));
                    lines.push(String::new());
                }
                None => lines.push(String::new()),
            }
        }
        DispatchKind::Collation => {
            lines.push(format!(
                "**{ts} | COLLATION ({})**",
                entry.provider_names.join(", ")
            ));
            lines.push(String::new());
            lines.push(format!("**Query:** {}", entry.query_text));
            lines.push(String::new());
            lines.push("**Responses:**".to_string());
            lines.push(String::new());
            for result in &entry.results {
                lines.push(format!("### {}", result.provider_name().to_uppercase()));
                lines.push(String::new());
                match result {
                    QueryResult::Success { text, usage, .. } => {
                        lines.push(text.clone());
                        lines.push(String::new());
                        if let Some(usage) = usage {
                            lines.push(format!("*Usage: {usage}*"));
                            lines.push(String::new());
                        }
                    }
                    QueryResult::Failure { error_message, .. } => {
                        lines.push(format!("*Error: {error_message}*"));
                        lines.push(String::new());
                    }
                }
            }
        }
    }

    lines.push("---".to_string());
    lines.push(String::new());
    let mut block = lines.join("\n");
    block.push('\n');
    block
}

fn render_error_lines(entry: &TranscriptEntry) -> String {
    entry
        .results
        .iter()
        .filter_map(|r| match r {
            QueryResult::Failure {
                provider_name,
                error_message,
                timestamp,
            } => Some(format!(
                "{} | {} | {}\n",
                timestamp.to_rfc3339(),
                provider_name,
                error_message.replace('\n', " ")
            )),
            QueryResult::Success { .. } => None,
        })
        .collect()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Usage;
    use std::sync::Arc;

    fn logger_in(dir: &Path) -> TranscriptLogger {
        TranscriptLogger::new(
            dir.join("LLMTranscript.md"),
            dir.join("LLMErrors.log"),
        )
    }

    #[tokio::test]
    async fn test_header_written_on_first_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("LLMTranscript.md");
        let logger = TranscriptLogger::new(&path, dir.path().join("LLMErrors.log"));
        assert!(!path.exists());

        logger
            .record(&TranscriptEntry::single("q", QueryResult::success("ollama", "m", "x", None)))
            .await;
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# LLM Interaction Transcript"));
        assert!(content.contains("**Query:** q"));
    }

    #[test]
    fn test_render_single_success() {
        let result = QueryResult::success("claude", "claude-3-5-sonnet", "4", Some(Usage::new(10, 1)));
        let entry = TranscriptEntry::single("What is 2+2?", result);
        let block = render_entry(&entry);

        assert!(block.contains("| CLAUDE (claude-3-5-sonnet)**"));
        assert!(block.contains("**Query:** What is 2+2?"));
        assert!(block.contains("**Response:**\n4\n"));
        assert!(block.contains("**Usage:** input_tokens: 10, output_tokens: 1, total_tokens: 11"));
        assert!(block.trim_end().ends_with("---"));
    }

    #[test]
    fn test_render_single_failure() {
        let entry = TranscriptEntry::single("hi", QueryResult::failure("openai", "timeout after 5s"));
        let block = render_entry(&entry);
        assert!(block.contains("| OPENAI**"));
        assert!(block.contains("*Error: timeout after 5s*"));
        assert!(!block.contains("**Usage:**"));
    }

    #[test]
    fn test_render_collation_in_order() {
        let results = vec![
            QueryResult::success("claude", "m1", "alpha", None),
            QueryResult::failure("openai", "boom"),
            QueryResult::success("ollama", "m3", "gamma", Some(Usage::new(1, 2))),
        ];
        let entry = TranscriptEntry::collation(
            "q",
            vec!["claude".into(), "openai".into(), "ollama".into()],
            results,
        );
        let block = render_entry(&entry);

        assert!(block.contains("| COLLATION (claude, openai, ollama)**"));
        let claude = block.find("### CLAUDE").unwrap();
        let openai = block.find("### OPENAI").unwrap();
        let ollama = block.find("### OLLAMA").unwrap();
        assert!(claude < openai && openai < ollama);
        assert!(block.contains("*Error: boom*"));
        assert!(block.contains("*Usage: input_tokens: 1, output_tokens: 2, total_tokens: 3*"));
    }

    #[tokio::test]
    async fn test_record_appends_entry_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger_in(dir.path());

        logger
            .record(&TranscriptEntry::single("q1", QueryResult::success("claude", "m", "ok", None)))
            .await;
        logger
            .record(&TranscriptEntry::single("q2", QueryResult::failure("gemini", "bad key")))
            .await;

        let transcript = std::fs::read_to_string(dir.path().join("LLMTranscript.md")).unwrap();
        assert_eq!(transcript.matches("# LLM Interaction Transcript").count(), 1);
        assert!(transcript.find("q1").unwrap() < transcript.find("q2").unwrap());

        let errors = std::fs::read_to_string(dir.path().join("LLMErrors.log")).unwrap();
        assert_eq!(errors.lines().count(), 1);
        assert!(errors.contains("| gemini | bad key"));
    }

    #[tokio::test]
    async fn test_record_restores_missing_header() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger_in(dir.path());
        logger
            .record(&TranscriptEntry::single("q1", QueryResult::success("ollama", "m", "x", None)))
            .await;
        std::fs::remove_file(dir.path().join("LLMTranscript.md")).unwrap();

        logger
            .record(&TranscriptEntry::single("q2", QueryResult::success("ollama", "m", "x", None)))
            .await;

        let transcript = std::fs::read_to_string(dir.path().join("LLMTranscript.md")).unwrap();
        assert!(transcript.starts_with("# LLM Interaction Transcript"));
        assert!(!transcript.contains("q1"));
    }

    #[tokio::test]
    async fn test_concurrent_records_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Arc::new(logger_in(dir.path()));

        let mut handles = Vec::new();
        for i in 0..20 {
            let logger = Arc::clone(&logger);
            handles.push(tokio::spawn(async move {
                let text = format!("response-{i}\n").repeat(50);
                let entry = TranscriptEntry::single(
                    format!("query-{i}"),
                    QueryResult::success("claude", "m", text, None),
                );
                logger.record(&entry).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let transcript = std::fs::read_to_string(dir.path().join("LLMTranscript.md")).unwrap();
        for i in 0..20 {
            let query = transcript.find(&format!("**Query:** query-{i}\n")).unwrap();
            let rest = &transcript[query..];
            let end = rest.find("\n---\n").unwrap();
            let block = &rest[..end];
            // every line of this block's response belongs to the same query
            assert_eq!(block.matches(&format!("response-{i}\n")).count(), 50);
            assert_eq!(block.matches("**Query:**").count(), 1);
        }
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let logger = TranscriptLogger::new(
            blocker.join("LLMTranscript.md"),
            blocker.join("LLMErrors.log"),
        );
        // must not panic or error
        logger
            .record(&TranscriptEntry::single("q", QueryResult::failure("claude", "x")))
            .await;
        assert!(!blocker.join("LLMTranscript.md").exists());
    }

    #[tokio::test]
    async fn test_disabled_logger_writes_nothing() {
        let logger = TranscriptLogger::disabled();
        assert!(!logger.is_enabled());
        assert!(logger.transcript_path().is_none());
        logger
            .record(&TranscriptEntry::single("q", QueryResult::failure("claude", "x")))
            .await;
    }
}

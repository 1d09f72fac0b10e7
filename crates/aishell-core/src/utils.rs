//! Utility helpers — path resolution, date formatting, string manipulation.

use std::path::PathBuf;

use chrono::{DateTime, Local, Utc};

/// Get the aishell data directory (e.g. `~/.aishell/`).
pub fn get_data_path() -> PathBuf {
    let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".aishell")
}

/// REPL history file (`~/.aishell/history`).
pub fn get_history_path() -> PathBuf {
    get_data_path().join("history")
}

/// Get current ISO 8601 timestamp.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Human-readable local time used in transcript headings.
pub fn display_timestamp(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Truncate a string to `max_len` characters, adding "..." if truncated.
/// Unicode-safe.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Expand `~` to the home directory in a path string.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => home_dir().unwrap_or_else(|| PathBuf::from(".")).join(rest),
        None if path == "~" => home_dir().unwrap_or_else(|| PathBuf::from(".")),
        None => PathBuf::from(path),
    }
}

/// Whether an env var name looks like it holds a credential.
pub fn is_sensitive_name(name: &str) -> bool {
    const MARKERS: &[&str] = &["key", "token", "secret", "password", "auth"];
    let lower = name.to_lowercase();
    MARKERS.iter().any(|m| lower.contains(m))
}

/// Mask a secret for display: `sk-a...wxyz`, or `***` for short values.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***".to_string()
    }
}

/// Mask `value` only when `name` looks sensitive.
pub fn display_env_value(name: &str, value: &str) -> String {
    if is_sensitive_name(name) {
        mask_secret(value)
    } else {
        value.to_string()
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("USERPROFILE").ok().map(PathBuf::from))
}

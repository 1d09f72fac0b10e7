//! `aishell env` — show configuration variables, or reload the `.env` file.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use colored::Colorize;

use aishell_core::config::loader::PROVIDER_ENV;
use aishell_core::config::ConfigDiff;
use aishell_core::utils::display_env_value;
use aishell_core::ConfigHandle;

/// Variables read outside the per-provider table.
const GENERAL_VARS: &[&str] = &[
    "DEFAULT_LLM_PROVIDER",
    "DEFAULT_TEMPERATURE",
    "DEFAULT_MAX_TOKENS",
    "AISHELL_TRANSCRIPT_PATH",
    "BRAVE_API_KEY",
];

/// Where a shown value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    DotEnv,
    Process,
}

impl Source {
    fn label(&self) -> &'static str {
        match self {
            Source::DotEnv => ".env",
            Source::Process => "env",
        }
    }
}

pub fn run(handle: &ConfigHandle, reload: bool, filter: Option<&str>) -> Result<()> {
    if reload {
        let diff = handle
            .reload()
            .with_context(|| format!("failed to reload {}", handle.env_path().display()))?;
        print_diff(&diff);
        return Ok(());
    }

    let vars = collect_vars(&handle.env_vars(), |name| std::env::var(name).ok(), filter);
    if vars.is_empty() {
        println!(
            "{}",
            format!("No configuration variables set (looked in {} and the environment)", handle.env_path().display())
                .yellow()
        );
        return Ok(());
    }

    println!();
    println!("{}", "Configuration variables".bold());
    println!();
    for (name, (value, source)) in &vars {
        println!(
            "  {:<28} {:<6} {}",
            name.cyan(),
            source.label().dimmed(),
            display_env_value(name, value)
        );
    }
    println!();
    Ok(())
}

/// Every variable aishell reads that currently has a value.
///
/// Names come from the `.env` file plus the known variable names looked up
/// with `lookup`. Values from the process win; the source says whether the
/// value matches the `.env` file.
pub fn collect_vars(
    env_file: &BTreeMap<String, String>,
    lookup: impl Fn(&str) -> Option<String>,
    filter: Option<&str>,
) -> BTreeMap<String, (String, Source)> {
    let mut names: Vec<String> = env_file.keys().cloned().collect();
    names.extend(known_names().into_iter().map(String::from));

    let filter = filter.map(str::to_lowercase);
    let mut vars = BTreeMap::new();
    for name in names {
        if let Some(f) = &filter {
            if !name.to_lowercase().contains(f.as_str()) {
                continue;
            }
        }
        let value = lookup(&name).or_else(|| env_file.get(&name).cloned());
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            continue;
        };
        let source = if env_file.get(&name) == Some(&value) {
            Source::DotEnv
        } else {
            Source::Process
        };
        vars.insert(name, (value, source));
    }
    vars
}

fn known_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = GENERAL_VARS.to_vec();
    for entry in PROVIDER_ENV {
        names.extend(entry.key_vars);
        names.push(entry.model_var);
        names.extend(entry.base_url_vars);
    }
    names
}

fn print_diff(diff: &ConfigDiff) {
    if diff.is_empty() {
        println!("{}", "No changes detected".dimmed());
        return;
    }
    if !diff.added.is_empty() {
        println!("{}", format!("Added variables: {}", diff.added.join(", ")).green());
    }
    if !diff.removed.is_empty() {
        println!("{}", format!("Removed variables: {}", diff.removed.join(", ")).yellow());
    }
    if !diff.changed.is_empty() {
        println!("{}", format!("Modified variables: {}", diff.changed.join(", ")).blue());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_vars() -> BTreeMap<String, String> {
        [
            ("OPENAI_API_KEY", "sk-file-0123456789"),
            ("MCP_FILES_SERVER", "http://localhost:8000"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn file_values_are_tagged() {
        let file = file_vars();
        let vars = collect_vars(&file, |name| file.get(name).cloned(), None);
        assert_eq!(vars["OPENAI_API_KEY"].1, Source::DotEnv);
        assert_eq!(vars["MCP_FILES_SERVER"].0, "http://localhost:8000");
    }

    #[test]
    fn process_values_win() {
        let file = file_vars();
        let vars = collect_vars(
            &file,
            |name| match name {
                "OPENAI_API_KEY" => Some("sk-process".to_string()),
                "OLLAMA_URL" => Some("http://gpu:11434".to_string()),
                _ => None,
            },
            None,
        );
        assert_eq!(vars["OPENAI_API_KEY"], ("sk-process".to_string(), Source::Process));
        assert_eq!(vars["OLLAMA_URL"].1, Source::Process);
        assert!(!vars.contains_key("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn filter_is_case_insensitive() {
        let file = file_vars();
        let vars = collect_vars(&file, |_| None, Some("mcp"));
        assert_eq!(vars.keys().collect::<Vec<_>>(), vec!["MCP_FILES_SERVER"]);
    }

    #[test]
    fn known_names_cover_providers() {
        let names = known_names();
        assert!(names.contains(&"ANTHROPIC_API_KEY"));
        assert!(names.contains(&"GOOGLE_API_KEY"));
        assert!(names.contains(&"OLLAMA_URL"));
        assert!(names.contains(&"DEFAULT_LLM_PROVIDER"));
    }
}

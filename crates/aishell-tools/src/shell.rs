//! Interactive shell engine: input classification, aliases, builtins,
//! dangerous-command detection and subprocess execution.
//!
//! Terminal I/O lives in the CLI; this module only turns a line of input
//! into a [`ShellInput`] and runs commands against a [`ShellSession`].

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Context;
use regex::Regex;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use aishell_core::config::schema::ShellConfig;
use aishell_core::types::ProviderKind;
use aishell_core::utils::expand_home;
use aishell_core::RegistryError;

use crate::nl_converter::ShellContext;

/// Exit status reported for a command killed by the timeout, as `timeout(1)` does.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// How many entries the `history` builtin prints.
const HISTORY_DISPLAY: usize = 50;

/// Clear screen and home the cursor.
const CLEAR_SEQUENCE: &str = "\x1b[2J\x1b[H";

/// Commands with a known set of subcommands offered on tab completion.
pub const COMMON_COMMANDS: &[(&str, &[&str])] = &[
    ("git", &["status", "add", "commit", "push", "pull", "branch", "checkout", "merge", "log", "diff"]),
    ("docker", &["ps", "images", "run", "build", "stop", "rm", "exec", "logs"]),
    ("npm", &["install", "start", "test", "run", "build", "update"]),
    ("cargo", &["build", "check", "test", "run", "clippy", "fmt", "doc"]),
    ("pip", &["install", "list", "freeze", "show", "uninstall"]),
];

/// Patterns that trigger a confirmation before execution, with a short label.
const DANGEROUS_PATTERNS: &[(&str, &str)] = &[
    ("rm -rf", r"\brm\s+-[a-z]*(rf|fr)[a-z]*\b"),
    ("chmod 777", r"\bchmod\s+(-r\s+)?777\b"),
    ("chown -R", r"\bchown\s+-r\b"),
    ("dd if=", r"\bdd\s+if="),
    ("mkfs", r"\bmkfs\b"),
    ("format c:", r"\bformat\s+c:"),
    ("fork bomb", r":\(\)\s*\{.*\};\s*:"),
    ("shutdown/reboot", r"\b(shutdown|reboot|poweroff|halt)\b"),
    ("write to /dev/sd*", r">\s*/dev/sd"),
];

static DANGEROUS_REGEXES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    DANGEROUS_PATTERNS
        .iter()
        .filter_map(|(label, pattern)| Regex::new(pattern).ok().map(|re| (*label, re)))
        .collect()
});

/// Label of the first dangerous pattern found in `command`, if any.
pub fn check_dangerous(command: &str) -> Option<&'static str> {
    let lower = command.to_lowercase();
    DANGEROUS_REGEXES
        .iter()
        .find(|(_, re)| re.is_match(&lower))
        .map(|(label, _)| *label)
}

// ─────────────────────────────────────────────
// Input classification
// ─────────────────────────────────────────────

/// One line of shell input, classified.
#[derive(Clone, Debug, PartialEq)]
pub enum ShellInput {
    Empty,
    Exit,
    Help,
    /// `?request`: convert to a command first.
    NaturalLanguage(String),
    Llm {
        provider: ProviderKind,
        prompt: String,
    },
    Collate {
        providers: Vec<ProviderKind>,
        prompt: String,
    },
    Command(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error(transparent)]
    Provider(#[from] RegistryError),

    #[error("usage: {0}")]
    Usage(&'static str),
}

const LLM_USAGE: &str = "llm <provider> <prompt>";
const COLLATE_USAGE: &str = "collate <provider>... -- <prompt>";

/// Classify a line of input.
///
/// Provider names after `llm`/`collate` must be canonical; an unknown name
/// is an error and is never treated as part of the prompt.
pub fn parse_input(line: &str) -> Result<ShellInput, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ShellInput::Empty);
    }

    match line.to_lowercase().as_str() {
        "exit" | "quit" | "q" => return Ok(ShellInput::Exit),
        "help" => return Ok(ShellInput::Help),
        _ => {}
    }

    if let Some(request) = line.strip_prefix('?') {
        let request = request.trim();
        if request.is_empty() {
            return Err(InputError::Usage("?<request>"));
        }
        return Ok(ShellInput::NaturalLanguage(request.to_string()));
    }

    let words = split_words(line);
    match words.first().map(String::as_str) {
        Some("llm") => parse_llm(&words[1..]),
        Some("collate") => parse_collate(&words[1..]),
        _ => Ok(ShellInput::Command(line.to_string())),
    }
}

fn parse_llm(args: &[String]) -> Result<ShellInput, InputError> {
    let Some((name, rest)) = args.split_first() else {
        return Err(InputError::Usage(LLM_USAGE));
    };
    let provider: ProviderKind = name.parse()?;
    let prompt = rest.join(" ");
    if prompt.trim().is_empty() {
        return Err(InputError::Usage(LLM_USAGE));
    }
    Ok(ShellInput::Llm { provider, prompt })
}

fn parse_collate(args: &[String]) -> Result<ShellInput, InputError> {
    let (names, prompt) = match args.iter().position(|a| a == "--") {
        Some(sep) => (&args[..sep], args[sep + 1..].join(" ")),
        None => match args.split_last() {
            Some((last, names)) => (names, last.clone()),
            None => return Err(InputError::Usage(COLLATE_USAGE)),
        },
    };

    // validate every name before looking at the prompt
    let providers = names
        .iter()
        .map(|n| n.parse::<ProviderKind>())
        .collect::<Result<Vec<_>, _>>()?;

    if providers.is_empty() || prompt.trim().is_empty() {
        return Err(InputError::Usage(COLLATE_USAGE));
    }
    Ok(ShellInput::Collate { providers, prompt })
}

/// Split on whitespace, keeping single- or double-quoted runs together.
pub fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;

    for ch in line.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                in_word = true;
            }
            None if ch.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(ch);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

/// First-word completions for the common tools.
pub fn suggest_completions(line: &str) -> Vec<String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let partial = if line.ends_with(char::is_whitespace) { "" } else { words.last().copied().unwrap_or("") };
    let complete_words = if partial.is_empty() { words.len() } else { words.len().saturating_sub(1) };

    match (words.first(), complete_words) {
        (Some(base), 1) => COMMON_COMMANDS
            .iter()
            .find(|(cmd, _)| cmd == base)
            .map(|(_, subs)| {
                subs.iter()
                    .filter(|s| s.starts_with(partial))
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

// ─────────────────────────────────────────────
// Aliases
// ─────────────────────────────────────────────

/// Built-in alias set.
pub fn default_aliases() -> BTreeMap<String, String> {
    [
        ("ll", "ls -la"),
        ("la", "ls -a"),
        ("l", "ls -l"),
        ("..", "cd .."),
        ("...", "cd ../.."),
        ("g", "git"),
        ("d", "docker"),
        ("p", "python"),
        ("cls", "clear"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// User alias file (`~/.aishell_aliases`).
pub fn alias_file_path() -> PathBuf {
    expand_home("~/.aishell_aliases")
}

/// Read a JSON object of aliases. A missing or unreadable file yields nothing.
pub fn load_alias_file(path: &Path) -> BTreeMap<String, String> {
    if !path.exists() {
        return BTreeMap::new();
    }
    match std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|s| serde_json::from_str(&s).map_err(anyhow::Error::from))
    {
        Ok(aliases) => aliases,
        Err(e) => {
            warn!(path = %path.display(), "Ignoring alias file: {}", e);
            BTreeMap::new()
        }
    }
}

// ─────────────────────────────────────────────
// ShellSession
// ─────────────────────────────────────────────

/// Result of one command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    fn err(stderr: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// State of one interactive shell: working directory, exported variables,
/// aliases and in-memory history.
#[derive(Debug)]
pub struct ShellSession {
    cwd: PathBuf,
    env: BTreeMap<String, String>,
    aliases: BTreeMap<String, String>,
    history: VecDeque<String>,
    history_size: usize,
    timeout: Duration,
}

impl ShellSession {
    /// Session with explicit aliases; nothing is read from disk.
    pub fn new(cwd: PathBuf, aliases: BTreeMap<String, String>, config: &ShellConfig) -> Self {
        Self {
            cwd,
            env: BTreeMap::new(),
            aliases,
            history: VecDeque::new(),
            history_size: config.history_size.max(1),
            timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }

    /// Session in `cwd` with the default aliases, `~/.aishell_aliases`, and
    /// the configured aliases, later sources winning.
    pub fn from_config(cwd: PathBuf, config: &ShellConfig) -> Self {
        let mut aliases = default_aliases();
        aliases.extend(load_alias_file(&alias_file_path()));
        aliases.extend(config.aliases.clone());
        Self::new(cwd, aliases, config)
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    pub fn exported(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    /// Context handed to the natural-language converter.
    pub fn context(&self) -> ShellContext {
        ShellContext {
            cwd: self.cwd.clone(),
            os: std::env::consts::OS.to_string(),
            shell: "bash".to_string(),
        }
    }

    /// Seed history, e.g. from the persisted history file.
    pub fn load_history<I, S>(&mut self, entries: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for entry in entries {
            self.record(entry.into());
        }
    }

    /// Append to history. Empty lines and `exit`/`quit` are skipped.
    pub fn record(&mut self, command: impl Into<String>) {
        let command = command.into();
        let trimmed = command.trim();
        if trimmed.is_empty() || matches!(trimmed, "exit" | "quit") {
            return;
        }
        self.history.push_back(trimmed.to_string());
        while self.history.len() > self.history_size {
            self.history.pop_front();
        }
    }

    /// Replace the first word when it names an alias.
    pub fn expand_alias(&self, command: &str) -> String {
        let trimmed = command.trim_start();
        let (first, rest) = match trimmed.find(char::is_whitespace) {
            Some(i) => trimmed.split_at(i),
            None => (trimmed, ""),
        };
        match self.aliases.get(first) {
            Some(expansion) => format!("{expansion}{rest}"),
            None => command.to_string(),
        }
    }

    /// Working directory shown in the prompt, relative to home when inside it.
    pub fn display_dir(&self) -> String {
        let home = expand_home("~");
        match self.cwd.strip_prefix(&home) {
            Ok(rel) if rel.as_os_str().is_empty() => "~".to_string(),
            Ok(rel) => format!("~/{}", rel.display()),
            Err(_) => self.cwd.display().to_string(),
        }
    }

    /// Current git branch, if the working directory is inside a repository.
    pub async fn git_branch(&self) -> Option<String> {
        let output = Command::new("git")
            .args(["branch", "--show-current"])
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .ok()?;
        let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (output.status.success() && !branch.is_empty()).then_some(branch)
    }

    /// Prompt text: `~/dir [git:branch] $ `.
    pub async fn prompt(&self) -> String {
        match self.git_branch().await {
            Some(branch) => format!("{} [git:{}] $ ", self.display_dir(), branch),
            None => format!("{} $ ", self.display_dir()),
        }
    }

    /// Expand aliases, then run a builtin or an external command.
    pub async fn execute(&mut self, command: &str) -> anyhow::Result<CommandOutput> {
        let command = self.expand_alias(command);
        let command = command.trim();
        let (name, args) = match command.find(char::is_whitespace) {
            Some(i) => (&command[..i], command[i..].trim()),
            None => (command, ""),
        };

        match name {
            "cd" => Ok(self.change_dir(args)),
            "pwd" => Ok(CommandOutput::ok(format!("{}\n", self.cwd.display()))),
            "export" => Ok(self.export(args)),
            "alias" if args.is_empty() => Ok(self.list_aliases()),
            "history" if args.is_empty() => Ok(self.list_history()),
            "clear" => Ok(CommandOutput::ok(CLEAR_SEQUENCE)),
            _ => self.run_external(command).await,
        }
    }

    fn change_dir(&mut self, arg: &str) -> CommandOutput {
        let target = match split_words(arg).into_iter().next() {
            None => expand_home("~"),
            Some(dir) => {
                let dir = expand_home(&dir);
                if dir.is_absolute() {
                    dir
                } else {
                    self.cwd.join(dir)
                }
            }
        };

        match std::fs::canonicalize(&target) {
            Ok(resolved) if resolved.is_dir() => {
                debug!(cwd = %resolved.display(), "Changed directory");
                self.cwd = resolved;
                CommandOutput::ok("")
            }
            _ => CommandOutput::err(format!("cd: {}: No such directory\n", target.display())),
        }
    }

    fn export(&mut self, arg: &str) -> CommandOutput {
        if arg.is_empty() {
            let listing: String = self
                .env
                .iter()
                .map(|(k, v)| format!("export {k}={v}\n"))
                .collect();
            return CommandOutput::ok(listing);
        }
        let Some((name, value)) = arg.split_once('=') else {
            return CommandOutput::err("export: invalid syntax, expected NAME=value\n");
        };
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return CommandOutput::err("export: invalid variable name\n");
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        self.env.insert(name.to_string(), value.to_string());
        CommandOutput::ok(format!("Exported {name}={value}\n"))
    }

    fn list_aliases(&self) -> CommandOutput {
        let listing: String = self
            .aliases
            .iter()
            .map(|(name, cmd)| format!("{name}='{cmd}'\n"))
            .collect();
        CommandOutput::ok(listing)
    }

    fn list_history(&self) -> CommandOutput {
        let skip = self.history.len().saturating_sub(HISTORY_DISPLAY);
        let listing: String = self
            .history
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(i, cmd)| format!("{:5}  {}\n", i + 1, cmd))
            .collect();
        CommandOutput::ok(listing)
    }

    async fn run_external(&self, command: &str) -> anyhow::Result<CommandOutput> {
        info!(command = %command, cwd = %self.cwd.display(), "Executing shell command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.cwd)
            .envs(&self.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn command: {command}"))?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output.context("Command failed")?;
                Ok(CommandOutput {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            Err(_) => {
                warn!(command = %command, timeout = ?self.timeout, "Command timed out");
                Ok(CommandOutput {
                    exit_code: TIMEOUT_EXIT_CODE,
                    stdout: String::new(),
                    stderr: format!(
                        "Command timed out after {} seconds\n",
                        self.timeout.as_secs()
                    ),
                })
            }
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

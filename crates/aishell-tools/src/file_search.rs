//! File search through native OS tools: Spotlight (`mdfind`) on macOS,
//! `find` everywhere else, with `grep` for content matches.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, Local};
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Whole-search timeout.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-file content grep timeout.
const GREP_TIMEOUT: Duration = Duration::from_secs(5);

/// Content matches kept per file.
const MAX_MATCHES_PER_FILE: usize = 10;

/// Directories never descended into by `find`.
const EXCLUDED_DIRS: &[&str] = &[".git", "node_modules", "__pycache__", "target"];

static SIZE_FILTER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*([<>]=?)\s*(\d+(?:\.\d+)?)\s*([KMGT]?B)\s*$").ok());

// ─────────────────────────────────────────────
// Query / results
// ─────────────────────────────────────────────

/// What to look for.
#[derive(Clone, Debug, PartialEq)]
pub struct FileQuery {
    /// Name pattern with shell wildcards; `*` matches everything.
    pub pattern: String,
    pub path: PathBuf,
    /// Text that must appear in the file.
    pub content: Option<String>,
    /// `file`, `directory`, a Spotlight category (`image`, `code`, …) or an extension.
    pub file_type: Option<String>,
    /// e.g. `>1MB`, `<500KB`.
    pub size: Option<String>,
    /// `today`, `yesterday`, `last week`, `last month`, or a number of days.
    pub date: Option<String>,
    pub ignore_case: bool,
    pub max_results: usize,
    pub use_spotlight: bool,
}

impl Default for FileQuery {
    fn default() -> Self {
        Self {
            pattern: "*".to_string(),
            path: PathBuf::from("."),
            content: None,
            file_type: None,
            size: None,
            date: None,
            ignore_case: true,
            max_results: 1000,
            use_spotlight: true,
        }
    }
}

impl FileQuery {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Self::default()
        }
    }
}

/// One line of a file that matched the content pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentMatch {
    pub line: usize,
    pub text: String,
}

/// One file (or directory) found.
#[derive(Clone, Debug, PartialEq)]
pub struct FileHit {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Local>>,
    pub is_dir: bool,
    pub matches: Vec<ContentMatch>,
}

// ─────────────────────────────────────────────
// Command construction
// ─────────────────────────────────────────────

/// `find` invocation (program first) for `query`.
pub fn build_find_command(query: &FileQuery) -> Vec<String> {
    let mut cmd = vec!["find".to_string(), query.path.display().to_string()];

    if query.pattern != "*" {
        let flag = if query.ignore_case { "-iname" } else { "-name" };
        cmd.extend([flag.to_string(), query.pattern.clone()]);
    }

    if let Some(file_type) = &query.file_type {
        match file_type.as_str() {
            "directory" | "dir" | "d" => cmd.extend(["-type".into(), "d".into()]),
            "file" | "f" => cmd.extend(["-type".into(), "f".into()]),
            ext => cmd.extend(["-name".into(), format!("*.{}", ext.trim_start_matches('.'))]),
        }
    }

    if let Some(size) = &query.size {
        cmd.extend(["-size".into(), parse_size_filter(size)]);
    }

    if let Some(date) = &query.date {
        cmd.extend(parse_date_filter(date));
    }

    for dir in EXCLUDED_DIRS {
        cmd.extend(["!".into(), "-path".into(), format!("*/{dir}/*")]);
    }
    cmd
}

/// `mdfind` invocation (program first) for `query`.
pub fn build_spotlight_command(query: &FileQuery) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();

    if query.pattern != "*" {
        parts.push(format!("kMDItemDisplayName == '*{}*'", query.pattern));
    }
    if let Some(content) = &query.content {
        parts.push(format!("kMDItemTextContent == '*{content}*'"));
    }
    if let Some(file_type) = &query.file_type {
        parts.extend(spotlight_type_query(file_type));
    }

    let mut cmd = vec!["mdfind".to_string()];
    if query.path != Path::new(".") {
        cmd.extend(["-onlyin".to_string(), query.path.display().to_string()]);
    }
    if parts.is_empty() {
        cmd.push("*".to_string());
    } else {
        let joined = parts
            .iter()
            .map(|p| format!("({p})"))
            .collect::<Vec<_>>()
            .join(" && ");
        cmd.push(joined);
    }
    cmd
}

fn spotlight_type_query(file_type: &str) -> Vec<String> {
    let content_type = |t: &str| format!("kMDItemContentType == \"{t}\"");
    match file_type {
        "image" => vec![content_type("public.image")],
        "video" => vec![content_type("public.movie")],
        "audio" => vec![content_type("public.audio")],
        "text" => vec![content_type("public.text")],
        "pdf" => vec![content_type("com.adobe.pdf")],
        "code" => std::iter::once(content_type("public.source-code"))
            .chain(
                ["py", "js", "ts", "java", "c", "cpp", "rs"]
                    .iter()
                    .map(|ext| format!("kMDItemDisplayName == \"*.{ext}\"")),
            )
            .collect(),
        ext => vec![format!(
            "kMDItemDisplayName == \"*.{}\"",
            ext.trim_start_matches('.')
        )],
    }
}

/// `>1MB` → `+1048576c`, `<500KB` → `-512000c`. Anything unparseable is
/// passed through to `find` untouched.
pub fn parse_size_filter(filter: &str) -> String {
    let Some(caps) = SIZE_FILTER.as_ref().and_then(|re| re.captures(filter)) else {
        return filter.to_string();
    };
    let multiplier: f64 = match caps[3].to_uppercase().as_str() {
        "KB" => 1024.0,
        "MB" => 1024.0 * 1024.0,
        "GB" => 1024.0 * 1024.0 * 1024.0,
        "TB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    };
    let value: f64 = caps[2].parse().unwrap_or(0.0);
    let bytes = (value * multiplier) as u64;
    let sign = if caps[1].starts_with('>') { '+' } else { '-' };
    format!("{sign}{bytes}c")
}

/// `find -mtime` arguments for a date filter; empty when unrecognized.
pub fn parse_date_filter(filter: &str) -> Vec<String> {
    let days = match filter.trim().to_lowercase().as_str() {
        "today" => "-1".to_string(),
        "yesterday" => "1".to_string(),
        "last week" => "-7".to_string(),
        "last month" => "-30".to_string(),
        other => match other.parse::<u32>() {
            Ok(n) => format!("-{n}"),
            Err(_) => {
                warn!(filter = filter, "Ignoring unrecognized date filter");
                return Vec::new();
            }
        },
    };
    vec!["-mtime".to_string(), days]
}

// ─────────────────────────────────────────────
// FileSearch
// ─────────────────────────────────────────────

/// Runs file searches with the best tool available.
#[derive(Clone, Debug)]
pub struct FileSearch {
    spotlight_available: bool,
    timeout: Duration,
}

impl Default for FileSearch {
    fn default() -> Self {
        Self::new(false)
    }
}

impl FileSearch {
    pub fn new(spotlight_available: bool) -> Self {
        Self {
            spotlight_available,
            timeout: SEARCH_TIMEOUT,
        }
    }

    /// Probe for Spotlight (macOS with a working `mdfind`).
    pub async fn detect() -> Self {
        let available = cfg!(target_os = "macos")
            && Command::new("mdfind")
                .arg("-help")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .is_ok();
        debug!(spotlight = available, "File search backend detected");
        Self::new(available)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn spotlight_available(&self) -> bool {
        self.spotlight_available
    }

    /// Run `query`, returning at most `max_results` hits.
    pub async fn search(&self, query: &FileQuery) -> anyhow::Result<Vec<FileHit>> {
        let use_spotlight = query.use_spotlight && self.spotlight_available;
        let cmd = if use_spotlight {
            let mut scoped = query.clone();
            if scoped.path != Path::new(".") {
                scoped.path = resolve(&scoped.path);
            }
            build_spotlight_command(&scoped)
        } else {
            let mut rooted = query.clone();
            rooted.path = resolve(&rooted.path);
            build_find_command(&rooted)
        };

        info!(
            backend = if use_spotlight { "spotlight" } else { "find" },
            pattern = %query.pattern,
            "Searching files"
        );
        let stdout = self.run(&cmd).await?;

        // mdfind already filtered on content; find did not
        let require_match = query.content.is_some() && !use_spotlight;

        let mut hits = Vec::new();
        for line in stdout.lines().filter(|l| !l.is_empty()) {
            if hits.len() >= query.max_results {
                break;
            }
            let path = PathBuf::from(line);
            let Ok(meta) = tokio::fs::metadata(&path).await else {
                continue;
            };

            let matches = match &query.content {
                Some(pattern) if meta.is_file() => grep_content(&path, pattern).await,
                _ => Vec::new(),
            };
            if require_match && matches.is_empty() {
                continue;
            }

            hits.push(FileHit {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| line.to_string()),
                size: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Local>::from),
                is_dir: meta.is_dir(),
                matches,
                path,
            });
        }

        debug!(hits = hits.len(), "File search complete");
        Ok(hits)
    }

    async fn run(&self, cmd: &[String]) -> anyhow::Result<String> {
        let Some((program, args)) = cmd.split_first() else {
            bail!("empty search command");
        };

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to run {program}"))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .with_context(|| format!("Search timed out after {}s", self.timeout.as_secs()))?
            .with_context(|| format!("{program} failed"))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // find exits non-zero on unreadable directories but still reports what it saw
            if stdout.trim().is_empty() {
                bail!("Search command failed: {}", stderr.trim());
            }
            warn!(program = %program, "Search finished with errors: {}", stderr.trim());
        }
        Ok(stdout)
    }
}

fn resolve(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Case-insensitive `grep -n` over one file.
async fn grep_content(path: &Path, pattern: &str) -> Vec<ContentMatch> {
    let output = Command::new("grep")
        .args(["-n", "-i", "-e", pattern])
        .arg(path)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(GREP_TIMEOUT, output).await {
        Ok(Ok(output)) if output.status.success() => output,
        _ => return Vec::new(),
    };

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| {
            let (number, text) = line.split_once(':')?;
            Some(ContentMatch {
                line: number.parse().ok()?,
                text: text.trim().to_string(),
            })
        })
        .take(MAX_MATCHES_PER_FILE)
        .collect()
}

/// Human-readable size: `1.5 KB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} PB")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_filter() {
        assert_eq!(parse_size_filter(">1MB"), "+1048576c");
        assert_eq!(parse_size_filter("<500KB"), "-512000c");
        assert_eq!(parse_size_filter(">= 2 gb"), "+2147483648c");
        assert_eq!(parse_size_filter("+10k"), "+10k");
    }

    #[test]
    fn test_date_filter() {
        assert_eq!(parse_date_filter("today"), vec!["-mtime", "-1"]);
        assert_eq!(parse_date_filter("Yesterday"), vec!["-mtime", "1"]);
        assert_eq!(parse_date_filter("last week"), vec!["-mtime", "-7"]);
        assert_eq!(parse_date_filter("last month"), vec!["-mtime", "-30"]);
        assert_eq!(parse_date_filter("3"), vec!["-mtime", "-3"]);
        assert!(parse_date_filter("someday").is_empty());
    }

    #[test]
    fn test_build_find_command() {
        let query = FileQuery {
            path: PathBuf::from("/src"),
            file_type: Some("rs".into()),
            size: Some(">1MB".into()),
            date: Some("today".into()),
            ..FileQuery::new("main*")
        };
        let cmd = build_find_command(&query);
        let joined = cmd.join(" ");
        assert!(joined.starts_with("find /src -iname main* -name *.rs -size +1048576c -mtime -1"));
        assert!(joined.contains("! -path */.git/*"));
        assert!(joined.contains("! -path */node_modules/*"));
        assert!(joined.contains("! -path */target/*"));
    }

    #[test]
    fn test_build_find_command_type_and_case() {
        let query = FileQuery {
            ignore_case: false,
            file_type: Some("directory".into()),
            ..FileQuery::new("src")
        };
        let cmd = build_find_command(&query);
        assert_eq!(&cmd[..6], ["find", ".", "-name", "src", "-type", "d"]);

        let everything = build_find_command(&FileQuery::default());
        assert_eq!(everything[2], "!");
    }

    #[test]
    fn test_build_spotlight_command() {
        let query = FileQuery {
            content: Some("TODO".into()),
            file_type: Some("pdf".into()),
            ..FileQuery::new("report")
        };
        assert_eq!(
            build_spotlight_command(&query),
            vec![
                "mdfind".to_string(),
                "(kMDItemDisplayName == '*report*') && (kMDItemTextContent == '*TODO*') && (kMDItemContentType == \"com.adobe.pdf\")".to_string(),
            ]
        );

        let scoped = FileQuery {
            path: PathBuf::from("/Users/me/Documents"),
            file_type: Some("md".into()),
            ..FileQuery::default()
        };
        assert_eq!(
            build_spotlight_command(&scoped),
            vec![
                "mdfind",
                "-onlyin",
                "/Users/me/Documents",
                "(kMDItemDisplayName == \"*.md\")",
            ]
        );
        assert_eq!(build_spotlight_command(&FileQuery::default()), vec!["mdfind", "*"]);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512.0 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "alpha\nNeedle here\nomega\n").unwrap();
        std::fs::write(dir.path().join("other.txt"), "nothing to see\n").unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}\n").unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules").join("dep.txt"), "needle\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_find_by_name() {
        let dir = fixture();
        let query = FileQuery {
            path: dir.path().to_path_buf(),
            use_spotlight: false,
            ..FileQuery::new("*.txt")
        };
        let hits = FileSearch::default().search(&query).await.unwrap();
        let mut names: Vec<_> = hits.iter().map(|h| h.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["notes.txt", "other.txt"]);
        assert!(hits.iter().all(|h| !h.is_dir && h.size > 0));
    }

    #[tokio::test]
    async fn test_find_with_content() {
        let dir = fixture();
        let query = FileQuery {
            path: dir.path().to_path_buf(),
            content: Some("needle".into()),
            use_spotlight: false,
            ..FileQuery::new("*.txt")
        };
        let hits = FileSearch::default().search(&query).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "notes.txt");
        assert_eq!(
            hits[0].matches,
            vec![ContentMatch {
                line: 2,
                text: "Needle here".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_find_respects_max_results() {
        let dir = fixture();
        let query = FileQuery {
            path: dir.path().to_path_buf(),
            file_type: Some("file".into()),
            max_results: 2,
            use_spotlight: false,
            ..FileQuery::default()
        };
        let hits = FileSearch::default().search(&query).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_spotlight_request_falls_back_to_find() {
        let dir = fixture();
        let query = FileQuery {
            path: dir.path().to_path_buf(),
            ..FileQuery::new("main.rs")
        };
        // use_spotlight is set but the backend is unavailable
        let hits = FileSearch::new(false).search(&query).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "main.rs");
    }

    #[tokio::test]
    async fn test_missing_root_is_error() {
        let query = FileQuery {
            path: PathBuf::from("/definitely/not/here"),
            use_spotlight: false,
            ..FileQuery::default()
        };
        assert!(FileSearch::default().search(&query).await.is_err());
    }
}

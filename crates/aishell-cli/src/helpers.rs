//! Shared CLI helpers — result panels, the collation table, search output.

use std::path::Path;

use colored::Colorize;

use aishell_core::{CollationResult, QueryResult};
use aishell_tools::file_search::format_size;
use aishell_tools::{FileHit, SearchHit};

const DEFAULT_WIDTH: usize = 100;
const MIN_COLUMN: usize = 16;

/// Show a path with the home directory abbreviated to `~`.
pub fn tilde_path(path: &Path) -> String {
    if let Some(home) = dirs_next::home_dir() {
        if let Ok(rest) = path.strip_prefix(&home) {
            if rest.as_os_str().is_empty() {
                return "~".to_string();
            }
            return format!("~/{}", rest.display());
        }
    }
    path.display().to_string()
}

/// Terminal width from `$COLUMNS`, or a fixed default.
pub fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|c| c.parse().ok())
        .filter(|w: &usize| *w >= 40)
        .unwrap_or(DEFAULT_WIDTH)
}

fn rule(title: &str, width: usize) -> String {
    let used = title.chars().count() + 4;
    format!("── {} {}", title, "─".repeat(width.saturating_sub(used)))
}

// ─────────────────────────────────────────────
// Query results
// ─────────────────────────────────────────────

/// Print one provider result as a panel.
pub fn print_result(result: &QueryResult) {
    match result {
        QueryResult::Success { .. } => {
            let width = terminal_width();
            let title = match result.model_name() {
                Some(model) => format!("{} ({})", result.provider_name(), model),
                None => result.provider_name().to_string(),
            };
            println!();
            println!("{}", rule(&title, width).cyan().bold());
            println!("{}", result.text().unwrap_or_default());
            if let Some(usage) = result.usage() {
                println!("{}", usage.to_string().dimmed());
            }
            println!("{}", "─".repeat(width).cyan());
        }
        QueryResult::Failure { .. } => {
            print_failure(result.provider_name(), result.error_message().unwrap_or("unknown error"))
        }
    }
}

/// Print a provider failure as a red panel.
pub fn print_failure(provider: &str, message: &str) {
    let width = terminal_width();
    println!();
    println!("{}", rule(&format!("✗ {provider}"), width).red().bold());
    println!("{}", message.red());
    println!("{}", "─".repeat(width).red());
}

/// Header printed before a streamed answer.
pub fn print_stream_header(provider: &str) {
    println!();
    println!("{}", rule(provider, terminal_width()).cyan().bold());
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "Error:".red().bold(), message);
}

/// One line counting successes and failures.
pub fn print_collation_summary(results: &CollationResult) {
    let ok = results.successes().count();
    let failed = results.failures().count();
    println!();
    if failed == 0 {
        println!("{}", format!("{ok} of {} providers answered", results.len()).green());
    } else {
        println!(
            "{}",
            format!("{ok} of {} providers answered, {failed} failed", results.len()).yellow()
        );
    }
}

/// Print answers side by side.
pub fn print_collation_table(results: &CollationResult) {
    println!();
    print!("{}", render_table(results, terminal_width()));
}

/// Render collation results as columns that fit in `width` characters.
pub fn render_table(results: &CollationResult, width: usize) -> String {
    let n = results.len();
    if n == 0 {
        return String::new();
    }
    let column = (width.saturating_sub(3 * n + 1) / n).max(MIN_COLUMN);

    let headers: Vec<String> = results
        .iter()
        .map(|r| match r {
            QueryResult::Success { .. } => r.provider_name().to_string(),
            QueryResult::Failure { .. } => format!("{} (failed)", r.provider_name()),
        })
        .collect();
    let bodies: Vec<Vec<String>> = results
        .iter()
        .map(|r| match r.text() {
            Some(text) => wrap(text, column),
            None => wrap(r.error_message().unwrap_or_default(), column),
        })
        .collect();

    let border = |left: &str, mid: &str, right: &str| {
        let segments: Vec<String> = (0..n).map(|_| "─".repeat(column + 2)).collect();
        format!("{left}{}{right}\n", segments.join(mid))
    };
    let row = |cells: Vec<String>| {
        let cells: Vec<String> = cells.iter().map(|c| format!(" {} ", pad(c, column))).collect();
        format!("│{}│\n", cells.join("│"))
    };

    let mut out = border("┌", "┬", "┐");
    out.push_str(&row(headers.iter().map(|h| truncate(h, column)).collect()));
    out.push_str(&border("├", "┼", "┤"));
    let height = bodies.iter().map(Vec::len).max().unwrap_or(0);
    for line in 0..height {
        out.push_str(&row(bodies
            .iter()
            .map(|b| b.get(line).cloned().unwrap_or_default())
            .collect()));
    }
    out.push_str(&border("└", "┴", "┘"));
    out
}

/// Greedy word wrap; words longer than `width` are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                lines.push(word.drain(..width).collect());
            }
            let word: String = word.into_iter().collect();
            let needed = current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
            if needed > width && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        lines.push(current);
    }
    lines
}

fn pad(s: &str, width: usize) -> String {
    let len = s.chars().count();
    format!("{}{}", s, " ".repeat(width.saturating_sub(len)))
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        aishell_core::utils::truncate_string(s, width)
    }
}

// ─────────────────────────────────────────────
// Search output
// ─────────────────────────────────────────────

pub fn print_file_hits(hits: &[FileHit]) {
    if hits.is_empty() {
        println!("{}", "No files found.".yellow());
        return;
    }
    for hit in hits {
        let name = if hit.is_dir {
            format!("{}/", hit.name).blue().bold()
        } else {
            hit.name.bold()
        };
        let size = if hit.is_dir { "-".to_string() } else { format_size(hit.size) };
        let modified = hit
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{:<40} {:>10}  {}  {}", name, size, modified.dimmed(), tilde_path(&hit.path).dimmed());
        for m in &hit.matches {
            println!("    {} {}", format!("{}:", m.line).yellow(), m.text.trim());
        }
    }
    println!();
    println!("{}", format!("Found {} result(s)", hits.len()).green());
}

pub fn print_search_hits(query: &str, hits: &[SearchHit]) {
    println!();
    println!("{} {}", "Results for".bold(), query.cyan());
    if hits.is_empty() {
        println!("{}", "No results.".yellow());
        return;
    }
    for (i, hit) in hits.iter().enumerate() {
        println!();
        println!("{:>2}. {}", i + 1, hit.title.bold());
        println!("    {}", hit.url.blue().underline());
        if !hit.snippet.is_empty() {
            for line in wrap(&hit.snippet, terminal_width().saturating_sub(4)) {
                println!("    {}", line.dimmed());
            }
        }
    }
    println!();
}

// ─────────────────────────────────────────────
// Shell banner / help
// ─────────────────────────────────────────────

/// Print the banner shown at shell start.
pub fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "aishell".green().bold(), version.dimmed());
    println!("{}", "Type 'help' for commands, 'exit' to quit.".dimmed());
    println!();
}

pub fn print_shell_help() {
    const COMMANDS: &[(&str, &str)] = &[
        ("help", "Show this help message"),
        ("exit/quit", "Exit the shell"),
        ("cd <dir>", "Change directory"),
        ("pwd", "Print working directory"),
        ("export VAR=value", "Set environment variable"),
        ("alias", "Show all aliases"),
        ("history", "Show command history"),
        ("clear/cls", "Clear the screen"),
        ("?<request>", "Convert natural language to a command"),
        ("llm <provider> <prompt>", "Ask one provider"),
        ("collate <p1> <p2> -- <prompt>", "Ask several providers"),
    ];
    const EXAMPLES: &[&str] = &[
        "?list all python files",
        "?show disk usage",
        "?find large files",
        "?check running processes",
    ];

    println!();
    println!("{}", "Commands".bold());
    for (cmd, desc) in COMMANDS {
        println!("  {:<32} {}", cmd.cyan(), desc);
    }
    println!();
    println!("{}", "Natural language examples".bold());
    for example in EXAMPLES {
        println!("  {}", example.cyan());
    }
    println!();
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

//! Interactive shell.
//!
//! Uses `rustyline` for editing, persistent history and tab completion;
//! [`ShellSession`] does the actual work.

use anyhow::Result;
use colored::Colorize;
use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::config::Configurer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Context, Editor, Helper};
use tracing::debug;

use aishell_core::utils::get_history_path;
use aishell_core::{ConfigHandle, ProviderKind, QueryRequest};
use aishell_providers::Dispatcher;
use aishell_tools::shell::{check_dangerous, suggest_completions, TIMEOUT_EXIT_CODE};
use aishell_tools::nl_converter::convert_offline;
use aishell_tools::{parse_input, CommandOutput, NlConverter, ShellInput, ShellSession};

use crate::helpers;

type ShellEditor = Editor<ShellHelper, DefaultHistory>;

// ─────────────────────────────────────────────
// Completion
// ─────────────────────────────────────────────

/// Subcommand completion for common tools, file names otherwise.
struct ShellHelper {
    files: FilenameCompleter,
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, ctx: &Context<'_>) -> rustyline::Result<(usize, Vec<Pair>)> {
        let head = &line[..pos];
        let suggestions = suggest_completions(head);
        if suggestions.is_empty() {
            return self.files.complete(line, pos, ctx);
        }
        let start = head.rfind(char::is_whitespace).map_or(0, |i| i + 1);
        let pairs = suggestions
            .into_iter()
            .map(|s| Pair {
                display: s.clone(),
                replacement: s,
            })
            .collect();
        Ok((start, pairs))
    }
}

impl Hinter for ShellHelper {
    type Hint = String;
}

impl Highlighter for ShellHelper {}

impl Validator for ShellHelper {}

impl Helper for ShellHelper {}

// ─────────────────────────────────────────────
// Loop
// ─────────────────────────────────────────────

/// Run the interactive shell until `exit` or end of input.
pub async fn run(handle: ConfigHandle) -> Result<()> {
    let config = handle.snapshot();
    let dispatcher = crate::build_dispatcher(config.clone());
    let converter = NlConverter::new(
        dispatcher.clone(),
        config.shell.converter_provider(&config.defaults),
    );

    let cwd = std::env::current_dir()?;
    let mut session = ShellSession::from_config(cwd, &config.shell);
    let mut editor = create_editor(config.shell.history_size)?;
    session.load_history(editor.history().iter().cloned());

    helpers::print_banner();

    loop {
        let prompt = session.prompt().await;
        let line = match editor.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("{}", "Use 'exit' to quit".yellow());
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let input = match parse_input(&line) {
            Ok(input) => input,
            Err(e) => {
                helpers::print_error(&e.to_string());
                continue;
            }
        };

        match input {
            ShellInput::Empty => {}
            ShellInput::Exit => break,
            ShellInput::Help => helpers::print_shell_help(),
            ShellInput::NaturalLanguage(request) => {
                let _ = editor.add_history_entry(line.trim());
                convert_and_run(&converter, &mut session, &mut editor, &request).await;
            }
            ShellInput::Llm { provider, prompt } => {
                let _ = editor.add_history_entry(line.trim());
                let request = QueryRequest::from_defaults(prompt, &config.defaults);
                match dispatcher.dispatch_single(provider.as_str(), &request).await {
                    Ok(result) => helpers::print_result(&result),
                    Err(e) => helpers::print_error(&e.to_string()),
                }
            }
            ShellInput::Collate { providers, prompt } => {
                let _ = editor.add_history_entry(line.trim());
                collate(&dispatcher, &providers, QueryRequest::from_defaults(prompt, &config.defaults)).await;
            }
            ShellInput::Command(command) => {
                let _ = editor.add_history_entry(line.trim());
                session.record(command.as_str());
                if let Some(label) = check_dangerous(&command) {
                    println!("{}", format!("Warning: potentially dangerous command ({label})").red().bold());
                    if !confirm(&mut editor, "Continue anyway?", false) {
                        continue;
                    }
                }
                run_command(&mut session, &command).await;
            }
        }
    }

    println!("{}", "Goodbye!".yellow());
    save_history(&mut editor);
    Ok(())
}

async fn collate(
    dispatcher: &Dispatcher,
    providers: &[ProviderKind],
    request: QueryRequest,
) {
    let names: Vec<&str> = providers.iter().map(|p| p.as_str()).collect();
    match dispatcher.dispatch_collation(&names, &request).await {
        Ok(results) => {
            for result in results.iter() {
                helpers::print_result(result);
            }
            helpers::print_collation_summary(&results);
        }
        Err(e) => helpers::print_error(&e.to_string()),
    }
}

async fn convert_and_run(
    converter: &NlConverter,
    session: &mut ShellSession,
    editor: &mut ShellEditor,
    request: &str,
) {
    println!("{}", format!("Converting: {request}").dimmed());

    let command = match converter.convert(request, &session.context()).await {
        Ok(Some(command)) => command,
        Ok(None) => {
            println!("{}", "Could not convert to a command. Try rephrasing.".yellow());
            return;
        }
        Err(e) => {
            helpers::print_error(&format!("{} ({})", e, converter.provider()));
            match convert_offline(request) {
                Some(command) => {
                    println!("{}", "Using built-in patterns instead".dimmed());
                    command
                }
                None => return,
            }
        }
    };

    println!("{} {}", "Command:".green(), command);
    if let Some(label) = check_dangerous(&command) {
        println!("{}", format!("Warning: potentially dangerous command ({label})").red().bold());
    }
    if confirm(editor, "Execute this command?", check_dangerous(&command).is_none()) {
        let _ = editor.add_history_entry(command.as_str());
        session.record(command.as_str());
        run_command(session, &command).await;
    }
}

async fn run_command(session: &mut ShellSession, command: &str) {
    match session.execute(command).await {
        Ok(output) => print_output(&output),
        Err(e) => helpers::print_error(&e.to_string()),
    }
    // keep file-name completion relative to the shell's directory
    if let Err(e) = std::env::set_current_dir(session.cwd()) {
        debug!("failed to follow cwd: {e}");
    }
}

fn print_output(output: &CommandOutput) {
    if !output.stdout.is_empty() {
        print!("{}", output.stdout);
    }
    if !output.stderr.is_empty() {
        eprint!("{}", output.stderr.red());
    }
    if output.exit_code == TIMEOUT_EXIT_CODE {
        println!("{}", "Command timed out".dimmed());
    } else if !output.success() {
        println!("{}", format!("Exit code: {}", output.exit_code).dimmed());
    }
}

/// Ask a yes/no question; interrupt or end of input counts as "no".
fn confirm(editor: &mut ShellEditor, question: &str, default_yes: bool) -> bool {
    let hint = if default_yes { "[Y/n]" } else { "[y/N]" };
    match editor.readline(&format!("{question} {hint} ")) {
        Ok(answer) => parse_answer(&answer, default_yes),
        Err(_) => false,
    }
}

fn parse_answer(answer: &str, default_yes: bool) -> bool {
    match answer.trim().to_lowercase().as_str() {
        "" => default_yes,
        "y" | "yes" => true,
        _ => false,
    }
}

/// Create a rustyline editor with history and completion.
fn create_editor(history_size: usize) -> Result<ShellEditor> {
    let mut editor: ShellEditor = Editor::new()?;
    editor.set_max_history_size(history_size.max(1))?;
    editor.set_completion_type(CompletionType::List);
    editor.set_auto_add_history(false);
    editor.set_helper(Some(ShellHelper {
        files: FilenameCompleter::new(),
    }));

    let history_path = get_history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
        debug!("loaded shell history from {}", history_path.display());
    }

    Ok(editor)
}

/// Save history to disk.
fn save_history(editor: &mut ShellEditor) {
    let path = get_history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

//! aishell CLI — entry point.
//!
//! # Commands
//!
//! - `aishell llm <provider> <prompt…>` — query one provider
//! - `aishell collate <provider>… <prompt>` — query several providers side by side
//! - `aishell shell` — interactive shell with natural-language commands
//! - `aishell find <pattern>` — file search
//! - `aishell search <query…>` — web search
//! - `aishell mcp <server> <method> [params]` — call an MCP server
//! - `aishell mcp <server> <request…>` — same, from a natural-language request
//! - `aishell env` — show (or reload) configuration variables
//! - `aishell status` — show configuration and provider status
//! - `aishell init` — write a default config file

mod env_cmd;
mod helpers;
mod init;
mod repl;
mod status;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::info;

use aishell_core::config::schema::Defaults;
use aishell_core::utils::expand_home;
use aishell_core::{Config, ConfigHandle, QueryRequest, TranscriptLogger};
use aishell_providers::registry::find_by_name;
use aishell_providers::{failure_message, Dispatcher, ProviderRegistry};
use aishell_tools::mcp::resolve_server;
use aishell_tools::mcp_capabilities::context_prompt;
use aishell_tools::mcp_translator::{suggestions, McpCall, McpTranslator};
use aishell_tools::{FileQuery, FileSearch, McpClient, McpMethod, WebSearch};

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// aishell — query and compare LLM providers from the command line
#[derive(Parser)]
#[command(name = "aishell", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true, default_value_t = false)]
    logs: bool,

    /// Config file (default: ~/.aishell/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a prompt to one provider
    Llm {
        /// claude, openai, gemini, ollama or openrouter
        provider: String,

        /// Prompt text (words are joined with spaces)
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,

        /// Print the answer as it arrives
        #[arg(long, default_value_t = false)]
        stream: bool,

        #[command(flatten)]
        sampling: SamplingArgs,
    },

    /// Send one prompt to several providers concurrently
    Collate {
        /// Provider names followed by the prompt (the last argument)
        #[arg(required = true, num_args = 2.., value_name = "PROVIDER… PROMPT")]
        args: Vec<String>,

        /// Show answers side by side
        #[arg(long, default_value_t = false)]
        table: bool,

        /// Give each provider at most this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        #[command(flatten)]
        sampling: SamplingArgs,
    },

    /// Start the interactive shell
    Shell,

    /// Search for files
    Find {
        /// Name pattern (shell wildcards)
        pattern: String,

        /// Directory to search
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        /// Text the files must contain
        #[arg(short, long)]
        content: Option<String>,

        /// file, directory, a category (image, code, …) or an extension
        #[arg(short = 't', long = "type")]
        file_type: Option<String>,

        /// Size filter such as ">1MB" or "<500KB"
        #[arg(long)]
        size: Option<String>,

        /// today, yesterday, "last week", "last month" or a number of days
        #[arg(long)]
        date: Option<String>,

        /// Maximum number of results
        #[arg(short, long, default_value_t = 100)]
        limit: usize,

        /// Match names case-sensitively
        #[arg(long, default_value_t = false)]
        case_sensitive: bool,

        /// Always use find, even where Spotlight is available
        #[arg(long, default_value_t = false)]
        no_spotlight: bool,
    },

    /// Search the web
    Search {
        /// Query text
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// duckduckgo or brave
        #[arg(short, long)]
        engine: Option<String>,
    },

    /// Call a method on an MCP server
    Mcp {
        /// Configured server name or URL
        server: String,

        /// A method (initialize, ping, tools/list, tools/call, resources/list,
        /// resources/read, prompts/list, prompts/get) and optional JSON
        /// parameters, or a request in plain words
        #[arg(required = true, num_args = 1..)]
        request: Vec<String>,
    },

    /// Show configuration variables (secrets masked)
    Env {
        /// Re-read the .env file and show what changed
        #[arg(long, default_value_t = false)]
        reload: bool,

        /// Only show variables whose name contains this text
        filter: Option<String>,
    },

    /// Show configuration and provider status
    Status,

    /// Write a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

/// Sampling overrides shared by `llm` and `collate`.
#[derive(Args, Clone, Debug, Default)]
struct SamplingArgs {
    /// Sampling temperature (default from config)
    #[arg(short, long)]
    temperature: Option<f64>,

    /// Maximum tokens to generate (default from config)
    #[arg(short = 'm', long)]
    max_tokens: Option<u32>,
}

impl SamplingArgs {
    fn request(&self, prompt: String, defaults: &Defaults) -> QueryRequest {
        let mut request = QueryRequest::from_defaults(prompt, defaults);
        if let Some(t) = self.temperature {
            request = request.temperature(t);
        }
        if let Some(m) = self.max_tokens {
            request = request.max_tokens(m);
        }
        request
    }
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.logs);

    let config_path = cli.config.as_deref();
    let handle = ConfigHandle::load(config_path);

    match cli.command {
        Commands::Llm {
            provider,
            prompt,
            stream,
            sampling,
        } => run_llm(&handle, &provider, prompt, stream, &sampling).await,
        Commands::Collate {
            args,
            table,
            timeout,
            sampling,
        } => run_collate(&handle, args, table, timeout, &sampling).await,
        Commands::Shell => repl::run(handle).await,
        Commands::Find {
            pattern,
            path,
            content,
            file_type,
            size,
            date,
            limit,
            case_sensitive,
            no_spotlight,
        } => {
            let query = FileQuery {
                pattern,
                path,
                content,
                file_type,
                size,
                date,
                ignore_case: !case_sensitive,
                max_results: limit,
                use_spotlight: !no_spotlight,
            };
            run_find(&query).await
        }
        Commands::Search {
            query,
            limit,
            engine,
        } => run_search(&handle, &query.join(" "), limit, engine).await,
        Commands::Mcp { server, request } => run_mcp(&handle, &server, &request).await,
        Commands::Env { reload, filter } => env_cmd::run(&handle, reload, filter.as_deref()),
        Commands::Status => status::run(&handle, config_path),
        Commands::Init { force } => init::run(config_path, force),
    }
}

/// Build a dispatcher (registry + transcript) from a config snapshot.
pub fn build_dispatcher(config: Arc<Config>) -> Dispatcher {
    let transcript = if config.transcript.enabled {
        TranscriptLogger::new(
            expand_home(&config.transcript.path),
            expand_home(&config.transcript.error_path),
        )
    } else {
        TranscriptLogger::disabled()
    };
    let registry = ProviderRegistry::new(config);
    Dispatcher::new(Arc::new(registry), Arc::new(transcript))
}

// ─────────────────────────────────────────────
// llm / collate
// ─────────────────────────────────────────────

async fn run_llm(
    handle: &ConfigHandle,
    provider: &str,
    prompt: Vec<String>,
    stream: bool,
    sampling: &SamplingArgs,
) -> Result<()> {
    let config = handle.snapshot();
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        bail!("missing prompt");
    }
    let request = sampling.request(prompt, &config.defaults);
    let dispatcher = build_dispatcher(config);

    if !stream {
        let result = dispatcher.dispatch_single(provider, &request).await?;
        helpers::print_result(&result);
        return Ok(());
    }

    let mut chunks = dispatcher.stream_single(provider, &request.stream(true))?;
    helpers::print_stream_header(provider);
    let mut stdout = std::io::stdout();
    while let Some(chunk) = chunks.next().await {
        match chunk {
            Ok(text) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            Err(e) => {
                println!();
                let display = find_by_name(provider).map_or(provider, |spec| spec.display_name);
                helpers::print_failure(provider, &failure_message(display, &e));
                return Ok(());
            }
        }
    }
    println!();
    println!();
    Ok(())
}

async fn run_collate(
    handle: &ConfigHandle,
    args: Vec<String>,
    table: bool,
    timeout: Option<u64>,
    sampling: &SamplingArgs,
) -> Result<()> {
    let Some((prompt, providers)) = args.split_last() else {
        bail!("usage: aishell collate <provider>... <prompt>");
    };
    if providers.is_empty() {
        bail!("collate needs at least one provider before the prompt");
    }
    if prompt.trim().is_empty() {
        bail!("missing prompt");
    }

    let config = handle.snapshot();
    let request = sampling.request(prompt.clone(), &config.defaults);
    let mut dispatcher = build_dispatcher(config);
    if let Some(secs) = timeout {
        dispatcher = dispatcher.with_timeout(Duration::from_secs(secs));
    }

    let results = dispatcher.dispatch_collation(providers, &request).await?;
    if table {
        helpers::print_collation_table(&results);
    } else {
        for result in results.iter() {
            helpers::print_result(result);
        }
    }
    helpers::print_collation_summary(&results);
    Ok(())
}

// ─────────────────────────────────────────────
// find / search
// ─────────────────────────────────────────────

async fn run_find(query: &FileQuery) -> Result<()> {
    let search = FileSearch::detect().await;
    info!(pattern = %query.pattern, spotlight = search.spotlight_available(), "Searching files");

    let hits = search
        .search(query)
        .await
        .with_context(|| format!("file search for '{}' failed", query.pattern))?;
    helpers::print_file_hits(&hits);
    Ok(())
}

async fn run_search(
    handle: &ConfigHandle,
    query: &str,
    limit: Option<usize>,
    engine: Option<String>,
) -> Result<()> {
    let config = handle.snapshot();
    let mut search_config = config.search.clone();
    if let Some(engine) = engine {
        search_config.engine = engine;
    }
    let limit = limit.unwrap_or(search_config.limit);

    let search = WebSearch::from_config(&search_config)?;
    let hits = search
        .search(query, limit)
        .await
        .with_context(|| format!("{} search failed", search.engine()))?;
    helpers::print_search_hits(query, &hits);
    Ok(())
}

// ─────────────────────────────────────────────
// mcp
// ─────────────────────────────────────────────

async fn run_mcp(handle: &ConfigHandle, server: &str, request: &[String]) -> Result<()> {
    let config = handle.snapshot();
    let url = resolve_server(server, &config.mcp.servers)?;
    let McpCall { method, params } = match split_mcp_request(request)? {
        Some(call) => call,
        None => translate_mcp_request(&config, &request.join(" ")).await?,
    };
    info!(server, method = %method, "Calling MCP server");

    let client = McpClient::new(&url, Duration::from_secs(config.mcp.timeout_secs))?;
    let response = match method {
        McpMethod::Initialize => client.initialize(Some(params.unwrap_or_else(client_info))).await,
        other => client.call(other, params).await,
    };

    if let Some(error) = &response.error {
        match &error.data {
            Some(data) => bail!("MCP error {}: {} ({})", error.code, error.message, data),
            None => bail!("MCP error {}: {}", error.code, error.message),
        }
    }
    let result = response.result.unwrap_or(Value::Null);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// `<method> [json]` when the first word names a method, `None` otherwise.
fn split_mcp_request(request: &[String]) -> Result<Option<McpCall>> {
    let Some((first, rest)) = request.split_first() else {
        bail!("missing MCP method or request");
    };
    let Ok(method) = first.parse::<McpMethod>() else {
        return Ok(None);
    };
    let params = (!rest.is_empty()).then(|| rest.join(" "));
    Ok(Some(McpCall {
        method,
        params: parse_params(params.as_deref())?,
    }))
}

async fn translate_mcp_request(config: &Arc<Config>, text: &str) -> Result<McpCall> {
    let translator = McpTranslator::new()
        .with_llm(build_dispatcher(Arc::clone(config)), config.defaults.provider.clone())
        .with_context(context_prompt(&config.mcp.servers));

    match translator.translate(text).await? {
        Some(call) => {
            println!("{} {}", "Translated to:".dimmed(), call.method);
            Ok(call)
        }
        None => {
            let mut tips = suggestions(text);
            if tips.is_empty() {
                tips = suggestions("");
            }
            bail!("could not translate '{text}' into an MCP call (try: {})", tips.join(", "))
        }
    }
}

fn parse_params(params: Option<&str>) -> Result<Option<Value>> {
    params
        .map(|p| serde_json::from_str::<Value>(p).context("MCP params must be valid JSON"))
        .transpose()
}

fn client_info() -> Value {
    json!({"name": "aishell", "version": env!("CARGO_PKG_VERSION")})
}

// ─────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("aishell=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Path shown to the user for the config file in use.
fn config_file(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(aishell_core::config::get_config_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn collate_needs_two_arguments() {
        assert!(Cli::try_parse_from(["aishell", "collate", "claude"]).is_err());
        let cli = Cli::try_parse_from(["aishell", "collate", "claude", "openai", "What is 2+2?"]).unwrap();
        match cli.command {
            Commands::Collate { args, .. } => assert_eq!(args.last().unwrap(), "What is 2+2?"),
            _ => panic!("expected collate"),
        }
    }

    #[test]
    fn llm_joins_prompt_words() {
        let cli = Cli::try_parse_from(["aishell", "llm", "claude", "hello", "there", "-t", "0.2"]).unwrap();
        match cli.command {
            Commands::Llm { provider, prompt, sampling, .. } => {
                assert_eq!(provider, "claude");
                assert_eq!(prompt.join(" "), "hello there");
                assert_eq!(sampling.temperature, Some(0.2));
            }
            _ => panic!("expected llm"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["aishell", "status", "--logs", "--config", "/tmp/c.json"]).unwrap();
        assert!(cli.logs);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
    }

    #[test]
    fn sampling_overrides_defaults() {
        let defaults = Defaults::default();
        let request = SamplingArgs::default().request("hi".into(), &defaults);
        assert_eq!(request.temperature, defaults.temperature);
        assert_eq!(request.max_tokens, defaults.max_tokens);

        let sampling = SamplingArgs {
            temperature: Some(0.0),
            max_tokens: Some(64),
        };
        let request = sampling.request("hi".into(), &defaults);
        assert_eq!(request.temperature, 0.0);
        assert_eq!(request.max_tokens, 64);
    }

    #[test]
    fn mcp_params_must_be_json() {
        assert_eq!(parse_params(None).unwrap(), None);
        assert_eq!(parse_params(Some(r#"{"uri":"file:///x"}"#)).unwrap(), Some(json!({"uri": "file:///x"})));
        assert!(parse_params(Some("{not json")).is_err());
    }

    #[test]
    fn mcp_request_forms() {
        let words = |w: &[&str]| w.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let call = split_mcp_request(&words(&["resources/read", r#"{"uri":"db://x"}"#]))
            .unwrap()
            .unwrap();
        assert_eq!(call.method, McpMethod::ResourcesRead);
        assert_eq!(call.params, Some(json!({"uri": "db://x"})));

        let call = split_mcp_request(&words(&["ping"])).unwrap().unwrap();
        assert_eq!(call.params, None);

        assert!(split_mcp_request(&words(&["tools/call", "{bad"])).is_err());
        assert_eq!(split_mcp_request(&words(&["list", "all", "tools"])).unwrap(), None);

        let cli = Cli::try_parse_from(["aishell", "mcp", "github", "list", "open", "issues"]).unwrap();
        match cli.command {
            Commands::Mcp { server, request } => {
                assert_eq!(server, "github");
                assert_eq!(request.join(" "), "list open issues");
            }
            _ => panic!("expected mcp"),
        }
    }

    #[tokio::test]
    async fn mcp_request_translated_without_llm_call() {
        let config = Arc::new(Config {
            transcript: aishell_core::config::schema::TranscriptConfig {
                enabled: false,
                ..Default::default()
            },
            ..Config::default()
        });
        let call = translate_mcp_request(&config, "show available tools").await.unwrap();
        assert_eq!(call.method, McpMethod::ToolsList);
    }

    #[tokio::test]
    async fn unknown_provider_is_an_error() {
        let handle = ConfigHandle::from_config(Config {
            transcript: aishell_core::config::schema::TranscriptConfig {
                enabled: false,
                ..Default::default()
            },
            ..Config::default()
        });
        let err = run_llm(&handle, "bogus", vec!["hi".into()], false, &SamplingArgs::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("valid providers: claude, openai, gemini, ollama, openrouter"));
    }

    #[tokio::test]
    async fn missing_key_still_exits_cleanly() {
        let handle = ConfigHandle::from_config(Config {
            transcript: aishell_core::config::schema::TranscriptConfig {
                enabled: false,
                ..Default::default()
            },
            ..Config::default()
        });
        for stream in [false, true] {
            run_llm(&handle, "openrouter", vec!["hi".into()], stream, &SamplingArgs::default())
                .await
                .unwrap();
        }
    }
}

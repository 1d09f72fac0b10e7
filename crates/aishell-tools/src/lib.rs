//! aishell tools — everything behind the interactive shell and the
//! auxiliary subcommands.
//!
//! - [`shell`] — input classification, builtins, aliases, history, command execution
//! - [`nl_converter`] — natural-language request → shell command via an LLM or built-in patterns
//! - [`file_search`] — `find`/Spotlight file search with content matching
//! - [`web_search`] — DuckDuckGo HTML and Brave API search
//! - [`mcp`] — JSON-RPC client for MCP servers
//! - [`mcp_translator`] — natural-language request → MCP call
//! - [`mcp_capabilities`] — descriptions of well-known MCP servers for prompts

pub mod file_search;
pub mod mcp;
pub mod mcp_capabilities;
pub mod mcp_translator;
pub mod nl_converter;
pub mod shell;
pub mod web_search;

pub use file_search::{FileHit, FileQuery, FileSearch};
pub use mcp::{McpClient, McpError, McpMethod, McpResponse};
pub use mcp_translator::{McpCall, McpTranslator};
pub use nl_converter::{NlConverter, ShellContext};
pub use shell::{parse_input, CommandOutput, InputError, ShellInput, ShellSession};
pub use web_search::{SearchEngine, SearchHit, WebSearch};

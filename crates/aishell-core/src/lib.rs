//! aishell core — configuration, dispatch data model, and transcript logging.
//!
//! - [`config`] — schema, loader (JSON file + `.env` + environment), reloadable handle
//! - [`types`] — `ProviderKind`, `QueryRequest`, `QueryResult`, `TranscriptEntry`
//! - [`transcript`] — append-only Markdown transcript of every dispatch
//! - [`utils`] — data paths, timestamps, string helpers

pub mod config;
pub mod error;
pub mod transcript;
pub mod types;
pub mod utils;

pub use config::{Config, ConfigHandle};
pub use error::{ConfigError, RegistryError};
pub use transcript::TranscriptLogger;
pub use types::{
    CollationResult, DispatchKind, ProviderConfig, ProviderKind, QueryRequest, QueryResult,
    TranscriptEntry, Usage,
};

//! Configuration system — schema, loading, env var overrides, and reload.
//!
//! # Usage
//! ```no_run
//! use aishell_core::config;
//!
//! let cfg = config::load_config(None);
//! println!("Default provider: {}", cfg.defaults.provider);
//! ```

pub mod handle;
pub mod loader;
pub mod schema;

// Re-export key types
pub use handle::{ConfigDiff, ConfigHandle};
pub use loader::{get_config_path, load_config, provider_env, save_config};
pub use schema::Config;

//! `aishell init` — write a default config file and the data directory.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use aishell_core::config::save_config;
use aishell_core::utils::get_data_path;
use aishell_core::Config;

use crate::helpers::tilde_path;

/// Run the init command.
pub fn run(config_path: Option<&Path>, force: bool) -> Result<()> {
    println!();
    println!("{}", "aishell setup".green().bold());
    println!();

    let data_dir = get_data_path();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    println!("  {} data dir at {}", "✓".green(), tilde_path(&data_dir));

    let config_path = crate::config_file(config_path);
    if write_default_config(&config_path, force)? {
        println!("  {} created config at {}", "✓".green(), tilde_path(&config_path));
    } else {
        println!(
            "  {} config already exists at {} (use --force to overwrite)",
            "✓".green(),
            tilde_path(&config_path)
        );
    }

    println!();
    println!(
        "{}",
        "  Setup complete! Put API keys in .env or the config file, then try `aishell llm ollama hello`.".green()
    );
    println!();
    Ok(())
}

/// Write `Config::default()` to `path` unless a file exists and `force` is off.
/// Returns whether the file was written.
fn write_default_config(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    save_config(&Config::default(), Some(path))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

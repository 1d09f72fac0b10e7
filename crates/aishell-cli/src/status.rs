//! `aishell status` — show configuration and provider status.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use aishell_core::utils::expand_home;
use aishell_core::ConfigHandle;
use aishell_providers::PROVIDERS;
use aishell_tools::mcp_capabilities::capability_summary;

use crate::helpers::tilde_path;

/// Run the status command.
pub fn run(handle: &ConfigHandle, config_path: Option<&Path>) -> Result<()> {
    let config = handle.snapshot();
    let config_path = crate::config_file(config_path);

    println!();
    println!("{}", "aishell status".green().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        tilde_path(&config_path),
        found_marker(config_path.exists())
    );
    let env_path = handle.env_path();
    println!(
        "  {:<18} {} {}",
        ".env:".bold(),
        env_path.display(),
        found_marker(env_path.exists())
    );

    println!(
        "  {:<18} {}",
        "Default provider:".bold(),
        config.defaults.provider
    );
    println!(
        "  {:<18} {} | {}",
        "Parameters:".bold(),
        format!("temp: {}", config.defaults.temperature).dimmed(),
        format!("max_tokens: {}", config.defaults.max_tokens).dimmed(),
    );

    // Providers
    println!();
    println!("  {}", "Providers:".bold());
    for spec in PROVIDERS {
        let settings = config.providers.get(spec.kind);
        let model = if settings.model.is_empty() {
            spec.default_model()
        } else {
            settings.model.as_str()
        };
        let status = if !spec.requires_api_key() {
            format!("{} (no key needed)", "✓".green())
        } else if settings.is_configured() {
            format!("{} (key set)", "✓".green())
        } else {
            format!("{} (set {})", "· not configured".dimmed(), spec.env_key)
        };
        println!(
            "    {:<12} {:<36} {}",
            spec.display_name,
            model.dimmed(),
            status
        );
    }

    // Transcript
    println!();
    if config.transcript.enabled {
        let path = expand_home(&config.transcript.path);
        println!(
            "  {:<18} {} {}",
            "Transcript:".bold(),
            tilde_path(&path),
            found_marker(path.exists())
        );
    } else {
        println!("  {:<18} {}", "Transcript:".bold(), "disabled".dimmed());
    }

    // Search / MCP
    let brave = if config.search.brave_api_key.is_empty() {
        "".to_string()
    } else {
        format!(" {}", "(brave key set)".dimmed())
    };
    println!("  {:<18} {}{}", "Web search:".bold(), config.search.engine, brave);
    if config.mcp.servers.is_empty() {
        println!("  {:<18} {}", "MCP servers:".bold(), "none".dimmed());
    } else {
        println!("  {}", "MCP servers:".bold());
        let summary = capability_summary(&config.mcp.servers);
        for (name, url) in &config.mcp.servers {
            println!("    {:<12} {}", name, url.dimmed());
            if let Some(capabilities) = summary.get(name) {
                for capability in capabilities.iter() {
                    println!("    {:<12} {}", "", format!("· {capability}").dimmed());
                }
            }
        }
    }

    println!();
    Ok(())
}

fn found_marker(exists: bool) -> String {
    if exists {
        "✓".green().to_string()
    } else {
        "(not found)".red().to_string()
    }
}

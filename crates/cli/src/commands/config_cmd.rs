//! `querylens config`: configuration management commands.

use anyhow::Context;
use querylens_config::AppConfig;
use std::path::{Path, PathBuf};

fn config_path() -> PathBuf {
    AppConfig::config_dir().join("config.toml")
}

pub fn init() -> anyhow::Result<()> {
    let path = config_path();
    if write_default(&path)? {
        println!("Created {}", path.display());
    } else {
        println!("Config already exists at {}", path.display());
    }
    Ok(())
}

/// Write the default configuration unless a file is already there.
fn write_default(path: &Path) -> anyhow::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    std::fs::write(path, AppConfig::default_toml())
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

pub fn show() -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("failed to load config")?;
    if config.model.api_key.is_some() {
        config.model.api_key = Some("[REDACTED]".into());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn path() {
    println!("{}", config_path().display());
}

pub fn validate() -> anyhow::Result<()> {
    println!("Validating configuration...");

    let config = AppConfig::load().context("config error")?;
    println!("  Config parsed successfully");

    let knowledge = config.knowledge().context("knowledge base error")?;
    // Compiling the analyzer checks every knowledge pattern.
    super::Pipeline::from_config(config.clone(), None)?;
    println!("  Knowledge base compiled ({} domains)", knowledge.domains.len());

    let mut warnings = Vec::new();
    if config.model.api_key.is_none() && config.model.provider != "disabled" {
        warnings.push("No API key set (QUERYLENS_API_KEY or OPENAI_API_KEY); analysis runs on heuristics only");
    }
    if config.budget.default_reserved_tokens >= config.budget.default_max_tokens {
        warnings.push("budget.default_reserved_tokens leaves no room for context; the minimal budget will be used");
    }
    for w in &warnings {
        println!("  warning: {w}");
    }

    println!();
    println!("  Provider:  {}", config.model.provider);
    println!("  Model:     {}", config.model.model);
    println!("  Timeout:   {} ms", config.model.timeout_ms);
    println!(
        "  Budget:    {} max, {} reserved",
        config.budget.default_max_tokens, config.budget.default_reserved_tokens
    );
    println!("  Users:     {}", config.users.len());
    Ok(())
}

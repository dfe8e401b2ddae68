//! Configuration loading and resolution
//!
//! Settings are resolved through a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file (`~/.config/wdr/wdr.toml`)
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// On-disk TOML configuration shared by WDR binaries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Chat-completion endpoint URL
    pub endpoint: Option<String>,
    /// API key for the backend service
    pub api_key: Option<String>,
    /// Generator model identifiers, cycled across attempts
    pub generator_ids: Option<Vec<String>>,
    /// Arbiter model identifier
    pub arbiter_id: Option<String>,
    /// Number of generation attempts per work
    pub attempt_count: Option<usize>,
    /// Consensus confidence threshold (percent)
    pub confidence_threshold: Option<f64>,
    /// Per-call timeout in seconds
    pub call_timeout_secs: Option<u64>,
}

/// Resolve a single string setting through the priority chain.
///
/// Sources are checked in order: CLI argument, environment variable, the
/// provided TOML value. A warning is logged when more than one source is set
/// (potential misconfiguration); the highest-priority source wins.
pub fn resolve_setting(
    name: &str,
    cli_arg: Option<&str>,
    env_var_name: &str,
    toml_value: Option<&str>,
) -> Option<String> {
    let env_value = std::env::var(env_var_name).ok();

    let mut sources = Vec::new();
    if cli_arg.is_some() {
        sources.push("command line");
    }
    if env_value.as_deref().map(is_non_blank).unwrap_or(false) {
        sources.push("environment");
    }
    if toml_value.map(is_non_blank).unwrap_or(false) {
        sources.push("TOML");
    }
    if sources.len() > 1 {
        warn!(
            "{} found in multiple sources: {}. Using {} (highest priority).",
            name,
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(value) = cli_arg {
        return Some(value.to_string());
    }
    if let Some(value) = env_value {
        if is_non_blank(&value) {
            return Some(value);
        }
    }
    if let Some(value) = toml_value {
        if is_non_blank(value) {
            return Some(value.to_string());
        }
    }
    None
}

/// Validate a setting value (non-empty, non-whitespace)
pub fn is_non_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Get the platform config file path (`<config dir>/wdr/wdr.toml`)
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("wdr").join("wdr.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Load the TOML configuration from an explicit path, or the platform
/// default when `path` is `None`. A missing file yields the empty config.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read config failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse config failed ({}): {}", path.display(), e)))
}

/// Write the TOML configuration, creating parent directories as needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

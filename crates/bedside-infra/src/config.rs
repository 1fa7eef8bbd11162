//! Configuration file loading.
//!
//! Resolves where `config.toml` lives and parses it into [`BedsideConfig`].
//! A missing file is not an error: every field has a default.

use std::path::{Path, PathBuf};

use bedside_types::config::BedsideConfig;

/// Environment variable that overrides the default config location.
pub const CONFIG_ENV: &str = "BEDSIDE_CONFIG";

/// Resolve the config path: explicit flag, then `$BEDSIDE_CONFIG`, then
/// `~/.bedside/config.toml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match std::env::var(CONFIG_ENV) {
        Ok(path) if !path.trim().is_empty() => return PathBuf::from(path),
        _ => {}
    }
    default_config_dir().join("config.toml")
}

/// `~/.bedside`, or `./.bedside` when no home directory can be determined.
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bedside")
}

/// Load configuration from `path`.
///
/// Returns defaults if the file doesn't exist or can't be parsed. Parse and
/// read failures are logged so a typo doesn't silently change behavior.
pub async fn load_config(path: &Path) -> BedsideConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return BedsideConfig::default();
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read config, using defaults");
            return BedsideConfig::default();
        }
    };

    match parse_config(&content) {
        Ok(config) => {
            tracing::debug!(
                path = %path.display(),
                scenarios = config.scenarios.len(),
                "loaded config"
            );
            config
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse config, using defaults");
            BedsideConfig::default()
        }
    }
}

pub fn parse_config(content: &str) -> Result<BedsideConfig, toml::de::Error> {
    toml::from_str(content)
}

/// Render the effective configuration back to TOML.
pub fn render_config(config: &BedsideConfig) -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(config)
}

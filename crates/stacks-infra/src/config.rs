//! Configuration loader for Stacks.
//!
//! Reads `config.toml` from the data directory (`~/.stacks/` in production)
//! and deserializes it into [`StacksConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use stacks_types::config::StacksConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "STACKS_DATA_DIR";

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: returns [`StacksConfig::default()`].
/// - Unreadable or unparsable file: logs a warning and returns the default.
pub async fn load_config(data_dir: &Path) -> StacksConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return StacksConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return StacksConfig::default();
        }
    };

    match toml::from_str::<StacksConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            StacksConfig::default()
        }
    }
}

/// Resolve the data directory.
///
/// Priority:
/// 1. `STACKS_DATA_DIR` environment variable
/// 2. `~/.stacks`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".stacks");
    }

    PathBuf::from(".stacks")
}

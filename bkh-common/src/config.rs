//! Configuration file resolution and loading
//!
//! Config file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config directory (`~/.config/bkh/<file>`)
//! 4. System config directory (`/etc/bkh/<file>`)
//!
//! A missing config file is not fatal: callers fall back to compiled defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolve the config file path
///
/// Returns `None` when no candidate exists; an explicit CLI or ENV path is
/// returned even if the file is missing so the caller can report it.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config directory
    if let Some(user_config) = dirs::config_dir().map(|d| d.join("bkh").join(file_name)) {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    // Priority 4: System config directory
    let system_config = PathBuf::from("/etc/bkh").join(file_name);
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Load and deserialize a TOML config file
pub fn load_toml_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load config from the resolved path, or defaults when no file is found
///
/// An explicitly named file that does not exist is an error; an absent
/// default-location file only produces a warning.
pub fn load_or_default<T: DeserializeOwned + Default>(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Result<T> {
    match resolve_config_path(cli_arg, env_var_name, file_name) {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            load_toml_config(&path)
        }
        None => {
            warn!(
                "No configuration file found ({} / ~/.config/bkh/{} / /etc/bkh/{}), using defaults",
                env_var_name, file_name, file_name
            );
            Ok(T::default())
        }
    }
}

//! TOML configuration file loading
//!
//! Supports `~/.config/wotgate/config.toml` (or the path in `WOTGATE_CONFIG`)
//! as a persistent config source. All fields are optional; the file is a
//! partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::thing::ThingConfiguration;

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "WOTGATE_CONFIG";

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct WotgateConfigFile {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Routed call settings
    #[serde(default)]
    pub dispatch: DispatchFileConfig,

    /// Built-in authorization thing
    #[serde(default)]
    pub gatekeeper: GatekeeperFileConfig,

    /// Things inserted at startup, in order
    #[serde(default)]
    pub things: Vec<ThingConfiguration>,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// Global request budget per minute
    pub rate_limit_per_minute: Option<u32>,
}

/// Dispatch configuration
#[derive(Debug, Default, Deserialize)]
pub struct DispatchFileConfig {
    /// Bounded wait per routed call, in milliseconds
    pub timeout_ms: Option<u64>,
}

/// Gatekeeper configuration
#[derive(Debug, Default, Deserialize)]
pub struct GatekeeperFileConfig {
    /// Database file, or `:memory:`
    pub database: Option<String>,

    /// Lifetime of issued tokens
    pub token_ttl_secs: Option<i64>,

    /// Password for the bootstrap administrator account
    pub admin_password: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `WotgateConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> WotgateConfigFile {
    config_file_path().map_or_else(WotgateConfigFile::default, |path| load_from(&path))
}

/// Load a config file from an explicit path
///
/// Returns `WotgateConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_from(path: &Path) -> WotgateConfigFile {
    if !path.exists() {
        return WotgateConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                WotgateConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            WotgateConfigFile::default()
        }
    }
}

/// Return the config file path: `WOTGATE_CONFIG` or `~/.config/wotgate/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    directories::BaseDirs::new().map(|d| d.config_dir().join("wotgate").join("config.toml"))
}

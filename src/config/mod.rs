//! Configuration management for the gateway

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::thing::ThingConfiguration;
use crate::{Error, Result};

pub use file::CONFIG_PATH_ENV;
use file::WotgateConfigFile;

/// Default API server port
pub const DEFAULT_PORT: u16 = 8080;

/// Default bounded wait per routed call
pub const DEFAULT_DISPATCH_TIMEOUT_MS: u64 = 30_000;

/// Default token lifetime
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

/// Database name selecting an in-memory store
pub const MEMORY_DATABASE: &str = ":memory:";

/// Gateway configuration
#[derive(Debug)]
pub struct Config {
    /// Path to data directory (databases)
    pub data_dir: PathBuf,

    /// HTTP API server configuration
    pub server: ServerConfig,

    /// Routed call timeout
    pub dispatch_timeout: Duration,

    /// Built-in authorization thing
    pub gatekeeper: GatekeeperConfig,

    /// Things inserted after the gatekeeper, in order
    pub things: Vec<ThingConfiguration>,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Global request budget per minute, unlimited when unset
    pub rate_limit_per_minute: Option<u32>,
}

/// Where a thing keeps its database
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    Memory,
    File(PathBuf),
}

impl DatabaseLocation {
    /// Parse `:memory:` or a file path
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value == MEMORY_DATABASE {
            Self::Memory
        } else {
            Self::File(PathBuf::from(value))
        }
    }
}

/// Gatekeeper configuration
#[derive(Debug)]
pub struct GatekeeperConfig {
    /// User, role and reservation store
    pub database: DatabaseLocation,

    /// Lifetime of issued tokens
    pub token_ttl_secs: i64,

    /// Password for the bootstrap administrator; no administrator is
    /// created when unset
    pub admin_password: Option<SecretString>,
}

impl GatekeeperConfig {
    /// In-memory gatekeeper with the given administrator password
    #[must_use]
    pub fn in_memory(admin_password: &str) -> Self {
        Self {
            database: DatabaseLocation::Memory,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            admin_password: Some(SecretString::from(admin_password.to_string())),
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a setting is out of range
    pub fn load() -> Result<Self> {
        Self::resolve(file::load_config_file(), data_dir(), |key| {
            std::env::var(key).ok()
        })
    }

    /// Load configuration from an explicit file (env > file > default)
    ///
    /// # Errors
    ///
    /// Returns error if a setting is out of range
    pub fn load_file(path: &Path) -> Result<Self> {
        Self::resolve(file::load_from(path), data_dir(), |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with environment lookups
    ///
    /// # Errors
    ///
    /// Returns `Config` if a setting is out of range
    pub fn resolve<F>(fc: WotgateConfigFile, data_dir: PathBuf, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server = ServerConfig {
            port: env("WOTGATE_PORT")
                .or_else(|| env("PORT"))
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
            rate_limit_per_minute: env("WOTGATE_RATE_LIMIT_PER_MINUTE")
                .and_then(|s| s.parse().ok())
                .or(fc.server.rate_limit_per_minute),
        };
        if server.rate_limit_per_minute == Some(0) {
            return Err(Error::Config(
                "server.rate_limit_per_minute must be positive".to_string(),
            ));
        }

        let timeout_ms = env("WOTGATE_DISPATCH_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .or(fc.dispatch.timeout_ms)
            .unwrap_or(DEFAULT_DISPATCH_TIMEOUT_MS);
        if timeout_ms == 0 {
            return Err(Error::Config("dispatch.timeout_ms must be positive".to_string()));
        }

        let database = env("WOTGATE_GATEKEEPER_DATABASE")
            .or(fc.gatekeeper.database)
            .map_or_else(
                || DatabaseLocation::File(data_dir.join("gatekeeper.db")),
                |db| DatabaseLocation::parse(&db),
            );

        let token_ttl_secs = env("WOTGATE_TOKEN_TTL_SECS")
            .and_then(|s| s.parse().ok())
            .or(fc.gatekeeper.token_ttl_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        if token_ttl_secs <= 0 {
            return Err(Error::Config(
                "gatekeeper.token_ttl_secs must be positive".to_string(),
            ));
        }

        let admin_password = env("WOTGATE_ADMIN_PASSWORD")
            .or(fc.gatekeeper.admin_password)
            .filter(|p| !p.is_empty())
            .map(SecretString::from);

        Ok(Self {
            data_dir,
            server,
            dispatch_timeout: Duration::from_millis(timeout_ms),
            gatekeeper: GatekeeperConfig {
                database,
                token_ttl_secs,
                admin_password,
            },
            things: fc.things,
        })
    }
}

/// Data directory (~/.local/share/wotgate on Linux)
fn data_dir() -> PathBuf {
    std::env::var("WOTGATE_DATA_DIR").map_or_else(
        |_| {
            directories::ProjectDirs::from("", "", "wotgate")
                .map_or_else(|| PathBuf::from("."), |d| d.data_dir().to_path_buf())
        },
        PathBuf::from,
    )
}

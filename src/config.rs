use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Where the log database lives and how large it may grow
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Only "sqlite" is supported
    pub driver: String,
    /// Database file, or ":memory:"
    pub path: String,
    /// Server address and credentials, reserved for server-backed drivers.
    /// SQLite ignores them.
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// -1 disables trimming
    pub max_entries: i64,
    /// Rows removed per trim, defaults to 1% of `max_entries`
    pub trim_size: Option<u64>,
    pub max_queue_length: usize,
    pub flood_limit: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "text" or "json"
    pub format: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            path: "./data/logs.sqlite".to_string(),
            host: "127.0.0.1".to_string(),
            username: None,
            password: None,
            max_entries: 50_000,
            trim_size: None,
            max_queue_length: crate::logging::DEFAULT_MAX_QUEUE_LENGTH,
            flood_limit: crate::logging::DEFAULT_FLOOD_LIMIT,
        }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self {
            path: ":memory:".to_string(),
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:" || self.path == "sqlite::memory:"
    }

    /// Entry limit, `None` when unlimited
    pub fn max_entries_limit(&self) -> Option<u64> {
        u64::try_from(self.max_entries).ok()
    }

    /// Whether credentials were configured for a driver that has no use for them
    pub fn has_unused_credentials(&self) -> bool {
        self.driver.eq_ignore_ascii_case("sqlite")
            && (self.username.is_some() || self.password.is_some())
    }

    pub fn effective_trim_size(&self) -> u64 {
        match (self.trim_size, self.max_entries_limit()) {
            (Some(size), _) => size,
            (None, Some(max)) => max / 100,
            (None, None) => 0,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Load configuration from `path` (optional) layered with `LOG_ENGINE__*` environment variables
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix("LOG_ENGINE")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    let db = &cfg.database;

    if !db.driver.eq_ignore_ascii_case("sqlite") {
        anyhow::bail!("Unsupported database driver '{}', only sqlite is available", db.driver);
    }

    if db.has_unused_credentials() {
        tracing::warn!("Database username and password are ignored by the sqlite driver");
    }

    if db.path.is_empty() {
        anyhow::bail!("Database path cannot be empty");
    }

    if db.max_entries < -1 || db.max_entries == 0 {
        anyhow::bail!("max_entries must be positive or -1 for unlimited, got {}", db.max_entries);
    }

    if let Some(max) = db.max_entries_limit() {
        if db.effective_trim_size() >= max {
            anyhow::bail!(
                "trim_size ({}) must be smaller than max_entries ({})",
                db.effective_trim_size(),
                max
            );
        }
    }

    if db.max_queue_length == 0 {
        anyhow::bail!("max_queue_length must be greater than 0");
    }

    if db.flood_limit == 0 {
        anyhow::bail!("flood_limit must be greater than 0");
    }

    if !matches!(cfg.logging.format.as_str(), "text" | "json") {
        anyhow::bail!("Unknown log format '{}', expected text or json", cfg.logging.format);
    }

    Ok(())
}

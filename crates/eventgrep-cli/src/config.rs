use anyhow::{Context, Result};
use eventgrep_core::QueryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file; `~` is expanded
    #[serde(default = "default_database_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Let sqlx statement logs through the filter
    #[serde(default = "default_false")]
    pub log_sql_queries: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_sql_queries: false,
        }
    }
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents).context("Failed to parse TOML config")?
        } else {
            // Default to YAML
            serde_yaml::from_str(&contents).context("Failed to parse YAML config")?
        };

        Ok(config)
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("EVENTGREP_DATABASE_PATH") {
            self.database.path = val;
        }

        // Logging settings
        if let Ok(val) = std::env::var("EVENTGREP_LOG_LEVEL") {
            self.logging.level = val;
        }

        if let Ok(val) = std::env::var("EVENTGREP_LOG_SQL_QUERIES")
            && let Ok(enabled) = val.parse::<bool>()
        {
            self.logging.log_sql_queries = enabled;
        }

        // Query settings
        if let Ok(val) = std::env::var("EVENTGREP_DEFAULT_QUERY_DELTA")
            && let Ok(delta) = val.parse::<i64>()
        {
            self.query.default_query_delta = Some(delta);
        }

        if let Ok(val) = std::env::var("EVENTGREP_DEFAULT_ROWS_PER_PAGE")
            && let Ok(rows) = val.parse::<u32>()
        {
            self.query.default_rows_per_page = rows;
        }

        if let Ok(val) = std::env::var("EVENTGREP_MAX_ROWS_PER_PAGE")
            && let Ok(rows) = val.parse::<u32>()
        {
            self.query.max_rows_per_page = rows;
        }

        if let Ok(val) = std::env::var("EVENTGREP_STORAGE_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            self.query.storage_timeout_secs = (secs > 0).then_some(secs);
        }
    }

    /// Database path with `~` expanded.
    pub fn database_path(&self) -> String {
        shellexpand::tilde(&self.database.path).to_string()
    }
}

fn default_database_path() -> String {
    eventgrep_store_sqlite::default_database_path()
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_false() -> bool {
    false
}

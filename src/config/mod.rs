//! Application configuration
//!
//! Configuration is assembled once at startup from three layers: a TOML file
//! (auto-created with defaults when absent), environment variable overrides,
//! and CLI flags applied by the binary. The result is validated in a single
//! pass that collects every missing or invalid field into one
//! [`ConfigError::Invalid`] so a broken deployment is reported completely
//! rather than one variable at a time.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::errors::ConfigError;

/// Supported database engines
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Admin token for settings mutation; required outside debug mode
    pub secret_key: Option<String>,
    /// Debug mode relaxes host/origin/token checks for local development
    pub debug: bool,
    /// Host header allow-list, enforced outside debug mode when non-empty
    pub allowed_hosts: Vec<String>,
    /// Origins allowed by the CORS layer outside debug mode
    pub trusted_origins: Vec<String>,
    /// IANA timezone name used for human-facing timestamp rendering
    pub timezone: String,
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub cleanup: CleanupConfig,
    pub site: SiteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub engine: DatabaseEngine,
    /// PostgreSQL database name (`SQL_DATABASE`)
    pub name: Option<String>,
    /// PostgreSQL host (`SQL_HOST`)
    pub host: Option<String>,
    /// PostgreSQL user (`SQL_USER`)
    pub user: Option<String>,
    /// PostgreSQL password (`SQL_PASSWORD`)
    pub password: Option<String>,
    /// PostgreSQL port (`SQL_PORT`)
    pub port: u16,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for everything the service writes: uploaded file bytes
    /// under `media/`, the SQLite database under `db/`
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error, off
    pub level: String,
    /// Optional log file; stdout logging is always on
    pub location: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// 5-field cron expression driving the expired-file sweep
    pub schedule: String,
    /// Upper bound on a single sweep, e.g. "10m"
    pub sweep_timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Default for the `domain` site setting; prepended to download URLs
    pub full_domain: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            secret_key: None,
            debug: false,
            allowed_hosts: Vec::new(),
            trusted_origins: Vec::new(),
            timezone: "UTC".to_string(),
            database: DatabaseConfig::default(),
            web: WebConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            cleanup: CleanupConfig::default(),
            site: SiteConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: DatabaseEngine::Sqlite,
            name: None,
            host: None,
            user: None,
            password: None,
            port: 5432,
            max_connections: Some(10),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1337,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            location: None,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            schedule: "*/15 * * * *".to_string(),
            sweep_timeout: "10m".to_string(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            full_domain: "localhost:1337".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Build the connection descriptor for the selected engine.
    ///
    /// SQLite needs no credentials; its database file lives under the data
    /// directory. PostgreSQL requires name, host, user, and password; every
    /// missing one is reported, before any connection is attempted.
    pub fn connection_url(&self, data_dir: &Path) -> Result<String, ConfigError> {
        match self.engine {
            DatabaseEngine::Sqlite => {
                let path = data_dir.join("db").join("db.sqlite3");
                Ok(format!("sqlite://{}", path.display()))
            }
            DatabaseEngine::Postgres => {
                let mut issues = Vec::new();
                for (var, value) in [
                    ("SQL_DATABASE", &self.name),
                    ("SQL_HOST", &self.host),
                    ("SQL_USER", &self.user),
                    ("SQL_PASSWORD", &self.password),
                ] {
                    if value.as_deref().is_none_or(str::is_empty) {
                        issues.push(format!("{var} is required when DATABASE is postgres"));
                    }
                }
                if !issues.is_empty() {
                    return Err(ConfigError::Invalid { issues });
                }
                // Checked non-empty above
                let name = self.name.as_deref().unwrap_or_default();
                let host = self.host.as_deref().unwrap_or_default();
                let user = self.user.as_deref().unwrap_or_default();
                let password = self.password.as_deref().unwrap_or_default();
                Ok(format!(
                    "postgres://{user}:{password}@{host}:{}/{name}",
                    self.port
                ))
            }
        }
    }
}

impl StorageConfig {
    pub fn media_root(&self) -> PathBuf {
        self.data_dir.join("media")
    }
}

impl CleanupConfig {
    /// Parse the cleanup schedule, accepting the standard 5-field cron form.
    ///
    /// The `cron` crate wants a leading seconds field; a 5-field expression
    /// is normalized to fire at second zero of its matching minutes.
    pub fn parsed_schedule(&self) -> Result<cron::Schedule, cron::error::Error> {
        let expr = self.schedule.trim();
        let normalized = if expr.split_whitespace().count() == 5 {
            format!("0 {expr}")
        } else {
            expr.to_string()
        };
        cron::Schedule::from_str(&normalized)
    }

    pub fn sweep_timeout_duration(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.sweep_timeout)
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    pub fn load_from_file(config_file: &str) -> Result<Self, ConfigError> {
        let mut config = if std::path::Path::new(config_file).exists() {
            let contents = std::fs::read_to_string(config_file).map_err(|e| ConfigError::Io {
                path: config_file.to_string(),
                source: e,
            })?;
            toml::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: config_file.to_string(),
                source: e,
            })?
        } else {
            let default_config = Self::default();
            if let Ok(contents) = toml::to_string_pretty(&default_config) {
                if std::fs::write(config_file, contents).is_ok() {
                    info!("Created default config file: {}", config_file);
                }
            }
            default_config
        };

        let mut issues = Vec::new();
        config.apply_env_from(|name| std::env::var(name).ok(), &mut issues);
        config.collect_issues(&mut issues);
        if !issues.is_empty() {
            return Err(ConfigError::Invalid { issues });
        }
        Ok(config)
    }

    /// Overlay environment variables onto the file/default configuration.
    ///
    /// The lookup is injected so tests can drive the overlay from a plain map
    /// instead of mutating process-wide environment state.
    fn apply_env_from<F>(&mut self, lookup: F, issues: &mut Vec<String>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("SECRET_KEY") {
            self.secret_key = Some(v);
        }
        if let Some(v) = var("DEBUG") {
            match v.trim().parse::<i64>() {
                Ok(n) => self.debug = n != 0,
                Err(_) => issues.push(format!("DEBUG must be an integer (0 or 1), got '{v}'")),
            }
        }
        if let Some(v) = var("SHIFTER_ALLOWED_HOSTS") {
            self.allowed_hosts = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = var("CSRF_TRUSTED_ORIGINS") {
            self.trusted_origins = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = var("DATABASE") {
            match DatabaseEngine::from_str(v.trim()) {
                Ok(engine) => self.database.engine = engine,
                Err(_) => issues.push(format!(
                    "DATABASE must be either sqlite or postgres, got '{v}'"
                )),
            }
        }
        if let Some(v) = var("SQL_DATABASE") {
            self.database.name = Some(v);
        }
        if let Some(v) = var("SQL_HOST") {
            self.database.host = Some(v);
        }
        if let Some(v) = var("SQL_USER") {
            self.database.user = Some(v);
        }
        if let Some(v) = var("SQL_PASSWORD") {
            self.database.password = Some(v);
        }
        if let Some(v) = var("SQL_PORT") {
            match v.trim().parse::<u16>() {
                Ok(port) => self.database.port = port,
                Err(_) => issues.push(format!("SQL_PORT must be a port number, got '{v}'")),
            }
        }
        if let Some(v) = var("SHIFTER_LOG_LEVEL") {
            self.logging.level = v.to_lowercase();
        }
        if let Some(v) = var("SHIFTER_LOG_LOCATION") {
            self.logging.location = Some(PathBuf::from(v));
        }
        if let Some(v) = var("TIMEZONE") {
            self.timezone = v;
        }
        if let Some(v) = var("SHIFTER_FULL_DOMAIN") {
            self.site.full_domain = v;
        }
        if let Some(v) = var("EXPIRED_FILE_CLEANUP_SCHEDULE") {
            self.cleanup.schedule = v;
        }
    }

    /// Validate the assembled configuration, appending every problem found.
    fn collect_issues(&self, issues: &mut Vec<String>) {
        if self.database.engine == DatabaseEngine::Postgres {
            if let Err(ConfigError::Invalid { issues: mut db }) =
                self.database.connection_url(&self.storage.data_dir)
            {
                issues.append(&mut db);
            }
        }

        if !self.debug && self.secret_key.as_deref().is_none_or(str::is_empty) {
            issues.push("SECRET_KEY must be set when not running in debug mode".to_string());
        }

        if let Err(e) = self.cleanup.parsed_schedule() {
            issues.push(format!(
                "EXPIRED_FILE_CLEANUP_SCHEDULE '{}' is not a valid cron expression: {e}",
                self.cleanup.schedule
            ));
        }

        if let Err(e) = self.cleanup.sweep_timeout_duration() {
            issues.push(format!(
                "cleanup.sweep_timeout '{}' is not a valid duration: {e}",
                self.cleanup.sweep_timeout
            ));
        }

        if self.timezone.parse::<chrono_tz::Tz>().is_err() {
            issues.push(format!(
                "TIMEZONE '{}' is not a valid IANA timezone name",
                self.timezone
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            issues.push(format!(
                "SHIFTER_LOG_LEVEL '{}' is not one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }
    }

    /// Build a config from defaults plus the supplied variable map, running
    /// the full validation pass. Used by tests; `load_from_file` is the same
    /// pipeline with the real process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let mut issues = Vec::new();
        config.apply_env_from(lookup, &mut issues);
        config.collect_issues(&mut issues);
        if !issues.is_empty() {
            return Err(ConfigError::Invalid { issues });
        }
        Ok(config)
    }
}

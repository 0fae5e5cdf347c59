//! SeaORM-based database implementation
//!
//! Database-agnostic access with support for SQLite (auto-created on first
//! run) and PostgreSQL. Engine selection and credential validation happen in
//! the configuration layer, before any connection attempt.

use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, Database as SeaOrmDatabase, DatabaseConnection};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{DatabaseConfig, DatabaseEngine};

pub mod migrations;
pub mod repositories;

/// Database connection manager with multi-database support
#[derive(Clone)]
pub struct Database {
    connection: Arc<DatabaseConnection>,
    engine: DatabaseEngine,
}

impl Database {
    /// Connect using the validated application configuration.
    pub async fn connect(config: &DatabaseConfig, data_dir: &Path) -> Result<Self> {
        let url = config.connection_url(data_dir)?;
        Self::connect_with_url(&url, config.max_connections.unwrap_or(10)).await
    }

    /// Connect to an explicit URL. Also used by tests against
    /// `sqlite::memory:` (which needs a single-connection pool so every
    /// session sees the same database).
    pub async fn connect_with_url(url: &str, max_connections: u32) -> Result<Self> {
        let engine = Self::detect_engine(url)?;

        let connection_url = match engine {
            DatabaseEngine::Sqlite => Self::ensure_sqlite_auto_creation(url)?,
            DatabaseEngine::Postgres => url.to_string(),
        };

        info!("Connecting to {} database", engine);

        let mut connect_options = ConnectOptions::new(&connection_url);
        connect_options
            .max_connections(max_connections)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(5)) // Fast fail for offline database
            .acquire_timeout(Duration::from_secs(3)) // Fast fail for pool exhaustion
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .sqlx_logging(false);

        let connection = SeaOrmDatabase::connect(connect_options)
            .await
            .with_context(|| format!("Failed to connect to database at '{url}'"))?;

        debug!("Database connection established");

        Ok(Self {
            connection: Arc::new(connection),
            engine,
        })
    }

    fn detect_engine(url: &str) -> Result<DatabaseEngine> {
        if url.starts_with("sqlite:") {
            Ok(DatabaseEngine::Sqlite)
        } else if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            Ok(DatabaseEngine::Postgres)
        } else {
            anyhow::bail!("Unsupported database URL format: {url}");
        }
    }

    /// Ensure SQLite URL includes auto-creation mode if needed
    fn ensure_sqlite_auto_creation(url: &str) -> Result<String> {
        if url.contains("mode=") || url.contains(":memory:") {
            return Ok(url.to_string());
        }

        let file_path = if let Some(path) = url.strip_prefix("sqlite://") {
            path
        } else if let Some(path) = url.strip_prefix("sqlite:") {
            path
        } else {
            anyhow::bail!("Invalid SQLite URL format: {url}");
        };

        let path = std::path::Path::new(file_path);
        if path.exists() {
            return Ok(url.to_string());
        }

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create directory for SQLite database: {}",
                        parent.display()
                    )
                })?;
                info!("Created directory for SQLite database: {}", parent.display());
            }
        }

        // mode=rwc lets SQLite create the database file on first open
        let auto_create_url = if url.contains('?') {
            format!("{url}&mode=rwc")
        } else {
            format!("{url}?mode=rwc")
        };
        Ok(auto_create_url)
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        use migrations::Migrator;
        use sea_orm_migration::MigratorTrait;

        info!("Running database migrations for {}", self.engine);
        Migrator::up(&*self.connection, None)
            .await
            .context("Failed to run migrations")?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn connection(&self) -> Arc<DatabaseConnection> {
        self.connection.clone()
    }

    pub fn engine(&self) -> DatabaseEngine {
        self.engine
    }
}

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shifter::{
    cleanup::{CleanupScheduler, SweepRunner},
    config::Config,
    database::Database,
    services::{FileService, FileStorage},
    site_settings::SettingsRegistry,
    web::{AppState, WebServer},
};

#[derive(Parser)]
#[command(name = "shifter")]
#[command(version)]
#[command(about = "A self-hosted file sharing service with expiry-based cleanup")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level (overrides SHIFTER_LOG_LEVEL)
    #[arg(short = 'v', long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_from_file(&cli.config)?;

    // Override config with CLI arguments
    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_logging(&config)?;
    info!("Starting shifter v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", cli.config);

    let database = Database::connect(&config.database, &config.storage.data_dir).await?;
    database.migrate().await?;
    info!("Database connection established and migrations applied");

    let settings = SettingsRegistry::new(&config, &database);

    let storage = FileStorage::new(config.storage.media_root());
    storage.ensure_layout().await?;
    let file_service = FileService::new(&database, storage, settings.clone());

    let sweep_timeout = config
        .cleanup
        .sweep_timeout_duration()
        .context("Invalid cleanup.sweep_timeout")?;
    let sweep_runner = SweepRunner::new(file_service.clone(), sweep_timeout);
    let schedule = config
        .cleanup
        .parsed_schedule()
        .context("Invalid cleanup schedule")?;

    let shutdown = CancellationToken::new();

    let scheduler = CleanupScheduler::new(sweep_runner.clone(), schedule);
    let scheduler_shutdown = shutdown.clone();
    tokio::spawn(async move {
        scheduler.run(scheduler_shutdown).await;
    });

    let state = AppState::new(
        Arc::new(config),
        settings,
        file_service,
        sweep_runner,
    );
    let server = WebServer::new(state)?;
    info!("Starting web server on {}", server.addr());

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_shutdown.cancel();
        }
    });

    server.serve(shutdown).await?;
    Ok(())
}

fn init_logging(config: &Config) -> Result<()> {
    let level = config.logging.level.to_lowercase();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("shifter={level}").into());

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match &config.logging.location {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
                .init();
        }
        None => registry.init(),
    }
    Ok(())
}

//! Expired-file cleanup
//!
//! A cron-driven scheduler that sweeps file records past their expiry. The
//! sweep itself lives in [`FileService::sweep_expired`]; this module owns the
//! cadence, the advisory lock that keeps sweeps from overlapping (the same
//! sweep can also be triggered manually through the API), and the timeout
//! bounding a single run.

use chrono::Utc;
use cron::Schedule;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::errors::AppError;
use crate::models::SweepOutcome;
use crate::services::FileService;

/// Result of asking for a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepRun {
    Completed(SweepOutcome),
    /// Another sweep holds the advisory lock
    AlreadyRunning,
    /// The sweep exceeded its timeout and was aborted; remaining records are
    /// picked up on the next cadence
    TimedOut,
}

/// Shared sweep entry point for the scheduler and the manual API trigger
#[derive(Clone)]
pub struct SweepRunner {
    file_service: FileService,
    sweep_timeout: Duration,
    lock: Arc<Mutex<()>>,
}

impl SweepRunner {
    pub fn new(file_service: FileService, sweep_timeout: Duration) -> Self {
        Self {
            file_service,
            sweep_timeout,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Run one sweep unless one is already in progress.
    pub async fn run_sweep(&self) -> Result<SweepRun, AppError> {
        let Ok(_guard) = self.lock.try_lock() else {
            return Ok(SweepRun::AlreadyRunning);
        };

        match tokio::time::timeout(
            self.sweep_timeout,
            self.file_service.sweep_expired(Utc::now()),
        )
        .await
        {
            Ok(Ok(outcome)) => Ok(SweepRun::Completed(outcome)),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(SweepRun::TimedOut),
        }
    }
}

/// Background service firing the sweep on its cron cadence
pub struct CleanupScheduler {
    runner: SweepRunner,
    schedule: Schedule,
}

impl CleanupScheduler {
    pub fn new(runner: SweepRunner, schedule: Schedule) -> Self {
        Self { runner, schedule }
    }

    pub async fn run(self, cancellation_token: CancellationToken) {
        info!("Starting cleanup scheduler");
        if let Some(next) = self.schedule.upcoming(Utc).next() {
            info!(
                "Next expired-file sweep: {}",
                next.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }

        loop {
            let now = Utc::now();
            let Some(next) = self.schedule.after(&now).next() else {
                warn!("Cleanup schedule yields no further run times, stopping");
                break;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.tick().await;
                }
                _ = cancellation_token.cancelled() => {
                    info!("Cleanup scheduler received cancellation signal, shutting down");
                    break;
                }
            }
        }
    }

    async fn tick(&self) {
        match self.runner.run_sweep().await {
            Ok(SweepRun::Completed(outcome)) => {
                if outcome == SweepOutcome::default() {
                    tracing::debug!("Expired-file sweep found nothing to delete");
                }
            }
            Ok(SweepRun::AlreadyRunning) => {
                warn!("Previous sweep still running, skipping this tick");
            }
            Ok(SweepRun::TimedOut) => {
                error!(
                    "Expired-file sweep exceeded {} and was aborted",
                    humantime::format_duration(self.runner.sweep_timeout)
                );
            }
            Err(e) => {
                error!("Expired-file sweep failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::database::Database;
    use crate::services::FileStorage;
    use crate::site_settings::SettingsRegistry;

    async fn runner() -> (SweepRunner, tempfile::TempDir) {
        let database = Database::connect_with_url("sqlite::memory:", 1)
            .await
            .unwrap();
        database.migrate().await.unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(tmp.path().join("media"));
        storage.ensure_layout().await.unwrap();

        let settings = SettingsRegistry::new(&Config::default(), &database);
        let service = FileService::new(&database, storage, settings);
        (SweepRunner::new(service, Duration::from_secs(600)), tmp)
    }

    #[tokio::test]
    async fn empty_sweep_completes_with_zero_deletions() {
        let (runner, _tmp) = runner().await;
        let run = runner.run_sweep().await.unwrap();
        assert_eq!(run, SweepRun::Completed(SweepOutcome::default()));
    }

    #[tokio::test]
    async fn concurrent_sweep_is_skipped() {
        let (runner, _tmp) = runner().await;
        let guard = runner.lock.try_lock().unwrap();
        let run = runner.run_sweep().await.unwrap();
        assert_eq!(run, SweepRun::AlreadyRunning);
        drop(guard);

        let run = runner.run_sweep().await.unwrap();
        assert_eq!(run, SweepRun::Completed(SweepOutcome::default()));
    }

    #[test]
    fn default_schedule_keeps_producing_run_times() {
        let config = Config::default();
        let schedule = config.cleanup.parsed_schedule().unwrap();
        let upcoming: Vec<_> = schedule.upcoming(Utc).take(2).collect();
        assert_eq!(upcoming.len(), 2);
        // every 15 minutes
        assert_eq!((upcoming[1] - upcoming[0]).num_minutes(), 15);
    }
}

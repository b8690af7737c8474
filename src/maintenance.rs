//! Background maintenance loop: evicts expired leaderboard cache entries
//! and logs store health counters on a fixed interval.

use crate::config::StatsConfig;
use crate::service::StatsService;
use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Periodic maintenance daemon over a shared service handle.
pub struct MaintenanceDaemon {
    service: StatsService,
    interval: tokio::time::Duration,
}

impl MaintenanceDaemon {
    pub fn new(config: &StatsConfig, service: StatsService) -> Self {
        Self {
            service,
            interval: tokio::time::Duration::from_secs(config.maintenance_interval_secs),
        }
    }

    /// Run the maintenance loop (call from a tokio::spawn).
    ///
    /// The loop exits cooperatively when `cancel` is triggered.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!("Maintenance daemon started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.tick().await {
                        error!("Maintenance tick failed: {e}");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("Maintenance daemon shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// One maintenance pass: cache sweep plus a health log line.
    async fn tick(&self) -> Result<()> {
        let evicted = self.service.sweep_cache();
        let stats = self.service.store_stats().await?;

        info!(
            evicted,
            agents = stats.agents,
            submissions = stats.submissions,
            snapshots = stats.snapshots,
            "maintenance pass complete"
        );

        Ok(())
    }
}

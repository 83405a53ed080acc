//! ReconWatch Retention
//!
//! Retention Sweeper (C12): a daily purge of raw scan output older than
//! `retention_raw_output_days` and completed runs/scans/jobs older than
//! `retention_completed_runs_days`. Inventory and findings are never
//! purged by this sweeper — only the operational exhaust that accumulates
//! once a target has been monitored for a while.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use reconwatch_core::EngineConfig;
use reconwatch_store::{JobQueue, RunStore, ScanStore};
use tokio::sync::Notify;
use tracing::{info, instrument, warn};

const SWEEP_PERIOD: std::time::Duration = std::time::Duration::from_secs(24 * 3600);

pub struct RetentionSweeper {
    runs: Arc<dyn RunStore>,
    scans: Arc<dyn ScanStore>,
    jobs: Arc<dyn JobQueue>,
    config: EngineConfig,
    shutdown: Notify,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    pub raw_output_purged: u64,
    pub runs_purged: u64,
    pub jobs_purged: u64,
}

impl RetentionSweeper {
    pub fn new(
        runs: Arc<dyn RunStore>,
        scans: Arc<dyn ScanStore>,
        jobs: Arc<dyn JobQueue>,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            runs,
            scans,
            jobs,
            config,
            shutdown: Notify::new(),
        })
    }

    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let sweeper = Arc::clone(self);
        tokio::spawn(async move { sweeper.sweep_loop().await })
    }

    /// Wakes the loop immediately rather than waiting for the next 24h
    /// tick, so shutdown is prompt even mid-period.
    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    async fn sweep_loop(self: Arc<Self>) {
        info!("retention sweeper starting");
        let mut interval = tokio::time::interval(SWEEP_PERIOD);
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.notified() => break,
                _ = interval.tick() => {
                    match self.sweep_once().await {
                        Ok(report) => info!(?report, "retention sweep complete"),
                        Err(err) => warn!(error = %err, "retention sweep failed"),
                    }
                }
            }
        }
        info!("retention sweeper stopped");
    }

    #[instrument(skip(self))]
    pub async fn sweep_once(&self) -> reconwatch_store::StoreResult<SweepReport> {
        let now = Utc::now();
        let raw_output_cutoff = now - ChronoDuration::days(self.config.retention_raw_output_days as i64);
        let completed_cutoff = now - ChronoDuration::days(self.config.retention_completed_runs_days as i64);

        let raw_output_purged = self.scans.purge_raw_output_before(raw_output_cutoff).await?;
        let runs_purged = self.runs.purge_completed_before(completed_cutoff).await?;
        let jobs_purged = self.jobs.purge_completed_before(completed_cutoff).await?;

        Ok(SweepReport {
            raw_output_purged,
            runs_purged,
            jobs_purged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconwatch_store::fakes::{MemoryJobQueue, MemoryRunStore, MemoryScanStore};

    #[tokio::test]
    async fn sweep_once_purges_nothing_from_empty_stores() {
        let sweeper = RetentionSweeper::new(
            Arc::new(MemoryRunStore::new()),
            Arc::new(MemoryScanStore::new()),
            Arc::new(MemoryJobQueue::new()),
            EngineConfig::default(),
        );
        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(report.raw_output_purged, 0);
        assert_eq!(report.runs_purged, 0);
        assert_eq!(report.jobs_purged, 0);
    }

    #[tokio::test]
    async fn loop_spawns_and_shuts_down_cleanly() {
        let sweeper = RetentionSweeper::new(
            Arc::new(MemoryRunStore::new()),
            Arc::new(MemoryScanStore::new()),
            Arc::new(MemoryJobQueue::new()),
            EngineConfig::default(),
        );
        let handle = sweeper.spawn();
        sweeper.request_shutdown();
        let _ = handle.await;
    }
}

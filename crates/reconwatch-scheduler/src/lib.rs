//! ReconWatch Scheduler
//!
//! Scheduler (C10): a fixed-period tick loop that asks the store for every
//! schedule due to fire, and for each one creates a `Run` and enqueues its
//! `Pipeline` job. Drift correction and the "already has an active
//! pipeline" skip both live in `ScheduleStore::tick_due_schedules` (spec
//! §4.10) — this crate just drives the clock, mirroring the worker pool's
//! own periodic-poll shape.

use std::sync::Arc;

use reconwatch_core::domain::{JobType, Run, RunTrigger};
use reconwatch_core::EngineConfig;
use reconwatch_events::EventBus;
use reconwatch_store::{JobQueue, NewJob, RunStore, ScheduleStore};
use tokio::sync::Notify;
use tracing::{error, info, instrument, warn};

pub struct Scheduler {
    schedules: Arc<dyn ScheduleStore>,
    runs: Arc<dyn RunStore>,
    jobs: Arc<dyn JobQueue>,
    events: Arc<EventBus>,
    config: EngineConfig,
    shutdown: Notify,
}

impl Scheduler {
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        runs: Arc<dyn RunStore>,
        jobs: Arc<dyn JobQueue>,
        events: Arc<EventBus>,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            schedules,
            runs,
            jobs,
            events,
            config,
            shutdown: Notify::new(),
        })
    }

    /// Spawn the tick loop and return its join handle.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.tick_loop().await })
    }

    /// Wakes the loop immediately rather than waiting out the current tick.
    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    async fn tick_loop(self: Arc<Self>) {
        info!("scheduler starting");
        let mut interval = tokio::time::interval(self.config.scheduler_tick());
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.notified() => break,
                _ = interval.tick() => {
                    if let Err(err) = self.tick_once().await {
                        warn!(error = %err, "scheduler tick failed");
                    }
                }
            }
        }
        info!("scheduler stopped");
    }

    #[instrument(skip(self))]
    async fn tick_once(&self) -> reconwatch_store::StoreResult<()> {
        let due = self.schedules.tick_due_schedules(chrono::Utc::now()).await?;
        for schedule in due {
            let run = Run::new(schedule.target_id, RunTrigger::Scheduled, schedule.pipeline_config);
            let run = match self.runs.create_run(run).await {
                Ok(r) => r,
                Err(err) => {
                    error!(schedule_id = %schedule.schedule_id, error = %err, "failed to create scheduled run");
                    continue;
                }
            };
            if let Err(err) = self
                .jobs
                .enqueue(NewJob::now(
                    schedule.target_id,
                    Some(run.id),
                    JobType::Pipeline,
                    serde_json::json!({}),
                    0,
                ))
                .await
            {
                error!(run_id = %run.id, error = %err, "failed to enqueue scheduled pipeline job");
                continue;
            }
            self.events
                .publish(run.id, reconwatch_core::domain::RunEventKind::RunStarted)
                .await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconwatch_core::domain::{JobStatus, Schedule, TargetId};
    use reconwatch_core::RunConfig;
    use reconwatch_store::fakes::{MemoryJobQueue, MemoryRunEventLedger, MemoryRunStore, MemoryScheduleStore};
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn due_schedule_creates_run_and_enqueues_pipeline_job() {
        let schedules = Arc::new(MemoryScheduleStore::new());
        let runs = Arc::new(MemoryRunStore::new());
        let jobs = Arc::new(MemoryJobQueue::new());
        let events = Arc::new(EventBus::new(Arc::new(MemoryRunEventLedger::new())));

        let target_id = TargetId::new();
        let schedule = Schedule::new(target_id, 3600, RunConfig::default());
        schedules.create_schedule(schedule).await.unwrap();

        let mut config = EngineConfig::default();
        config.scheduler_tick_seconds = 0;

        let scheduler = Scheduler::new(schedules, runs, jobs.clone(), events, config);
        scheduler.tick_once().await.unwrap();

        let running = jobs.count_running(None).await.unwrap();
        assert_eq!(running, 0); // enqueued, not yet leased

        let leased = jobs.lease_next("w1", 60, 10, 10).await.unwrap().unwrap();
        assert_eq!(leased.job_type, JobType::Pipeline);
        assert_eq!(leased.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn loop_spawns_and_shuts_down_cleanly() {
        let schedules = Arc::new(MemoryScheduleStore::new());
        let runs = Arc::new(MemoryRunStore::new());
        let jobs = Arc::new(MemoryJobQueue::new());
        let events = Arc::new(EventBus::new(Arc::new(MemoryRunEventLedger::new())));

        let mut config = EngineConfig::default();
        config.scheduler_tick_seconds = 1;
        let scheduler = Scheduler::new(schedules, runs, jobs, events, config);
        let handle = scheduler.spawn();
        sleep(Duration::from_millis(50)).await;
        scheduler.request_shutdown();
        let _ = handle.await;
    }
}

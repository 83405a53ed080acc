//! Worker pool (§4.6): a fixed set of loops that lease, dispatch, heartbeat,
//! and resolve jobs, sharing no memory — all coordination is through the
//! `JobQueue` trait and the event bus, passed in explicitly at construction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reconwatch_core::domain::{Job, JobType, RunEventKind};
use reconwatch_core::EngineConfig;
use reconwatch_events::EventBus;
use reconwatch_store::JobQueue;
use tracing::{error, info, instrument, warn};

use crate::handler::{HandlerOutcome, JobHandler};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(50);
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(500);
const RETRY_BASE_BACKOFF_SECONDS: u64 = 5;

/// Dispatch key a handler is registered under. Matches `JobType::label()`
/// exactly (`"pipeline"`, `"scanner:nmap"`, `"verify_asset"`, ...) so
/// registering a new scanner is adding one registry row, per §9's
/// dynamic-dispatch redesign note.
pub fn dispatch_key(job_type: &JobType) -> String {
    job_type.label()
}

pub struct WorkerPool {
    job_queue: Arc<dyn JobQueue>,
    event_bus: Arc<EventBus>,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    config: EngineConfig,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(
        job_queue: Arc<dyn JobQueue>,
        event_bus: Arc<EventBus>,
        handlers: HashMap<String, Arc<dyn JobHandler>>,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            job_queue,
            event_bus,
            handlers,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Spawn `config.worker_count` independent loops and return their
    /// join handles so the caller (the daemon) can await a clean shutdown.
    pub fn spawn(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.config.worker_count)
            .map(|i| {
                let pool = Arc::clone(self);
                let worker_id = format!("worker-{i}");
                tokio::spawn(async move { pool.worker_loop(worker_id).await })
            })
            .collect()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn worker_loop(self: Arc<Self>, worker_id: String) {
        info!(worker_id = %worker_id, "worker starting");
        let mut poll_interval = MIN_POLL_INTERVAL;

        while !self.shutdown.load(Ordering::Relaxed) {
            let leased = self
                .job_queue
                .lease_next(
                    &worker_id,
                    self.config.lease_duration_seconds,
                    self.config.max_concurrent_jobs_global,
                    self.config.max_concurrent_jobs_per_target,
                )
                .await;

            match leased {
                Ok(Some(job)) => {
                    poll_interval = MIN_POLL_INTERVAL;
                    if let Some(run_id) = job.run_id {
                        self.event_bus
                            .publish(
                                run_id,
                                RunEventKind::JobLeased {
                                    job_id: job.id.to_string(),
                                    worker_id: worker_id.clone(),
                                },
                            )
                            .await;
                    }
                    self.dispatch(&worker_id, job).await;
                }
                Ok(None) => {
                    tokio::time::sleep(poll_interval).await;
                    poll_interval = (poll_interval * 2).min(MAX_POLL_INTERVAL);
                }
                Err(err) => {
                    warn!(worker_id = %worker_id, error = %err, "lease_next failed");
                    tokio::time::sleep(poll_interval).await;
                    poll_interval = (poll_interval * 2).min(MAX_POLL_INTERVAL);
                }
            }
        }
        info!(worker_id = %worker_id, "worker stopped");
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, job_type = %job.job_type.label()))]
    async fn dispatch(&self, worker_id: &str, job: Job) {
        let key = dispatch_key(&job.job_type);
        let Some(handler) = self.handlers.get(&key).cloned() else {
            error!(worker_id = %worker_id, job_type = %key, "no handler registered for job type");
            let _ = self
                .job_queue
                .fail_terminal(job.id, worker_id, &format!("no handler registered for {key}"))
                .await;
            return;
        };

        let outcome = self.run_with_heartbeat(worker_id, &job, handler).await;
        self.resolve(worker_id, &job, outcome).await;
    }

    /// Run the handler to completion while heartbeating the lease on a
    /// fixed cadence, so a long-running scanner job never has its lease
    /// expire out from under it mid-execution.
    async fn run_with_heartbeat(
        &self,
        worker_id: &str,
        job: &Job,
        handler: Arc<dyn JobHandler>,
    ) -> HandlerOutcome {
        let lease_seconds = job
            .job_type
            .default_lease_seconds(self.config.lease_duration_seconds);
        let heartbeat_period = Duration::from_secs(lease_seconds / 3).max(Duration::from_secs(1));

        let handle_fut = handler.handle(job);
        tokio::pin!(handle_fut);
        let mut ticker = tokio::time::interval(heartbeat_period);
        ticker.tick().await; // first tick fires immediately; consume it

        loop {
            tokio::select! {
                biased;
                outcome = &mut handle_fut => return outcome,
                _ = ticker.tick() => {
                    if let Err(err) = self.job_queue.heartbeat(job.id, worker_id, lease_seconds).await {
                        warn!(job_id = %job.id, error = %err, "heartbeat failed");
                    }
                }
            }
        }
    }

    async fn resolve(&self, worker_id: &str, job: &Job, outcome: HandlerOutcome) {
        let result = match outcome {
            HandlerOutcome::Success => self.job_queue.complete(job.id, worker_id).await.map(|_| ()),
            HandlerOutcome::Retryable(reason) => self
                .job_queue
                .fail(job.id, worker_id, &reason, RETRY_BASE_BACKOFF_SECONDS)
                .await
                .map(|_| ()),
            HandlerOutcome::Fatal(reason) => self
                .job_queue
                .fail_terminal(job.id, worker_id, &reason)
                .await
                .map(|_| ()),
        };
        if let Err(err) = result {
            error!(job_id = %job.id, error = %err, "failed to record job resolution");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reconwatch_core::domain::{JobStatus, RunId, TargetId};
    use reconwatch_store::fakes::{MemoryJobQueue, MemoryRunEventLedger};
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{sleep, Duration as TokioDuration};

    struct AlwaysSucceeds;
    #[async_trait]
    impl JobHandler for AlwaysSucceeds {
        async fn handle(&self, _job: &Job) -> HandlerOutcome {
            HandlerOutcome::Success
        }
    }

    struct AlwaysFatal;
    #[async_trait]
    impl JobHandler for AlwaysFatal {
        async fn handle(&self, _job: &Job) -> HandlerOutcome {
            HandlerOutcome::Fatal("scope_denied".to_string())
        }
    }

    struct CountsCalls(Arc<AtomicUsize>);
    #[async_trait]
    impl JobHandler for CountsCalls {
        async fn handle(&self, _job: &Job) -> HandlerOutcome {
            self.0.fetch_add(1, Ordering::SeqCst);
            HandlerOutcome::Success
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            worker_count: 1,
            max_concurrent_jobs_global: 10,
            max_concurrent_jobs_per_target: 10,
            lease_duration_seconds: 2,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn dispatches_to_registered_handler_and_completes() {
        let queue = Arc::new(MemoryJobQueue::new());
        let ledger = Arc::new(MemoryRunEventLedger::new());
        let bus = Arc::new(EventBus::new(ledger));

        let target_id = TargetId::new();
        let job = queue
            .enqueue(reconwatch_store::NewJob::now(
                target_id,
                None,
                JobType::Pipeline,
                serde_json::json!({}),
                0,
            ))
            .await
            .unwrap();

        let mut handlers: HashMap<String, Arc<dyn JobHandler>> = HashMap::new();
        handlers.insert("pipeline".to_string(), Arc::new(AlwaysSucceeds));

        let pool = WorkerPool::new(queue.clone(), bus, handlers, test_config());
        let handles = pool.spawn();

        sleep(TokioDuration::from_millis(300)).await;
        pool.request_shutdown();
        for h in handles {
            let _ = h.await;
        }

        let resolved = queue.get(job.id).await.unwrap();
        assert_eq!(resolved.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn fatal_outcome_skips_retry() {
        let queue = Arc::new(MemoryJobQueue::new());
        let ledger = Arc::new(MemoryRunEventLedger::new());
        let bus = Arc::new(EventBus::new(ledger));

        let target_id = TargetId::new();
        let job = queue
            .enqueue(reconwatch_store::NewJob::now(
                target_id,
                None,
                JobType::Scanner { name: "nmap".to_string() },
                serde_json::json!({}),
                0,
            ))
            .await
            .unwrap();

        let mut handlers: HashMap<String, Arc<dyn JobHandler>> = HashMap::new();
        handlers.insert("scanner:nmap".to_string(), Arc::new(AlwaysFatal));

        let pool = WorkerPool::new(queue.clone(), bus, handlers, test_config());
        let handles = pool.spawn();

        sleep(TokioDuration::from_millis(300)).await;
        pool.request_shutdown();
        for h in handles {
            let _ = h.await;
        }

        let resolved = queue.get(job.id).await.unwrap();
        assert_eq!(resolved.status, JobStatus::Failed);
        assert_eq!(resolved.attempts, 1);
    }

    #[tokio::test]
    async fn missing_handler_fails_job_terminally() {
        let queue = Arc::new(MemoryJobQueue::new());
        let ledger = Arc::new(MemoryRunEventLedger::new());
        let bus = Arc::new(EventBus::new(ledger));

        let target_id = TargetId::new();
        let job = queue
            .enqueue(reconwatch_store::NewJob::now(
                target_id,
                None,
                JobType::VerifyService,
                serde_json::json!({}),
                0,
            ))
            .await
            .unwrap();

        let handlers: HashMap<String, Arc<dyn JobHandler>> = HashMap::new();
        let pool = WorkerPool::new(queue.clone(), bus, handlers, test_config());
        let handles = pool.spawn();

        sleep(TokioDuration::from_millis(300)).await;
        pool.request_shutdown();
        for h in handles {
            let _ = h.await;
        }

        let resolved = queue.get(job.id).await.unwrap();
        assert_eq!(resolved.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn each_job_dispatched_exactly_once() {
        let queue = Arc::new(MemoryJobQueue::new());
        let ledger = Arc::new(MemoryRunEventLedger::new());
        let bus = Arc::new(EventBus::new(ledger));
        let calls = Arc::new(AtomicUsize::new(0));

        let target_id = TargetId::new();
        queue
            .enqueue(reconwatch_store::NewJob::now(
                target_id,
                Some(RunId::new()),
                JobType::Pipeline,
                serde_json::json!({}),
                0,
            ))
            .await
            .unwrap();

        let mut handlers: HashMap<String, Arc<dyn JobHandler>> = HashMap::new();
        handlers.insert(
            "pipeline".to_string(),
            Arc::new(CountsCalls(calls.clone())),
        );

        let pool = WorkerPool::new(queue, bus, handlers, test_config());
        let handles = pool.spawn();
        sleep(TokioDuration::from_millis(300)).await;
        pool.request_shutdown();
        for h in handles {
            let _ = h.await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

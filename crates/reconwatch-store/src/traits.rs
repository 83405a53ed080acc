//! Storage trait definitions for targets, inventory, jobs, runs, scans,
//! findings, schedules, and the run-event ledger.
//!
//! Every trait is async and backend-agnostic; `SurrealStore` (one handle,
//! many trait impls) is the production backend and `fakes` provides
//! in-memory doubles for tests that don't need a real database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use reconwatch_core::domain::{
    Asset, AssetId, AssetType, Edge, EdgeId, EdgeRelType, Finding, FindingId, Job, JobId, JobType,
    Proto, Run, RunEvent, RunId, Scan, ScanId, Schedule, ScheduleId, Service, ServiceId, Target,
    TargetId,
};
use reconwatch_core::ArtifactStatus;

use crate::error::StoreResult;

/// Optional product/version/service-name fields merged on a service
/// re-observation (§4.3: "last writer wins for a given run").
#[derive(Debug, Clone, Default)]
pub struct ServiceFingerprint {
    pub name: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
}

#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn create_target(&self, target: Target) -> StoreResult<Target>;
    async fn get_target(&self, target_id: TargetId) -> StoreResult<Target>;
    async fn list_targets(&self) -> StoreResult<Vec<Target>>;
}

/// Inventory Store (C3): upserts assets/services/edges with first/last-seen
/// provenance. All three `*_seen` operations are idempotent — replaying the
/// same run's ingestion yields the same row state.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn upsert_asset_seen(
        &self,
        target_id: TargetId,
        run_id: RunId,
        asset_type: AssetType,
        raw_value: &str,
        normalized_value: &str,
    ) -> StoreResult<Asset>;

    async fn upsert_service_seen(
        &self,
        target_id: TargetId,
        run_id: RunId,
        asset_id: AssetId,
        port: u16,
        proto: Proto,
        fingerprint: ServiceFingerprint,
    ) -> StoreResult<Service>;

    async fn upsert_edge_seen(
        &self,
        target_id: TargetId,
        run_id: RunId,
        from_asset_id: AssetId,
        to_asset_id: AssetId,
        rel_type: EdgeRelType,
    ) -> StoreResult<Edge>;

    async fn get_asset(&self, asset_id: AssetId) -> StoreResult<Asset>;
    async fn list_assets(&self, target_id: TargetId) -> StoreResult<Vec<Asset>>;
    async fn list_assets_by_type(
        &self,
        target_id: TargetId,
        asset_type: AssetType,
    ) -> StoreResult<Vec<Asset>>;
    async fn list_services(&self, target_id: TargetId) -> StoreResult<Vec<Service>>;
    async fn list_services_for_asset(&self, asset_id: AssetId) -> StoreResult<Vec<Service>>;
    async fn list_edges(&self, target_id: TargetId) -> StoreResult<Vec<Edge>>;

    async fn set_asset_status(
        &self,
        asset_id: AssetId,
        status: ArtifactStatus,
        reason: Option<String>,
        mark_verified: bool,
    ) -> StoreResult<Asset>;

    async fn set_service_status(
        &self,
        service_id: ServiceId,
        status: ArtifactStatus,
        reason: Option<String>,
        mark_verified: bool,
    ) -> StoreResult<Service>;

    /// Assets `active` in a prior run but not observed in `run_id`, whose
    /// type was in scope for the stages that ran (§4.8).
    async fn assets_candidate_stale(
        &self,
        target_id: TargetId,
        run_id: RunId,
        observed_types: &[AssetType],
    ) -> StoreResult<Vec<Asset>>;

    async fn services_candidate_stale(
        &self,
        target_id: TargetId,
        run_id: RunId,
    ) -> StoreResult<Vec<Service>>;

    async fn assets_first_seen_in_run(
        &self,
        target_id: TargetId,
        run_id: RunId,
    ) -> StoreResult<Vec<Asset>>;

    async fn services_first_seen_in_run(
        &self,
        target_id: TargetId,
        run_id: RunId,
    ) -> StoreResult<Vec<Service>>;
}

/// A job ready to be enqueued; `available_at` defaults to now.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub target_id: TargetId,
    pub run_id: Option<RunId>,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub available_at: DateTime<Utc>,
    pub max_attempts: u32,
}

impl NewJob {
    pub fn now(target_id: TargetId, run_id: Option<RunId>, job_type: JobType, payload: serde_json::Value, priority: i32) -> Self {
        Self {
            target_id,
            run_id,
            job_type,
            payload,
            priority,
            available_at: Utc::now(),
            max_attempts: 3,
        }
    }
}

/// Job Queue (C5): durable FIFO-with-priority queue, lease/heartbeat/retry.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, new_job: NewJob) -> StoreResult<Job>;

    /// Atomically select, lock, and claim the oldest eligible queued job
    /// subject to the global/per-target concurrency caps. Returns `None`
    /// if no job is eligible right now (caps exhausted or queue empty).
    async fn lease_next(
        &self,
        worker_id: &str,
        lease_seconds: u64,
        max_concurrent_global: u32,
        max_concurrent_per_target: u32,
    ) -> StoreResult<Option<Job>>;

    async fn heartbeat(&self, job_id: JobId, worker_id: &str, lease_seconds: u64) -> StoreResult<()>;

    async fn complete(&self, job_id: JobId, worker_id: &str) -> StoreResult<Job>;

    async fn fail(
        &self,
        job_id: JobId,
        worker_id: &str,
        reason: &str,
        base_backoff_seconds: u64,
    ) -> StoreResult<Job>;

    /// Fail a job without consuming a retry, for error kinds §7 classifies
    /// as never retried (`scope_denied`, `cancelled`). Sets `status=failed`
    /// and `last_error` unconditionally, regardless of `attempts`.
    async fn fail_terminal(&self, job_id: JobId, worker_id: &str, reason: &str) -> StoreResult<Job>;

    async fn cancel(&self, job_id: JobId) -> StoreResult<Job>;

    /// Set the cooperative cancel flag on a running job.
    async fn request_cancel(&self, job_id: JobId) -> StoreResult<()>;

    /// Janitor sweep: reopen any `running` job whose lease has expired.
    /// Does not increment `attempts` (§4.5: only completion attempts count).
    async fn reclaim_expired_leases(&self, now: DateTime<Utc>) -> StoreResult<Vec<Job>>;

    async fn get(&self, job_id: JobId) -> StoreResult<Job>;

    /// Cancel cascade helper (§5): mark all queued children of a run
    /// cancelled and return the running ones so the caller can signal them.
    async fn cancel_children(&self, run_id: RunId) -> StoreResult<(Vec<Job>, Vec<Job>)>;

    async fn count_running(&self, target_id: Option<TargetId>) -> StoreResult<u32>;

    async fn purge_completed_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

/// Run lifecycle persistence (data model §3 `Run`).
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create_run(&self, run: Run) -> StoreResult<Run>;
    async fn mark_running(&self, run_id: RunId) -> StoreResult<Run>;
    async fn complete_run(&self, run_id: RunId) -> StoreResult<Run>;
    async fn fail_run(&self, run_id: RunId, failure_summary: &str) -> StoreResult<Run>;
    async fn cancel_run(&self, run_id: RunId) -> StoreResult<Run>;
    async fn discard_run(&self, run_id: RunId) -> StoreResult<Run>;
    async fn get_run(&self, run_id: RunId) -> StoreResult<Run>;
    /// §3 invariant: at most one non-terminal pipeline run per target.
    async fn has_active_pipeline(&self, target_id: TargetId) -> StoreResult<bool>;
    async fn list_runs(&self, target_id: TargetId) -> StoreResult<Vec<Run>>;
    async fn purge_completed_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

/// Scan execution records (data model §3 `Scan`).
#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn start_scan(&self, scan: Scan) -> StoreResult<Scan>;
    async fn append_output(&self, scan_id: ScanId, chunk: &str, retain_bytes: usize) -> StoreResult<()>;
    async fn complete_scan(&self, scan_id: ScanId) -> StoreResult<Scan>;
    async fn fail_scan(&self, scan_id: ScanId) -> StoreResult<Scan>;
    async fn get_scan(&self, scan_id: ScanId) -> StoreResult<Scan>;
    async fn purge_raw_output_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

/// Findings (data model §3 `Finding`).
#[async_trait]
pub trait FindingStore: Send + Sync {
    async fn record_finding(&self, finding: Finding) -> StoreResult<Finding>;
    async fn get_finding(&self, finding_id: FindingId) -> StoreResult<Finding>;
    async fn list_findings(&self, target_id: TargetId) -> StoreResult<Vec<Finding>>;
    async fn list_findings_for_run(&self, run_id: RunId) -> StoreResult<Vec<Finding>>;
}

/// A schedule whose tick fired this round, with enough context for the
/// caller to enqueue the pipeline job without a second read.
#[derive(Debug, Clone)]
pub struct DueSchedule {
    pub schedule_id: ScheduleId,
    pub target_id: TargetId,
    pub pipeline_config: reconwatch_core::RunConfig,
}

/// Scheduler persistence (C10): per-tick atomic select-due-and-advance.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn create_schedule(&self, schedule: Schedule) -> StoreResult<Schedule>;
    async fn get_schedule(&self, schedule_id: ScheduleId) -> StoreResult<Schedule>;
    async fn list_schedules_for_target(&self, target_id: TargetId) -> StoreResult<Vec<Schedule>>;

    /// Select every enabled schedule whose `next_run_at <= now` and whose
    /// target has no active pipeline, advance `next_run_at`/`last_run_at`
    /// with drift correction, and return them for enqueueing. Each
    /// schedule's select-and-advance is one atomic operation.
    async fn tick_due_schedules(&self, now: DateTime<Utc>) -> StoreResult<Vec<DueSchedule>>;
}

/// Persisted audit trail (C11: terminal-transition `RunEvent` rows).
#[async_trait]
pub trait RunEventLedger: Send + Sync {
    async fn append_run_event(&self, event: RunEvent) -> StoreResult<()>;
    async fn list_run_events(&self, run_id: RunId) -> StoreResult<Vec<RunEvent>>;
}

//! In-memory fakes for the store traits (testing only).
//!
//! One small `Mutex<HashMap<...>>`-backed struct per trait, mirroring the
//! production `SurrealStore`'s semantics without a real database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use reconwatch_core::domain::{
    Asset, AssetId, AssetType, Edge, EdgeId, EdgeRelType, Finding, FindingId, Job, JobId,
    JobStatus, Proto, Run, RunEvent, RunId, RunStatus, Scan, ScanId, ScanStatus, Schedule,
    ScheduleId, Service, ServiceId, Target, TargetId,
};
use reconwatch_core::ArtifactStatus;

use crate::error::{StoreError, StoreResult};
use crate::traits::*;

// ---------------------------------------------------------------------------
// MemoryTargetStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryTargetStore {
    targets: Mutex<HashMap<String, Target>>,
}

impl MemoryTargetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TargetStore for MemoryTargetStore {
    async fn create_target(&self, target: Target) -> StoreResult<Target> {
        let mut targets = self.targets.lock().unwrap();
        targets.insert(target.id.to_string(), target.clone());
        Ok(target)
    }

    async fn get_target(&self, target_id: TargetId) -> StoreResult<Target> {
        let targets = self.targets.lock().unwrap();
        targets
            .get(&target_id.to_string())
            .cloned()
            .ok_or_else(|| StoreError::TargetNotFound(target_id.to_string()))
    }

    async fn list_targets(&self) -> StoreResult<Vec<Target>> {
        let targets = self.targets.lock().unwrap();
        Ok(targets.values().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryInventoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryInventoryStore {
    assets: Mutex<HashMap<String, Asset>>,
    services: Mutex<HashMap<String, Service>>,
    edges: Mutex<HashMap<String, Edge>>,
}

impl MemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStore for MemoryInventoryStore {
    async fn upsert_asset_seen(
        &self,
        target_id: TargetId,
        run_id: RunId,
        asset_type: AssetType,
        raw_value: &str,
        normalized_value: &str,
    ) -> StoreResult<Asset> {
        let mut assets = self.assets.lock().unwrap();
        let existing = assets.values_mut().find(|a| {
            a.target_id == target_id && a.asset_type == asset_type && a.normalized_value == normalized_value
        });

        if let Some(asset) = existing {
            asset.last_seen_run_id = run_id;
            asset.last_seen_at = Utc::now();
            asset.status_reason = None;
            if matches!(
                asset.status,
                ArtifactStatus::Stale | ArtifactStatus::Closed | ArtifactStatus::Unresolved
            ) {
                asset.status = ArtifactStatus::Active;
                asset.verified_at = Some(Utc::now());
            }
            Ok(asset.clone())
        } else {
            let asset = Asset::first_seen(target_id, asset_type, raw_value, normalized_value, run_id);
            assets.insert(asset.id.to_string(), asset.clone());
            Ok(asset)
        }
    }

    async fn upsert_service_seen(
        &self,
        target_id: TargetId,
        run_id: RunId,
        asset_id: AssetId,
        port: u16,
        proto: Proto,
        fingerprint: ServiceFingerprint,
    ) -> StoreResult<Service> {
        let mut services = self.services.lock().unwrap();
        let existing = services
            .values_mut()
            .find(|s| s.target_id == target_id && s.asset_id == asset_id && s.port == port && s.proto == proto);

        if let Some(svc) = existing {
            svc.last_seen_run_id = run_id;
            svc.last_seen_at = Utc::now();
            svc.status_reason = None;
            if let Some(name) = fingerprint.name {
                svc.name = Some(name);
            }
            if let Some(product) = fingerprint.product {
                svc.product = Some(product);
            }
            if let Some(version) = fingerprint.version {
                svc.version = Some(version);
            }
            if matches!(
                svc.status,
                ArtifactStatus::Stale | ArtifactStatus::Closed | ArtifactStatus::Unresolved
            ) {
                svc.status = ArtifactStatus::Active;
                svc.verified_at = Some(Utc::now());
            }
            Ok(svc.clone())
        } else {
            let mut svc = Service::first_seen(target_id, asset_id, port, proto, run_id);
            svc.name = fingerprint.name;
            svc.product = fingerprint.product;
            svc.version = fingerprint.version;
            services.insert(svc.id.to_string(), svc.clone());
            Ok(svc)
        }
    }

    async fn upsert_edge_seen(
        &self,
        target_id: TargetId,
        run_id: RunId,
        from_asset_id: AssetId,
        to_asset_id: AssetId,
        rel_type: EdgeRelType,
    ) -> StoreResult<Edge> {
        let mut edges = self.edges.lock().unwrap();
        let existing = edges
            .values_mut()
            .find(|e| e.from_asset_id == from_asset_id && e.to_asset_id == to_asset_id && e.rel_type == rel_type);

        if let Some(edge) = existing {
            edge.last_seen_run_id = run_id;
            edge.last_seen_at = Utc::now();
            Ok(edge.clone())
        } else {
            let edge = Edge::first_seen(target_id, from_asset_id, to_asset_id, rel_type, run_id);
            edges.insert(edge.id.to_string(), edge.clone());
            Ok(edge)
        }
    }

    async fn get_asset(&self, asset_id: AssetId) -> StoreResult<Asset> {
        let assets = self.assets.lock().unwrap();
        assets
            .get(&asset_id.to_string())
            .cloned()
            .ok_or_else(|| StoreError::AssetNotFound(asset_id.to_string()))
    }

    async fn list_assets(&self, target_id: TargetId) -> StoreResult<Vec<Asset>> {
        let assets = self.assets.lock().unwrap();
        Ok(assets.values().filter(|a| a.target_id == target_id).cloned().collect())
    }

    async fn list_assets_by_type(
        &self,
        target_id: TargetId,
        asset_type: AssetType,
    ) -> StoreResult<Vec<Asset>> {
        let assets = self.assets.lock().unwrap();
        Ok(assets
            .values()
            .filter(|a| a.target_id == target_id && a.asset_type == asset_type)
            .cloned()
            .collect())
    }

    async fn list_services(&self, target_id: TargetId) -> StoreResult<Vec<Service>> {
        let services = self.services.lock().unwrap();
        Ok(services.values().filter(|s| s.target_id == target_id).cloned().collect())
    }

    async fn list_services_for_asset(&self, asset_id: AssetId) -> StoreResult<Vec<Service>> {
        let services = self.services.lock().unwrap();
        Ok(services.values().filter(|s| s.asset_id == asset_id).cloned().collect())
    }

    async fn list_edges(&self, target_id: TargetId) -> StoreResult<Vec<Edge>> {
        let edges = self.edges.lock().unwrap();
        Ok(edges.values().filter(|e| e.target_id == target_id).cloned().collect())
    }

    async fn set_asset_status(
        &self,
        asset_id: AssetId,
        status: ArtifactStatus,
        reason: Option<String>,
        mark_verified: bool,
    ) -> StoreResult<Asset> {
        let mut assets = self.assets.lock().unwrap();
        let asset = assets
            .get_mut(&asset_id.to_string())
            .ok_or_else(|| StoreError::AssetNotFound(asset_id.to_string()))?;
        asset.status = status;
        asset.status_reason = reason;
        if mark_verified {
            asset.verified_at = Some(Utc::now());
        }
        Ok(asset.clone())
    }

    async fn set_service_status(
        &self,
        service_id: ServiceId,
        status: ArtifactStatus,
        reason: Option<String>,
        mark_verified: bool,
    ) -> StoreResult<Service> {
        let mut services = self.services.lock().unwrap();
        let svc = services
            .get_mut(&service_id.to_string())
            .ok_or_else(|| StoreError::ServiceNotFound(service_id.to_string()))?;
        svc.status = status;
        svc.status_reason = reason;
        if mark_verified {
            svc.verified_at = Some(Utc::now());
        }
        Ok(svc.clone())
    }

    async fn assets_candidate_stale(
        &self,
        target_id: TargetId,
        run_id: RunId,
        observed_types: &[AssetType],
    ) -> StoreResult<Vec<Asset>> {
        let assets = self.assets.lock().unwrap();
        Ok(assets
            .values()
            .filter(|a| {
                a.target_id == target_id
                    && a.last_seen_run_id != run_id
                    && a.status == ArtifactStatus::Active
                    && observed_types.contains(&a.asset_type)
            })
            .cloned()
            .collect())
    }

    async fn services_candidate_stale(&self, target_id: TargetId, run_id: RunId) -> StoreResult<Vec<Service>> {
        let services = self.services.lock().unwrap();
        Ok(services
            .values()
            .filter(|s| s.target_id == target_id && s.last_seen_run_id != run_id && s.status == ArtifactStatus::Active)
            .cloned()
            .collect())
    }

    async fn assets_first_seen_in_run(&self, target_id: TargetId, run_id: RunId) -> StoreResult<Vec<Asset>> {
        let assets = self.assets.lock().unwrap();
        Ok(assets
            .values()
            .filter(|a| a.target_id == target_id && a.first_seen_run_id == run_id)
            .cloned()
            .collect())
    }

    async fn services_first_seen_in_run(&self, target_id: TargetId, run_id: RunId) -> StoreResult<Vec<Service>> {
        let services = self.services.lock().unwrap();
        Ok(services
            .values()
            .filter(|s| s.target_id == target_id && s.first_seen_run_id == run_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryJobQueue
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<HashMap<String, Job>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, new_job: NewJob) -> StoreResult<Job> {
        let mut job = Job::new(new_job.target_id, new_job.run_id, new_job.job_type, new_job.payload, new_job.priority);
        job.available_at = new_job.available_at;
        job.max_attempts = new_job.max_attempts;
        let mut jobs = self.jobs.lock().unwrap();
        jobs.insert(job.id.to_string(), job.clone());
        Ok(job)
    }

    async fn lease_next(
        &self,
        worker_id: &str,
        lease_seconds: u64,
        max_concurrent_global: u32,
        max_concurrent_per_target: u32,
    ) -> StoreResult<Option<Job>> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().unwrap();

        let global_running = jobs.values().filter(|j| j.status == JobStatus::Running).count() as u32;
        if global_running >= max_concurrent_global {
            return Ok(None);
        }

        let mut candidates: Vec<String> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued && j.available_at <= now)
            .map(|j| j.id.to_string())
            .collect();
        candidates.sort_by_key(|id| {
            let j = &jobs[id];
            (std::cmp::Reverse(j.priority), j.available_at)
        });

        for id in candidates {
            let target_id = jobs[&id].target_id;
            let per_target_running = jobs
                .values()
                .filter(|j| j.status == JobStatus::Running && j.target_id == target_id)
                .count() as u32;
            if per_target_running >= max_concurrent_per_target {
                continue;
            }
            let job = jobs.get_mut(&id).unwrap();
            job.status = JobStatus::Running;
            job.lease_owner = Some(worker_id.to_string());
            job.lease_expires_at = Some(now + chrono::Duration::seconds(lease_seconds as i64));
            job.attempts += 1;
            return Ok(Some(job.clone()));
        }
        Ok(None)
    }

    async fn heartbeat(&self, job_id: JobId, worker_id: &str, lease_seconds: u64) -> StoreResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id.to_string())
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        if job.status != JobStatus::Running || job.lease_owner.as_deref() != Some(worker_id) {
            return Err(StoreError::InvalidJobState {
                job_id: job_id.to_string(),
                status: format!("{:?}", job.status),
            });
        }
        job.lease_expires_at = Some(Utc::now() + chrono::Duration::seconds(lease_seconds as i64));
        Ok(())
    }

    async fn complete(&self, job_id: JobId, worker_id: &str) -> StoreResult<Job> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id.to_string())
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        if job.lease_owner.as_deref() != Some(worker_id) {
            return Err(StoreError::InvalidJobState {
                job_id: job_id.to_string(),
                status: format!("{:?}", job.status),
            });
        }
        job.status = JobStatus::Completed;
        job.lease_owner = None;
        job.lease_expires_at = None;
        Ok(job.clone())
    }

    async fn fail(&self, job_id: JobId, worker_id: &str, reason: &str, base_backoff_seconds: u64) -> StoreResult<Job> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id.to_string())
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        if job.lease_owner.as_deref() != Some(worker_id) {
            return Err(StoreError::InvalidJobState {
                job_id: job_id.to_string(),
                status: format!("{:?}", job.status),
            });
        }
        job.last_error = Some(reason.to_string());
        job.lease_owner = None;
        job.lease_expires_at = None;
        if job.attempts >= job.max_attempts {
            job.status = JobStatus::Failed;
        } else {
            job.status = JobStatus::Queued;
            let backoff = base_backoff_seconds * 2u64.pow(job.attempts.saturating_sub(1));
            let jitter = (job.attempts as u64 * 7) % 5;
            job.available_at = Utc::now() + chrono::Duration::seconds((backoff + jitter) as i64);
        }
        Ok(job.clone())
    }

    async fn fail_terminal(&self, job_id: JobId, worker_id: &str, reason: &str) -> StoreResult<Job> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id.to_string())
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        if job.lease_owner.as_deref() != Some(worker_id) {
            return Err(StoreError::InvalidJobState {
                job_id: job_id.to_string(),
                status: format!("{:?}", job.status),
            });
        }
        job.last_error = Some(reason.to_string());
        job.lease_owner = None;
        job.lease_expires_at = None;
        job.status = JobStatus::Failed;
        Ok(job.clone())
    }

    async fn cancel(&self, job_id: JobId) -> StoreResult<Job> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id.to_string())
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        job.status = JobStatus::Cancelled;
        Ok(job.clone())
    }

    async fn request_cancel(&self, job_id: JobId) -> StoreResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id.to_string())
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        job.cancel_requested = true;
        Ok(())
    }

    async fn reclaim_expired_leases(&self, now: DateTime<Utc>) -> StoreResult<Vec<Job>> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut reclaimed = Vec::new();
        for job in jobs.values_mut() {
            if job.status == JobStatus::Running && job.lease_expires_at.map(|e| e < now).unwrap_or(false) {
                job.status = JobStatus::Queued;
                job.lease_owner = None;
                job.lease_expires_at = None;
                reclaimed.push(job.clone());
            }
        }
        Ok(reclaimed)
    }

    async fn get(&self, job_id: JobId) -> StoreResult<Job> {
        let jobs = self.jobs.lock().unwrap();
        jobs.get(&job_id.to_string())
            .cloned()
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))
    }

    async fn cancel_children(&self, run_id: RunId) -> StoreResult<(Vec<Job>, Vec<Job>)> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut cancelled = Vec::new();
        let mut signalled = Vec::new();
        for job in jobs.values_mut() {
            if job.run_id != Some(run_id) {
                continue;
            }
            match job.status {
                JobStatus::Queued => {
                    job.status = JobStatus::Cancelled;
                    cancelled.push(job.clone());
                }
                JobStatus::Running => {
                    job.cancel_requested = true;
                    signalled.push(job.clone());
                }
                _ => {}
            }
        }
        Ok((cancelled, signalled))
    }

    async fn count_running(&self, target_id: Option<TargetId>) -> StoreResult<u32> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .values()
            .filter(|j| j.status == JobStatus::Running && target_id.map(|t| t == j.target_id).unwrap_or(true))
            .count() as u32)
    }

    async fn purge_completed_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|_, j| {
            !(matches!(j.status, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
                && j.available_at < cutoff)
        });
        Ok((before - jobs.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// MemoryRunStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryRunStore {
    runs: Mutex<HashMap<String, Run>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create_run(&self, run: Run) -> StoreResult<Run> {
        let mut runs = self.runs.lock().unwrap();
        if run.trigger == reconwatch_core::RunTrigger::Scheduled
            && runs
                .values()
                .any(|r| r.target_id == run.target_id && r.status.is_active())
        {
            return Err(StoreError::ActiveRunExists(run.target_id.to_string()));
        }
        runs.insert(run.id.to_string(), run.clone());
        Ok(run)
    }

    async fn mark_running(&self, run_id: RunId) -> StoreResult<Run> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .get_mut(&run_id.to_string())
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;
        run.status = RunStatus::Running;
        run.started_at = Some(Utc::now());
        Ok(run.clone())
    }

    async fn complete_run(&self, run_id: RunId) -> StoreResult<Run> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .get_mut(&run_id.to_string())
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;
        run.status = RunStatus::Completed;
        run.completed_at = Some(Utc::now());
        Ok(run.clone())
    }

    async fn fail_run(&self, run_id: RunId, failure_summary: &str) -> StoreResult<Run> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .get_mut(&run_id.to_string())
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;
        run.status = RunStatus::Failed;
        run.completed_at = Some(Utc::now());
        run.failure_summary = Some(failure_summary.to_string());
        Ok(run.clone())
    }

    async fn cancel_run(&self, run_id: RunId) -> StoreResult<Run> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .get_mut(&run_id.to_string())
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;
        run.status = RunStatus::Cancelled;
        run.completed_at = Some(Utc::now());
        Ok(run.clone())
    }

    async fn discard_run(&self, run_id: RunId) -> StoreResult<Run> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .get_mut(&run_id.to_string())
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;
        run.status = RunStatus::Discarded;
        run.completed_at = Some(Utc::now());
        Ok(run.clone())
    }

    async fn get_run(&self, run_id: RunId) -> StoreResult<Run> {
        let runs = self.runs.lock().unwrap();
        runs.get(&run_id.to_string())
            .cloned()
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))
    }

    async fn has_active_pipeline(&self, target_id: TargetId) -> StoreResult<bool> {
        let runs = self.runs.lock().unwrap();
        Ok(runs.values().any(|r| r.target_id == target_id && r.status.is_active()))
    }

    async fn list_runs(&self, target_id: TargetId) -> StoreResult<Vec<Run>> {
        let runs = self.runs.lock().unwrap();
        Ok(runs.values().filter(|r| r.target_id == target_id).cloned().collect())
    }

    async fn purge_completed_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut runs = self.runs.lock().unwrap();
        let before = runs.len();
        runs.retain(|_, r| !(r.status.is_terminal() && r.completed_at.map(|c| c < cutoff).unwrap_or(false)));
        Ok((before - runs.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// MemoryScanStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryScanStore {
    scans: Mutex<HashMap<String, Scan>>,
}

impl MemoryScanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScanStore for MemoryScanStore {
    async fn start_scan(&self, scan: Scan) -> StoreResult<Scan> {
        let mut scans = self.scans.lock().unwrap();
        scans.insert(scan.id.to_string(), scan.clone());
        Ok(scan)
    }

    async fn append_output(&self, scan_id: ScanId, chunk: &str, retain_bytes: usize) -> StoreResult<()> {
        let mut scans = self.scans.lock().unwrap();
        let scan = scans
            .get_mut(&scan_id.to_string())
            .ok_or_else(|| StoreError::ScanNotFound(scan_id.to_string()))?;
        scan.raw_output.push_str(chunk);
        if scan.raw_output.len() > retain_bytes {
            let start = scan.raw_output.len() - retain_bytes;
            scan.raw_output = scan.raw_output[start..].to_string();
        }
        Ok(())
    }

    async fn complete_scan(&self, scan_id: ScanId) -> StoreResult<Scan> {
        let mut scans = self.scans.lock().unwrap();
        let scan = scans
            .get_mut(&scan_id.to_string())
            .ok_or_else(|| StoreError::ScanNotFound(scan_id.to_string()))?;
        scan.status = ScanStatus::Completed;
        scan.completed_at = Some(Utc::now());
        Ok(scan.clone())
    }

    async fn fail_scan(&self, scan_id: ScanId) -> StoreResult<Scan> {
        let mut scans = self.scans.lock().unwrap();
        let scan = scans
            .get_mut(&scan_id.to_string())
            .ok_or_else(|| StoreError::ScanNotFound(scan_id.to_string()))?;
        scan.status = ScanStatus::Failed;
        scan.completed_at = Some(Utc::now());
        Ok(scan.clone())
    }

    async fn get_scan(&self, scan_id: ScanId) -> StoreResult<Scan> {
        let scans = self.scans.lock().unwrap();
        scans
            .get(&scan_id.to_string())
            .cloned()
            .ok_or_else(|| StoreError::ScanNotFound(scan_id.to_string()))
    }

    async fn purge_raw_output_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut scans = self.scans.lock().unwrap();
        let mut count = 0;
        for scan in scans.values_mut() {
            if scan.status != ScanStatus::Running && scan.started_at < cutoff && !scan.raw_output.is_empty() {
                scan.raw_output.clear();
                count += 1;
            }
        }
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// MemoryFindingStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryFindingStore {
    findings: Mutex<HashMap<String, Finding>>,
}

impl MemoryFindingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FindingStore for MemoryFindingStore {
    async fn record_finding(&self, finding: Finding) -> StoreResult<Finding> {
        let mut findings = self.findings.lock().unwrap();
        findings.insert(finding.id.to_string(), finding.clone());
        Ok(finding)
    }

    async fn get_finding(&self, finding_id: FindingId) -> StoreResult<Finding> {
        let findings = self.findings.lock().unwrap();
        findings
            .get(&finding_id.to_string())
            .cloned()
            .ok_or_else(|| StoreError::RunNotFound(finding_id.to_string()))
    }

    async fn list_findings(&self, target_id: TargetId) -> StoreResult<Vec<Finding>> {
        let findings = self.findings.lock().unwrap();
        Ok(findings.values().filter(|f| f.target_id == target_id).cloned().collect())
    }

    async fn list_findings_for_run(&self, run_id: RunId) -> StoreResult<Vec<Finding>> {
        let findings = self.findings.lock().unwrap();
        Ok(findings.values().filter(|f| f.run_id == run_id).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryScheduleStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryScheduleStore {
    schedules: Mutex<HashMap<String, Schedule>>,
    active_pipelines: Mutex<std::collections::HashSet<String>>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: mark a target as having (or not having) an active pipeline,
    /// so `tick_due_schedules` can exercise the "skip if busy" branch without
    /// a `RunStore` dependency.
    pub fn set_active_pipeline(&self, target_id: TargetId, active: bool) {
        let mut set = self.active_pipelines.lock().unwrap();
        if active {
            set.insert(target_id.to_string());
        } else {
            set.remove(&target_id.to_string());
        }
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn create_schedule(&self, schedule: Schedule) -> StoreResult<Schedule> {
        let mut schedules = self.schedules.lock().unwrap();
        schedules.insert(schedule.id.to_string(), schedule.clone());
        Ok(schedule)
    }

    async fn get_schedule(&self, schedule_id: ScheduleId) -> StoreResult<Schedule> {
        let schedules = self.schedules.lock().unwrap();
        schedules
            .get(&schedule_id.to_string())
            .cloned()
            .ok_or_else(|| StoreError::ScheduleNotFound(schedule_id.to_string()))
    }

    async fn list_schedules_for_target(&self, target_id: TargetId) -> StoreResult<Vec<Schedule>> {
        let schedules = self.schedules.lock().unwrap();
        Ok(schedules.values().filter(|s| s.target_id == target_id).cloned().collect())
    }

    async fn tick_due_schedules(&self, now: DateTime<Utc>) -> StoreResult<Vec<DueSchedule>> {
        let mut schedules = self.schedules.lock().unwrap();
        let active = self.active_pipelines.lock().unwrap();
        let mut fired = Vec::new();
        for schedule in schedules.values_mut() {
            if !schedule.enabled || schedule.next_run_at > now {
                continue;
            }
            if active.contains(&schedule.target_id.to_string()) {
                continue;
            }
            schedule.advance(now);
            fired.push(DueSchedule {
                schedule_id: schedule.id,
                target_id: schedule.target_id,
                pipeline_config: schedule.pipeline_config,
            });
        }
        Ok(fired)
    }
}

// ---------------------------------------------------------------------------
// MemoryRunEventLedger
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryRunEventLedger {
    events: Mutex<HashMap<String, Vec<RunEvent>>>,
}

impl MemoryRunEventLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunEventLedger for MemoryRunEventLedger {
    async fn append_run_event(&self, event: RunEvent) -> StoreResult<()> {
        let mut events = self.events.lock().unwrap();
        events.entry(event.run_id.to_string()).or_default().push(event);
        Ok(())
    }

    async fn list_run_events(&self, run_id: RunId) -> StoreResult<Vec<RunEvent>> {
        let events = self.events.lock().unwrap();
        let mut list = events.get(&run_id.to_string()).cloned().unwrap_or_default();
        list.sort_by_key(|e| e.seq);
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconwatch_core::domain::{JobType, RunConfig, RunTrigger};

    #[tokio::test]
    async fn memory_job_queue_lease_and_fail_backoff() {
        let queue = MemoryJobQueue::new();
        let target_id = TargetId::new();
        let job = queue
            .enqueue(NewJob::now(target_id, None, JobType::Pipeline, serde_json::json!({}), 0))
            .await
            .unwrap();

        let leased = queue.lease_next("w1", 300, 5, 5).await.unwrap().unwrap();
        assert_eq!(leased.id, job.id);

        let failed = queue.fail(job.id, "w1", "boom", 10).await.unwrap();
        assert_eq!(failed.status, JobStatus::Queued);
        assert!(failed.available_at > Utc::now());
    }

    #[tokio::test]
    async fn memory_run_store_rejects_second_scheduled_run_while_active() {
        let store = MemoryRunStore::new();
        let target_id = TargetId::new();
        let first = Run::new(target_id, RunTrigger::Scheduled, RunConfig::default());
        store.create_run(first).await.unwrap();

        let second = Run::new(target_id, RunTrigger::Scheduled, RunConfig::default());
        let result = store.create_run(second).await;
        assert!(matches!(result, Err(StoreError::ActiveRunExists(_))));
    }

    #[tokio::test]
    async fn memory_schedule_store_skips_target_with_active_pipeline() {
        let store = MemoryScheduleStore::new();
        let target_id = TargetId::new();
        let schedule = Schedule::new(target_id, 10, RunConfig::default());
        store.create_schedule(schedule).await.unwrap();
        store.set_active_pipeline(target_id, true);

        let fired = store.tick_due_schedules(Utc::now()).await.unwrap();
        assert!(fired.is_empty());
    }
}

//! SurrealDB-backed implementation of every store trait.
//!
//! Tables are `SCHEMALESS` and rows are the domain structs themselves
//! (already `Serialize`/`Deserialize`), so there is no separate DB-row
//! shadow type — `CONTENT $row` persists the domain value directly and
//! `SELECT *` deserializes straight back into it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info, instrument, warn};

use reconwatch_core::domain::{
    Asset, AssetId, AssetType, Edge, EdgeId, EdgeRelType, Finding, FindingId, Job, JobId,
    JobStatus, Proto, Run, RunEvent, RunId, RunStatus, Scan, ScanId, ScanStatus, Schedule,
    ScheduleId, Service, ServiceId, Target, TargetId,
};
use reconwatch_core::ArtifactStatus;

use crate::error::{ConnectionError, ConnResult, StoreError, StoreResult};
use crate::migrations;
use crate::traits::*;

pub struct SurrealStore {
    db: Surreal<Any>,
}

impl SurrealStore {
    /// Connect to an in-memory instance, for tests.
    pub async fn in_memory() -> ConnResult<Self> {
        let db = surrealdb::engine::any::connect("mem://")
            .await
            .map_err(|e| ConnectionError::Connection(e.to_string()))?;
        db.use_ns("reconwatch")
            .use_db("main")
            .await
            .map_err(|e| ConnectionError::Connection(e.to_string()))?;
        migrations::init_schema(&db).await?;
        info!("SurrealStore connected (in-memory)");
        Ok(Self { db })
    }

    /// Connect using `DATABASE_URL` (any SurrealDB engine endpoint,
    /// e.g. `mem://`, `surrealkv://path`, `wss://host`), falling back to a
    /// local `surrealkv://` directory under `.reconwatch/db`.
    pub async fn from_env() -> ConnResult<Self> {
        let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            let path = ".reconwatch/db";
            std::fs::create_dir_all(path).ok();
            format!("surrealkv://{path}")
        });

        let db = surrealdb::engine::any::connect(&url)
            .await
            .map_err(|e| ConnectionError::Connection(format!("connect to {url}: {e}")))?;
        db.use_ns("reconwatch")
            .use_db("main")
            .await
            .map_err(|e| ConnectionError::Connection(e.to_string()))?;
        migrations::init_schema(&db).await?;
        info!("SurrealStore connected ({})", url);
        Ok(Self { db })
    }

    async fn fetch_job(&self, job_id: JobId) -> StoreResult<Job> {
        let mut res = self
            .db
            .query("SELECT * FROM jobs WHERE id = $id")
            .bind(("id", job_id.to_string()))
            .await?;
        let rows: Vec<Job> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))
    }

    async fn fetch_run(&self, run_id: RunId) -> StoreResult<Run> {
        let mut res = self
            .db
            .query("SELECT * FROM runs WHERE id = $id")
            .bind(("id", run_id.to_string()))
            .await?;
        let rows: Vec<Run> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))
    }

    async fn fetch_asset(&self, asset_id: AssetId) -> StoreResult<Asset> {
        let mut res = self
            .db
            .query("SELECT * FROM assets WHERE id = $id")
            .bind(("id", asset_id.to_string()))
            .await?;
        let rows: Vec<Asset> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::AssetNotFound(asset_id.to_string()))
    }

    async fn fetch_service(&self, service_id: ServiceId) -> StoreResult<Service> {
        let mut res = self
            .db
            .query("SELECT * FROM services WHERE id = $id")
            .bind(("id", service_id.to_string()))
            .await?;
        let rows: Vec<Service> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::ServiceNotFound(service_id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// TargetStore
// ---------------------------------------------------------------------------

#[async_trait]
impl TargetStore for SurrealStore {
    #[instrument(skip(self, target))]
    async fn create_target(&self, target: Target) -> StoreResult<Target> {
        let _created: Option<Target> = self.db.create("targets").content(target.clone()).await?;
        Ok(target)
    }

    async fn get_target(&self, target_id: TargetId) -> StoreResult<Target> {
        let mut res = self
            .db
            .query("SELECT * FROM targets WHERE id = $id")
            .bind(("id", target_id.to_string()))
            .await?;
        let rows: Vec<Target> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::TargetNotFound(target_id.to_string()))
    }

    async fn list_targets(&self) -> StoreResult<Vec<Target>> {
        let mut res = self.db.query("SELECT * FROM targets").await?;
        Ok(res.take(0)?)
    }
}

// ---------------------------------------------------------------------------
// InventoryStore
// ---------------------------------------------------------------------------

#[async_trait]
impl InventoryStore for SurrealStore {
    #[instrument(skip(self))]
    async fn upsert_asset_seen(
        &self,
        target_id: TargetId,
        run_id: RunId,
        asset_type: AssetType,
        raw_value: &str,
        normalized_value: &str,
    ) -> StoreResult<Asset> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM assets WHERE target_id = $tid AND asset_type = $ty AND normalized_value = $nv",
            )
            .bind(("tid", target_id.to_string()))
            .bind(("ty", serde_json::to_value(asset_type)?))
            .bind(("nv", normalized_value.to_string()))
            .await?;
        let existing: Vec<Asset> = res.take(0)?;

        if let Some(mut asset) = existing.into_iter().next() {
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
            self.db
                .query("UPDATE assets CONTENT $row WHERE id = $id")
                .bind(("row", asset.clone()))
                .bind(("id", asset.id.to_string()))
                .await?;
            Ok(asset)
        } else {
            let asset = Asset::first_seen(target_id, asset_type, raw_value, normalized_value, run_id);
            let _created: Option<Asset> = self.db.create("assets").content(asset.clone()).await?;
            Ok(asset)
        }
    }

    #[instrument(skip(self, fingerprint))]
    async fn upsert_service_seen(
        &self,
        target_id: TargetId,
        run_id: RunId,
        asset_id: AssetId,
        port: u16,
        proto: Proto,
        fingerprint: ServiceFingerprint,
    ) -> StoreResult<Service> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM services WHERE target_id = $tid AND asset_id = $aid AND port = $port AND proto = $proto",
            )
            .bind(("tid", target_id.to_string()))
            .bind(("aid", asset_id.to_string()))
            .bind(("port", port as i64))
            .bind(("proto", serde_json::to_value(proto)?))
            .await?;
        let existing: Vec<Service> = res.take(0)?;

        if let Some(mut svc) = existing.into_iter().next() {
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
            self.db
                .query("UPDATE services CONTENT $row WHERE id = $id")
                .bind(("row", svc.clone()))
                .bind(("id", svc.id.to_string()))
                .await?;
            Ok(svc)
        } else {
            let mut svc = Service::first_seen(target_id, asset_id, port, proto, run_id);
            svc.name = fingerprint.name;
            svc.product = fingerprint.product;
            svc.version = fingerprint.version;
            let _created: Option<Service> = self.db.create("services").content(svc.clone()).await?;
            Ok(svc)
        }
    }

    #[instrument(skip(self))]
    async fn upsert_edge_seen(
        &self,
        target_id: TargetId,
        run_id: RunId,
        from_asset_id: AssetId,
        to_asset_id: AssetId,
        rel_type: EdgeRelType,
    ) -> StoreResult<Edge> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM edges WHERE from_asset_id = $from AND to_asset_id = $to AND rel_type = $rt",
            )
            .bind(("from", from_asset_id.to_string()))
            .bind(("to", to_asset_id.to_string()))
            .bind(("rt", serde_json::to_value(rel_type)?))
            .await?;
        let existing: Vec<Edge> = res.take(0)?;

        if let Some(mut edge) = existing.into_iter().next() {
            edge.last_seen_run_id = run_id;
            edge.last_seen_at = Utc::now();
            self.db
                .query("UPDATE edges CONTENT $row WHERE id = $id")
                .bind(("row", edge.clone()))
                .bind(("id", edge.id.to_string()))
                .await?;
            Ok(edge)
        } else {
            let edge = Edge::first_seen(target_id, from_asset_id, to_asset_id, rel_type, run_id);
            let _created: Option<Edge> = self.db.create("edges").content(edge.clone()).await?;
            Ok(edge)
        }
    }

    async fn get_asset(&self, asset_id: AssetId) -> StoreResult<Asset> {
        self.fetch_asset(asset_id).await
    }

    async fn list_assets(&self, target_id: TargetId) -> StoreResult<Vec<Asset>> {
        let mut res = self
            .db
            .query("SELECT * FROM assets WHERE target_id = $tid")
            .bind(("tid", target_id.to_string()))
            .await?;
        Ok(res.take(0)?)
    }

    async fn list_assets_by_type(
        &self,
        target_id: TargetId,
        asset_type: AssetType,
    ) -> StoreResult<Vec<Asset>> {
        let mut res = self
            .db
            .query("SELECT * FROM assets WHERE target_id = $tid AND asset_type = $ty")
            .bind(("tid", target_id.to_string()))
            .bind(("ty", serde_json::to_value(asset_type)?))
            .await?;
        Ok(res.take(0)?)
    }

    async fn list_services(&self, target_id: TargetId) -> StoreResult<Vec<Service>> {
        let mut res = self
            .db
            .query("SELECT * FROM services WHERE target_id = $tid")
            .bind(("tid", target_id.to_string()))
            .await?;
        Ok(res.take(0)?)
    }

    async fn list_services_for_asset(&self, asset_id: AssetId) -> StoreResult<Vec<Service>> {
        let mut res = self
            .db
            .query("SELECT * FROM services WHERE asset_id = $aid")
            .bind(("aid", asset_id.to_string()))
            .await?;
        Ok(res.take(0)?)
    }

    async fn list_edges(&self, target_id: TargetId) -> StoreResult<Vec<Edge>> {
        let mut res = self
            .db
            .query("SELECT * FROM edges WHERE target_id = $tid")
            .bind(("tid", target_id.to_string()))
            .await?;
        Ok(res.take(0)?)
    }

    async fn set_asset_status(
        &self,
        asset_id: AssetId,
        status: ArtifactStatus,
        reason: Option<String>,
        mark_verified: bool,
    ) -> StoreResult<Asset> {
        let mut asset = self.fetch_asset(asset_id).await?;
        asset.status = status;
        asset.status_reason = reason;
        if mark_verified {
            asset.verified_at = Some(Utc::now());
        }
        self.db
            .query("UPDATE assets CONTENT $row WHERE id = $id")
            .bind(("row", asset.clone()))
            .bind(("id", asset.id.to_string()))
            .await?;
        Ok(asset)
    }

    async fn set_service_status(
        &self,
        service_id: ServiceId,
        status: ArtifactStatus,
        reason: Option<String>,
        mark_verified: bool,
    ) -> StoreResult<Service> {
        let mut svc = self.fetch_service(service_id).await?;
        svc.status = status;
        svc.status_reason = reason;
        if mark_verified {
            svc.verified_at = Some(Utc::now());
        }
        self.db
            .query("UPDATE services CONTENT $row WHERE id = $id")
            .bind(("row", svc.clone()))
            .bind(("id", svc.id.to_string()))
            .await?;
        Ok(svc)
    }

    async fn assets_candidate_stale(
        &self,
        target_id: TargetId,
        run_id: RunId,
        observed_types: &[AssetType],
    ) -> StoreResult<Vec<Asset>> {
        let types: Vec<serde_json::Value> = observed_types
            .iter()
            .map(|t| serde_json::to_value(t).unwrap())
            .collect();
        let mut res = self
            .db
            .query(
                "SELECT * FROM assets WHERE target_id = $tid AND last_seen_run_id != $rid \
                 AND status = 'active' AND asset_type IN $types",
            )
            .bind(("tid", target_id.to_string()))
            .bind(("rid", run_id.to_string()))
            .bind(("types", types))
            .await?;
        Ok(res.take(0)?)
    }

    async fn services_candidate_stale(
        &self,
        target_id: TargetId,
        run_id: RunId,
    ) -> StoreResult<Vec<Service>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM services WHERE target_id = $tid AND last_seen_run_id != $rid AND status = 'active'",
            )
            .bind(("tid", target_id.to_string()))
            .bind(("rid", run_id.to_string()))
            .await?;
        Ok(res.take(0)?)
    }

    async fn assets_first_seen_in_run(
        &self,
        target_id: TargetId,
        run_id: RunId,
    ) -> StoreResult<Vec<Asset>> {
        let mut res = self
            .db
            .query("SELECT * FROM assets WHERE target_id = $tid AND first_seen_run_id = $rid")
            .bind(("tid", target_id.to_string()))
            .bind(("rid", run_id.to_string()))
            .await?;
        Ok(res.take(0)?)
    }

    async fn services_first_seen_in_run(
        &self,
        target_id: TargetId,
        run_id: RunId,
    ) -> StoreResult<Vec<Service>> {
        let mut res = self
            .db
            .query("SELECT * FROM services WHERE target_id = $tid AND first_seen_run_id = $rid")
            .bind(("tid", target_id.to_string()))
            .bind(("rid", run_id.to_string()))
            .await?;
        Ok(res.take(0)?)
    }
}

// ---------------------------------------------------------------------------
// JobQueue
// ---------------------------------------------------------------------------

#[async_trait]
impl JobQueue for SurrealStore {
    #[instrument(skip(self, new_job))]
    async fn enqueue(&self, new_job: NewJob) -> StoreResult<Job> {
        let mut job = Job::new(
            new_job.target_id,
            new_job.run_id,
            new_job.job_type,
            new_job.payload,
            new_job.priority,
        );
        job.available_at = new_job.available_at;
        job.max_attempts = new_job.max_attempts;
        let _created: Option<Job> = self.db.create("jobs").content(job.clone()).await?;
        Ok(job)
    }

    /// See `DESIGN.md` for why this is a select-N-candidates-then-conditional-
    /// update loop rather than a single `SELECT ... FOR UPDATE SKIP LOCKED`:
    /// SurrealDB has no such clause. The final per-row `UPDATE ... WHERE
    /// id = $id AND status = 'queued'` is what SurrealDB actually executes
    /// atomically, so only one concurrent caller ever flips a given row.
    #[instrument(skip(self))]
    async fn lease_next(
        &self,
        worker_id: &str,
        lease_seconds: u64,
        max_concurrent_global: u32,
        max_concurrent_per_target: u32,
    ) -> StoreResult<Option<Job>> {
        let now = Utc::now();

        let global_running = self.count_running(None).await?;
        if global_running >= max_concurrent_global {
            return Ok(None);
        }

        let mut res = self
            .db
            .query(
                "SELECT * FROM jobs WHERE status = 'queued' AND available_at <= $now \
                 ORDER BY priority DESC, available_at ASC LIMIT 20",
            )
            .bind(("now", now))
            .await?;
        let candidates: Vec<Job> = res.take(0)?;

        for candidate in candidates {
            let per_target_running = self.count_running(Some(candidate.target_id)).await?;
            if per_target_running >= max_concurrent_per_target {
                continue;
            }

            let lease_expires_at = now + chrono::Duration::seconds(lease_seconds as i64);
            let mut res = self
                .db
                .query(
                    "UPDATE jobs SET status = 'running', lease_owner = $worker, \
                     lease_expires_at = $exp, attempts = attempts + 1 \
                     WHERE id = $id AND status = 'queued' RETURN AFTER",
                )
                .bind(("worker", worker_id.to_string()))
                .bind(("exp", lease_expires_at))
                .bind(("id", candidate.id.to_string()))
                .await?;
            let updated: Vec<Job> = res.take(0)?;
            if let Some(job) = updated.into_iter().next() {
                debug!(job_id = %job.id, worker_id, "leased job");
                return Ok(Some(job));
            }
            // Lost the race on this row; try the next candidate.
        }

        Ok(None)
    }

    async fn heartbeat(&self, job_id: JobId, worker_id: &str, lease_seconds: u64) -> StoreResult<()> {
        let job = self.fetch_job(job_id).await?;
        if job.status != JobStatus::Running || job.lease_owner.as_deref() != Some(worker_id) {
            return Err(StoreError::InvalidJobState {
                job_id: job_id.to_string(),
                status: format!("{:?}", job.status),
            });
        }
        let new_expiry = Utc::now() + chrono::Duration::seconds(lease_seconds as i64);
        self.db
            .query("UPDATE jobs SET lease_expires_at = $exp WHERE id = $id")
            .bind(("exp", new_expiry))
            .bind(("id", job_id.to_string()))
            .await?;
        Ok(())
    }

    async fn complete(&self, job_id: JobId, worker_id: &str) -> StoreResult<Job> {
        let mut job = self.fetch_job(job_id).await?;
        if job.lease_owner.as_deref() != Some(worker_id) {
            return Err(StoreError::InvalidJobState {
                job_id: job_id.to_string(),
                status: format!("{:?}", job.status),
            });
        }
        job.status = JobStatus::Completed;
        job.lease_owner = None;
        job.lease_expires_at = None;
        self.db
            .query("UPDATE jobs CONTENT $row WHERE id = $id")
            .bind(("row", job.clone()))
            .bind(("id", job.id.to_string()))
            .await?;
        Ok(job)
    }

    async fn fail(
        &self,
        job_id: JobId,
        worker_id: &str,
        reason: &str,
        base_backoff_seconds: u64,
    ) -> StoreResult<Job> {
        let mut job = self.fetch_job(job_id).await?;
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

        self.db
            .query("UPDATE jobs CONTENT $row WHERE id = $id")
            .bind(("row", job.clone()))
            .bind(("id", job.id.to_string()))
            .await?;
        Ok(job)
    }

    async fn fail_terminal(&self, job_id: JobId, worker_id: &str, reason: &str) -> StoreResult<Job> {
        let mut job = self.fetch_job(job_id).await?;
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
        self.db
            .query("UPDATE jobs CONTENT $row WHERE id = $id")
            .bind(("row", job.clone()))
            .bind(("id", job.id.to_string()))
            .await?;
        Ok(job)
    }

    async fn cancel(&self, job_id: JobId) -> StoreResult<Job> {
        let mut job = self.fetch_job(job_id).await?;
        job.status = JobStatus::Cancelled;
        self.db
            .query("UPDATE jobs CONTENT $row WHERE id = $id")
            .bind(("row", job.clone()))
            .bind(("id", job.id.to_string()))
            .await?;
        Ok(job)
    }

    async fn request_cancel(&self, job_id: JobId) -> StoreResult<()> {
        self.db
            .query("UPDATE jobs SET cancel_requested = true WHERE id = $id")
            .bind(("id", job_id.to_string()))
            .await?;
        Ok(())
    }

    async fn reclaim_expired_leases(&self, now: DateTime<Utc>) -> StoreResult<Vec<Job>> {
        let mut res = self
            .db
            .query(
                "UPDATE jobs SET status = 'queued', lease_owner = NONE, lease_expires_at = NONE \
                 WHERE status = 'running' AND lease_expires_at < $now RETURN AFTER",
            )
            .bind(("now", now))
            .await?;
        let reclaimed: Vec<Job> = res.take(0)?;
        if !reclaimed.is_empty() {
            warn!(count = reclaimed.len(), "janitor reclaimed expired leases");
        }
        Ok(reclaimed)
    }

    async fn get(&self, job_id: JobId) -> StoreResult<Job> {
        self.fetch_job(job_id).await
    }

    async fn cancel_children(&self, run_id: RunId) -> StoreResult<(Vec<Job>, Vec<Job>)> {
        let mut res = self
            .db
            .query(
                "UPDATE jobs SET status = 'cancelled' \
                 WHERE run_id = $rid AND status = 'queued' RETURN AFTER",
            )
            .bind(("rid", run_id.to_string()))
            .await?;
        let cancelled: Vec<Job> = res.take(0)?;

        let mut res = self
            .db
            .query(
                "UPDATE jobs SET cancel_requested = true \
                 WHERE run_id = $rid AND status = 'running' RETURN AFTER",
            )
            .bind(("rid", run_id.to_string()))
            .await?;
        let signalled: Vec<Job> = res.take(0)?;

        Ok((cancelled, signalled))
    }

    async fn count_running(&self, target_id: Option<TargetId>) -> StoreResult<u32> {
        let mut res = match target_id {
            Some(tid) => {
                self.db
                    .query("SELECT count() FROM jobs WHERE status = 'running' AND target_id = $tid GROUP ALL")
                    .bind(("tid", tid.to_string()))
                    .await?
            }
            None => {
                self.db
                    .query("SELECT count() FROM jobs WHERE status = 'running' GROUP ALL")
                    .await?
            }
        };
        #[derive(serde::Deserialize)]
        struct Count {
            count: u32,
        }
        let rows: Vec<Count> = res.take(0)?;
        Ok(rows.into_iter().next().map(|c| c.count).unwrap_or(0))
    }

    async fn purge_completed_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut res = self
            .db
            .query(
                "DELETE jobs WHERE status IN ['completed', 'failed', 'cancelled'] \
                 AND available_at < $cutoff RETURN BEFORE",
            )
            .bind(("cutoff", cutoff))
            .await?;
        let deleted: Vec<Job> = res.take(0)?;
        Ok(deleted.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// RunStore
// ---------------------------------------------------------------------------

#[async_trait]
impl RunStore for SurrealStore {
    #[instrument(skip(self, run))]
    async fn create_run(&self, run: Run) -> StoreResult<Run> {
        if self.has_active_pipeline(run.target_id).await?
            && run.trigger == reconwatch_core::RunTrigger::Scheduled
        {
            return Err(StoreError::ActiveRunExists(run.target_id.to_string()));
        }
        let _created: Option<Run> = self.db.create("runs").content(run.clone()).await?;
        Ok(run)
    }

    async fn mark_running(&self, run_id: RunId) -> StoreResult<Run> {
        let mut run = self.fetch_run(run_id).await?;
        run.status = RunStatus::Running;
        run.started_at = Some(Utc::now());
        self.db
            .query("UPDATE runs CONTENT $row WHERE id = $id")
            .bind(("row", run.clone()))
            .bind(("id", run.id.to_string()))
            .await?;
        Ok(run)
    }

    async fn complete_run(&self, run_id: RunId) -> StoreResult<Run> {
        let mut run = self.fetch_run(run_id).await?;
        run.status = RunStatus::Completed;
        run.completed_at = Some(Utc::now());
        self.db
            .query("UPDATE runs CONTENT $row WHERE id = $id")
            .bind(("row", run.clone()))
            .bind(("id", run.id.to_string()))
            .await?;
        Ok(run)
    }

    async fn fail_run(&self, run_id: RunId, failure_summary: &str) -> StoreResult<Run> {
        let mut run = self.fetch_run(run_id).await?;
        run.status = RunStatus::Failed;
        run.completed_at = Some(Utc::now());
        run.failure_summary = Some(failure_summary.to_string());
        self.db
            .query("UPDATE runs CONTENT $row WHERE id = $id")
            .bind(("row", run.clone()))
            .bind(("id", run.id.to_string()))
            .await?;
        Ok(run)
    }

    async fn cancel_run(&self, run_id: RunId) -> StoreResult<Run> {
        let mut run = self.fetch_run(run_id).await?;
        run.status = RunStatus::Cancelled;
        run.completed_at = Some(Utc::now());
        self.db
            .query("UPDATE runs CONTENT $row WHERE id = $id")
            .bind(("row", run.clone()))
            .bind(("id", run.id.to_string()))
            .await?;
        Ok(run)
    }

    async fn discard_run(&self, run_id: RunId) -> StoreResult<Run> {
        let mut run = self.fetch_run(run_id).await?;
        run.status = RunStatus::Discarded;
        run.completed_at = Some(Utc::now());
        self.db
            .query("UPDATE runs CONTENT $row WHERE id = $id")
            .bind(("row", run.clone()))
            .bind(("id", run.id.to_string()))
            .await?;
        Ok(run)
    }

    async fn get_run(&self, run_id: RunId) -> StoreResult<Run> {
        self.fetch_run(run_id).await
    }

    async fn has_active_pipeline(&self, target_id: TargetId) -> StoreResult<bool> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM runs WHERE target_id = $tid AND status IN ['queued', 'running']",
            )
            .bind(("tid", target_id.to_string()))
            .await?;
        let rows: Vec<Run> = res.take(0)?;
        Ok(!rows.is_empty())
    }

    async fn list_runs(&self, target_id: TargetId) -> StoreResult<Vec<Run>> {
        let mut res = self
            .db
            .query("SELECT * FROM runs WHERE target_id = $tid")
            .bind(("tid", target_id.to_string()))
            .await?;
        Ok(res.take(0)?)
    }

    async fn purge_completed_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut res = self
            .db
            .query(
                "DELETE runs WHERE status IN ['completed', 'failed', 'cancelled', 'discarded'] \
                 AND completed_at < $cutoff RETURN BEFORE",
            )
            .bind(("cutoff", cutoff))
            .await?;
        let deleted: Vec<Run> = res.take(0)?;
        Ok(deleted.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// ScanStore
// ---------------------------------------------------------------------------

#[async_trait]
impl ScanStore for SurrealStore {
    async fn start_scan(&self, scan: Scan) -> StoreResult<Scan> {
        let _created: Option<Scan> = self.db.create("scans").content(scan.clone()).await?;
        Ok(scan)
    }

    async fn append_output(&self, scan_id: ScanId, chunk: &str, retain_bytes: usize) -> StoreResult<()> {
        let mut scan = self.get_scan(scan_id).await?;
        scan.raw_output.push_str(chunk);
        if scan.raw_output.len() > retain_bytes {
            let start = scan.raw_output.len() - retain_bytes;
            scan.raw_output = scan.raw_output[start..].to_string();
        }
        self.db
            .query("UPDATE scans CONTENT $row WHERE id = $id")
            .bind(("row", scan.clone()))
            .bind(("id", scan.id.to_string()))
            .await?;
        Ok(())
    }

    async fn complete_scan(&self, scan_id: ScanId) -> StoreResult<Scan> {
        let mut scan = self.get_scan(scan_id).await?;
        scan.status = ScanStatus::Completed;
        scan.completed_at = Some(Utc::now());
        self.db
            .query("UPDATE scans CONTENT $row WHERE id = $id")
            .bind(("row", scan.clone()))
            .bind(("id", scan.id.to_string()))
            .await?;
        Ok(scan)
    }

    async fn fail_scan(&self, scan_id: ScanId) -> StoreResult<Scan> {
        let mut scan = self.get_scan(scan_id).await?;
        scan.status = ScanStatus::Failed;
        scan.completed_at = Some(Utc::now());
        self.db
            .query("UPDATE scans CONTENT $row WHERE id = $id")
            .bind(("row", scan.clone()))
            .bind(("id", scan.id.to_string()))
            .await?;
        Ok(scan)
    }

    async fn get_scan(&self, scan_id: ScanId) -> StoreResult<Scan> {
        let mut res = self
            .db
            .query("SELECT * FROM scans WHERE id = $id")
            .bind(("id", scan_id.to_string()))
            .await?;
        let rows: Vec<Scan> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::ScanNotFound(scan_id.to_string()))
    }

    async fn purge_raw_output_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut res = self
            .db
            .query(
                "UPDATE scans SET raw_output = '' \
                 WHERE status != 'running' AND started_at < $cutoff AND raw_output != '' \
                 RETURN AFTER",
            )
            .bind(("cutoff", cutoff))
            .await?;
        let updated: Vec<Scan> = res.take(0)?;
        Ok(updated.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// FindingStore
// ---------------------------------------------------------------------------

#[async_trait]
impl FindingStore for SurrealStore {
    async fn record_finding(&self, finding: Finding) -> StoreResult<Finding> {
        let _created: Option<Finding> = self.db.create("findings").content(finding.clone()).await?;
        Ok(finding)
    }

    async fn get_finding(&self, finding_id: FindingId) -> StoreResult<Finding> {
        let mut res = self
            .db
            .query("SELECT * FROM findings WHERE id = $id")
            .bind(("id", finding_id.to_string()))
            .await?;
        let rows: Vec<Finding> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::RunNotFound(finding_id.to_string()))
    }

    async fn list_findings(&self, target_id: TargetId) -> StoreResult<Vec<Finding>> {
        let mut res = self
            .db
            .query("SELECT * FROM findings WHERE target_id = $tid")
            .bind(("tid", target_id.to_string()))
            .await?;
        Ok(res.take(0)?)
    }

    async fn list_findings_for_run(&self, run_id: RunId) -> StoreResult<Vec<Finding>> {
        let mut res = self
            .db
            .query("SELECT * FROM findings WHERE run_id = $rid")
            .bind(("rid", run_id.to_string()))
            .await?;
        Ok(res.take(0)?)
    }
}

// ---------------------------------------------------------------------------
// ScheduleStore
// ---------------------------------------------------------------------------

#[async_trait]
impl ScheduleStore for SurrealStore {
    async fn create_schedule(&self, schedule: Schedule) -> StoreResult<Schedule> {
        let _created: Option<Schedule> = self.db.create("schedules").content(schedule.clone()).await?;
        Ok(schedule)
    }

    async fn get_schedule(&self, schedule_id: ScheduleId) -> StoreResult<Schedule> {
        let mut res = self
            .db
            .query("SELECT * FROM schedules WHERE id = $id")
            .bind(("id", schedule_id.to_string()))
            .await?;
        let rows: Vec<Schedule> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::ScheduleNotFound(schedule_id.to_string()))
    }

    async fn list_schedules_for_target(&self, target_id: TargetId) -> StoreResult<Vec<Schedule>> {
        let mut res = self
            .db
            .query("SELECT * FROM schedules WHERE target_id = $tid")
            .bind(("tid", target_id.to_string()))
            .await?;
        Ok(res.take(0)?)
    }

    #[instrument(skip(self))]
    async fn tick_due_schedules(&self, now: DateTime<Utc>) -> StoreResult<Vec<DueSchedule>> {
        let mut res = self
            .db
            .query("SELECT * FROM schedules WHERE enabled = true AND next_run_at <= $now")
            .bind(("now", now))
            .await?;
        let due: Vec<Schedule> = res.take(0)?;

        let mut fired = Vec::new();
        for mut schedule in due {
            if self.has_active_pipeline(schedule.target_id).await? {
                continue;
            }
            schedule.advance(now);

            let mut res = self
                .db
                .query("UPDATE schedules CONTENT $row WHERE id = $id AND next_run_at <= $now RETURN AFTER")
                .bind(("row", schedule.clone()))
                .bind(("id", schedule.id.to_string()))
                .bind(("now", now))
                .await?;
            let updated: Vec<Schedule> = res.take(0)?;
            if updated.is_empty() {
                // Another tick already advanced this schedule; skip it.
                continue;
            }

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
// RunEventLedger
// ---------------------------------------------------------------------------

#[async_trait]
impl RunEventLedger for SurrealStore {
    async fn append_run_event(&self, event: RunEvent) -> StoreResult<()> {
        let _created: Option<RunEvent> = self.db.create("run_events").content(event).await?;
        Ok(())
    }

    async fn list_run_events(&self, run_id: RunId) -> StoreResult<Vec<RunEvent>> {
        let mut res = self
            .db
            .query("SELECT * FROM run_events WHERE run_id = $rid ORDER BY seq ASC")
            .bind(("rid", run_id.to_string()))
            .await?;
        Ok(res.take(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconwatch_core::domain::{JobType, RunConfig, RunTrigger};

    #[tokio::test]
    async fn enqueue_and_lease_roundtrip() {
        let store = SurrealStore::in_memory().await.unwrap();
        let target_id = TargetId::new();
        let job = store
            .enqueue(NewJob::now(target_id, None, JobType::Pipeline, serde_json::json!({}), 0))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Queued);

        let leased = store
            .lease_next("worker-1", 300, 5, 2)
            .await
            .unwrap()
            .expect("a job should be leasable");
        assert_eq!(leased.id, job.id);
        assert_eq!(leased.status, JobStatus::Running);
        assert!(leased.lease_invariant_holds());
    }

    #[tokio::test]
    async fn concurrent_leases_never_double_claim_same_row() {
        let store = std::sync::Arc::new(SurrealStore::in_memory().await.unwrap());
        let target_id = TargetId::new();
        store
            .enqueue(NewJob::now(target_id, None, JobType::Pipeline, serde_json::json!({}), 0))
            .await
            .unwrap();

        let s1 = store.clone();
        let s2 = store.clone();
        let (a, b) = tokio::join!(
            s1.lease_next("worker-a", 300, 5, 5),
            s2.lease_next("worker-b", 300, 5, 5)
        );
        let leased_count = [a.unwrap(), b.unwrap()]
            .into_iter()
            .filter(|r| r.is_some())
            .count();
        assert_eq!(leased_count, 1);
    }

    #[tokio::test]
    async fn per_target_cap_blocks_extra_lease() {
        let store = SurrealStore::in_memory().await.unwrap();
        let target_id = TargetId::new();
        for _ in 0..2 {
            store
                .enqueue(NewJob::now(
                    target_id,
                    None,
                    JobType::Scanner { name: "nmap".into() },
                    serde_json::json!({}),
                    0,
                ))
                .await
                .unwrap();
        }
        let first = store.lease_next("w1", 300, 5, 1).await.unwrap();
        assert!(first.is_some());
        let second = store.lease_next("w2", 300, 5, 1).await.unwrap();
        assert!(second.is_none(), "per-target cap of 1 should block a second lease");
    }

    #[tokio::test]
    async fn asset_upsert_is_idempotent() {
        let store = SurrealStore::in_memory().await.unwrap();
        let target_id = TargetId::new();
        let run_id = RunId::new();
        let a1 = store
            .upsert_asset_seen(target_id, run_id, AssetType::Host, "a.example.com", "a.example.com")
            .await
            .unwrap();
        let a2 = store
            .upsert_asset_seen(target_id, run_id, AssetType::Host, "a.example.com", "a.example.com")
            .await
            .unwrap();
        assert_eq!(a1.id, a2.id);
        assert_eq!(a1.first_seen_run_id, a2.first_seen_run_id);
    }

    #[tokio::test]
    async fn asset_revives_from_stale_on_reobservation() {
        let store = SurrealStore::in_memory().await.unwrap();
        let target_id = TargetId::new();
        let run1 = RunId::new();
        let asset = store
            .upsert_asset_seen(target_id, run1, AssetType::Host, "a.example.com", "a.example.com")
            .await
            .unwrap();
        store
            .set_asset_status(asset.id, ArtifactStatus::Stale, None, false)
            .await
            .unwrap();

        let run2 = RunId::new();
        let revived = store
            .upsert_asset_seen(target_id, run2, AssetType::Host, "a.example.com", "a.example.com")
            .await
            .unwrap();
        assert_eq!(revived.status, ArtifactStatus::Active);
        assert!(revived.verified_at.is_some());
    }

    #[tokio::test]
    async fn schedule_tick_respects_active_pipeline() {
        let store = SurrealStore::in_memory().await.unwrap();
        let target_id = TargetId::new();
        let schedule = Schedule::new(target_id, 10, RunConfig::default());
        store.create_schedule(schedule.clone()).await.unwrap();

        let run = Run::new(target_id, RunTrigger::Manual, RunConfig::default());
        store.create_run(run).await.unwrap();

        let fired = store.tick_due_schedules(Utc::now()).await.unwrap();
        assert!(fired.is_empty(), "a target with an active run must not fire its schedule");
    }
}

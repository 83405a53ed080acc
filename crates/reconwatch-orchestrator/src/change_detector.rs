//! Change Detector (C8): new/candidate-stale diff computation and the state
//! transitions it drives. Runs once, immediately after the pipeline's last
//! stage job completes, inside one logical step.

use std::sync::Arc;

use reconwatch_core::domain::{AssetType, RunEventKind, RunId, TargetId};
use reconwatch_core::ArtifactStatus;
use reconwatch_store::{NewJob, StoreResult};

use crate::context::OrchestratorContext;

/// Asset types the pipeline actively re-observes every run. A type not in
/// this list never becomes candidate-stale purely from pipeline silence.
pub const OBSERVED_ASSET_TYPES: [AssetType; 3] = [AssetType::Subdomain, AssetType::Ip, AssetType::Url];

#[derive(Debug, Clone, Default)]
pub struct ChangeSummary {
    pub new_assets: usize,
    pub new_services: usize,
    pub newly_stale_assets: usize,
    pub newly_stale_services: usize,
}

pub async fn run_change_detection(
    ctx: &Arc<OrchestratorContext>,
    target_id: TargetId,
    run_id: RunId,
) -> StoreResult<ChangeSummary> {
    let mut summary = ChangeSummary::default();

    let stale_assets = ctx
        .inventory
        .assets_candidate_stale(target_id, run_id, &OBSERVED_ASSET_TYPES)
        .await?;
    for asset in &stale_assets {
        ctx.inventory
            .set_asset_status(
                asset.id,
                ArtifactStatus::Stale,
                Some("not observed in latest run".to_string()),
                false,
            )
            .await?;
        ctx.events
            .publish(
                run_id,
                RunEventKind::AssetStateChanged {
                    asset_id: asset.id.to_string(),
                    from: "active".to_string(),
                    to: "stale".to_string(),
                },
            )
            .await;
        ctx.jobs
            .enqueue(NewJob::now(
                target_id,
                Some(run_id),
                reconwatch_core::domain::JobType::VerifyAsset,
                serde_json::json!({ "asset_id": asset.id.to_string() }),
                5,
            ))
            .await?;
        summary.newly_stale_assets += 1;
    }

    let stale_services = ctx.inventory.services_candidate_stale(target_id, run_id).await?;
    for service in &stale_services {
        ctx.inventory
            .set_service_status(
                service.id,
                ArtifactStatus::Stale,
                Some("not observed in latest run".to_string()),
                false,
            )
            .await?;
        ctx.events
            .publish(
                run_id,
                RunEventKind::AssetStateChanged {
                    asset_id: service.id.to_string(),
                    from: "active".to_string(),
                    to: "stale".to_string(),
                },
            )
            .await;
        ctx.jobs
            .enqueue(NewJob::now(
                target_id,
                Some(run_id),
                reconwatch_core::domain::JobType::VerifyService,
                serde_json::json!({ "service_id": service.id.to_string() }),
                5,
            ))
            .await?;
        summary.newly_stale_services += 1;
    }

    summary.new_assets = ctx
        .inventory
        .assets_first_seen_in_run(target_id, run_id)
        .await?
        .len();
    summary.new_services = ctx
        .inventory
        .services_first_seen_in_run(target_id, run_id)
        .await?
        .len();

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconwatch_core::domain::{AssetType, JobType, Proto};
    use reconwatch_events::EventBus;
    use reconwatch_store::fakes::{
        MemoryFindingStore, MemoryInventoryStore, MemoryJobQueue, MemoryRunEventLedger,
        MemoryRunStore, MemoryScanStore, MemoryTargetStore,
    };
    use reconwatch_core::EngineConfig;

    fn ctx() -> Arc<OrchestratorContext> {
        let ledger = Arc::new(MemoryRunEventLedger::new());
        Arc::new(OrchestratorContext {
            targets: Arc::new(MemoryTargetStore::new()),
            inventory: Arc::new(MemoryInventoryStore::new()),
            jobs: Arc::new(MemoryJobQueue::new()),
            runs: Arc::new(MemoryRunStore::new()),
            scans: Arc::new(MemoryScanStore::new()),
            findings: Arc::new(MemoryFindingStore::new()),
            events: Arc::new(EventBus::new(ledger)),
            config: EngineConfig::default(),
        })
    }

    #[tokio::test]
    async fn asset_missing_from_run_becomes_stale_and_spawns_verify_job() {
        let ctx = ctx();
        let target_id = TargetId::new();
        let run1 = RunId::new();
        let run2 = RunId::new();

        ctx.inventory
            .upsert_asset_seen(target_id, run1, AssetType::Subdomain, "b.example.com", "b.example.com")
            .await
            .unwrap();

        let summary = run_change_detection(&ctx, target_id, run2).await.unwrap();
        assert_eq!(summary.newly_stale_assets, 1);

        let assets = ctx.inventory.list_assets(target_id).await.unwrap();
        assert_eq!(assets[0].status, ArtifactStatus::Stale);

        let jobs_running = ctx.jobs.count_running(None).await.unwrap();
        assert_eq!(jobs_running, 0); // queued, not yet leased
    }

    #[tokio::test]
    async fn asset_seen_again_is_not_flagged_stale() {
        let ctx = ctx();
        let target_id = TargetId::new();
        let run1 = RunId::new();

        ctx.inventory
            .upsert_asset_seen(target_id, run1, AssetType::Subdomain, "a.example.com", "a.example.com")
            .await
            .unwrap();

        let summary = run_change_detection(&ctx, target_id, run1).await.unwrap();
        assert_eq!(summary.newly_stale_assets, 0);
        assert_eq!(summary.new_assets, 1);
    }

    #[tokio::test]
    async fn stale_service_enqueues_verify_service_job() {
        let ctx = ctx();
        let target_id = TargetId::new();
        let run1 = RunId::new();
        let run2 = RunId::new();

        let asset = ctx
            .inventory
            .upsert_asset_seen(target_id, run1, AssetType::Ip, "1.2.3.4", "1.2.3.4")
            .await
            .unwrap();
        ctx.inventory
            .upsert_service_seen(
                target_id,
                run1,
                asset.id,
                80,
                Proto::Tcp,
                Default::default(),
            )
            .await
            .unwrap();

        let summary = run_change_detection(&ctx, target_id, run2).await.unwrap();
        assert_eq!(summary.newly_stale_services, 1);

        let leased = ctx.jobs.lease_next("w1", 60, 10, 10).await.unwrap().unwrap();
        assert_eq!(leased.job_type, JobType::VerifyService);
    }
}

//! ReconWatch daemon
//!
//! Boots the store, then wires the three long-running subsystems around it:
//! the worker pool (executes leased jobs via the orchestrator's handlers),
//! the scheduler (enqueues pipeline runs for due schedules), and the
//! retention sweeper (purges aged operational data). All three run until a
//! shutdown signal arrives, then drain cooperatively.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, Level};

use reconwatch_core::EngineConfig;
use reconwatch_events::EventBus;
use reconwatch_orchestrator::{build_handler_registry, OrchestratorContext};
use reconwatch_queue::WorkerPool;
use reconwatch_retention::RetentionSweeper;
use reconwatch_scheduler::Scheduler;
use reconwatch_store::SurrealStore;

#[tokio::main]
async fn main() -> Result<()> {
    let json_logs = std::env::var("RECONWATCH_JSON_LOGS")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    reconwatch_core::init_tracing(json_logs, Level::INFO);

    let config = EngineConfig::from_env();
    info!(?config, "reconwatchd starting");

    let store = Arc::new(
        SurrealStore::from_env()
            .await
            .context("failed to connect to the ReconWatch database")?,
    );

    let events = Arc::new(EventBus::new(store.clone()));

    let ctx = Arc::new(OrchestratorContext {
        targets: store.clone(),
        inventory: store.clone(),
        jobs: store.clone(),
        runs: store.clone(),
        scans: store.clone(),
        findings: store.clone(),
        events: events.clone(),
        config: config.clone(),
    });

    let handlers = build_handler_registry(ctx.clone());
    let worker_pool = WorkerPool::new(store.clone(), events.clone(), handlers, config.clone());
    let worker_handles = worker_pool.spawn();

    let scheduler = Scheduler::new(
        store.clone(),
        store.clone(),
        store.clone(),
        events.clone(),
        config.clone(),
    );
    let scheduler_handle = scheduler.spawn();

    let retention = RetentionSweeper::new(store.clone(), store.clone(), store.clone(), config.clone());
    let retention_handle = retention.spawn();

    info!(
        worker_count = config.worker_count,
        "reconwatchd running, press Ctrl-C to shut down"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received, draining");

    worker_pool.request_shutdown();
    scheduler.request_shutdown();
    retention.request_shutdown();

    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = scheduler_handle.await;
    let _ = retention_handle.await;

    info!("reconwatchd stopped cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn main_has_the_expected_signature() {
        let _: fn() -> anyhow::Result<()> = super::main;
    }
}

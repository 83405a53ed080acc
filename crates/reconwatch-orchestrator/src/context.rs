//! Shared handle bundle every stage handler needs. One `Arc<OrchestratorContext>`
//! is built once at daemon startup and cloned into every registered handler.

use std::sync::Arc;

use reconwatch_core::EngineConfig;
use reconwatch_events::EventBus;
use reconwatch_store::{FindingStore, InventoryStore, JobQueue, RunStore, ScanStore, TargetStore};

pub struct OrchestratorContext {
    pub targets: Arc<dyn TargetStore>,
    pub inventory: Arc<dyn InventoryStore>,
    pub jobs: Arc<dyn JobQueue>,
    pub runs: Arc<dyn RunStore>,
    pub scans: Arc<dyn ScanStore>,
    pub findings: Arc<dyn FindingStore>,
    pub events: Arc<EventBus>,
    pub config: EngineConfig,
}

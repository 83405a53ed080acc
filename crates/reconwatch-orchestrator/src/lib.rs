//! ReconWatch Orchestrator
//!
//! The Pipeline Orchestrator (C7) and Change Detector (C8): stage handlers
//! that chain a recon run from `subfinder` through `nuclei`, plus the
//! verification jobs the change detector spawns for assets and services it
//! can no longer observe.

pub mod change_detector;
pub mod context;
pub mod handlers;
pub mod parsers;

pub use context::OrchestratorContext;

use std::collections::HashMap;
use std::sync::Arc;

use reconwatch_core::domain::JobType;
use reconwatch_queue::{dispatch_key, JobHandler};

use handlers::{
    DnsResolveHandler, HttpxHandler, NmapHandler, NucleiHandler, PipelineHandler, SubfinderHandler,
    VerifyAssetHandler, VerifyServiceHandler,
};

/// Builds the dispatch table the worker pool registers every stage and
/// verification handler under, keyed by `JobType::label()` (§9's registry
/// redesign note: adding a scanner is adding one row here).
pub fn build_handler_registry(ctx: Arc<OrchestratorContext>) -> HashMap<String, Arc<dyn JobHandler>> {
    let mut handlers: HashMap<String, Arc<dyn JobHandler>> = HashMap::new();

    handlers.insert(
        dispatch_key(&JobType::Pipeline),
        Arc::new(PipelineHandler { ctx: ctx.clone() }),
    );
    handlers.insert(
        dispatch_key(&JobType::Scanner { name: "subfinder".to_string() }),
        Arc::new(SubfinderHandler { ctx: ctx.clone() }),
    );
    handlers.insert(
        dispatch_key(&JobType::Scanner { name: "dns_resolve".to_string() }),
        Arc::new(DnsResolveHandler { ctx: ctx.clone() }),
    );
    handlers.insert(
        dispatch_key(&JobType::Scanner { name: "nmap".to_string() }),
        Arc::new(NmapHandler { ctx: ctx.clone() }),
    );
    handlers.insert(
        dispatch_key(&JobType::Scanner { name: "httpx".to_string() }),
        Arc::new(HttpxHandler { ctx: ctx.clone() }),
    );
    handlers.insert(
        dispatch_key(&JobType::Scanner { name: "nuclei".to_string() }),
        Arc::new(NucleiHandler { ctx: ctx.clone() }),
    );
    handlers.insert(
        dispatch_key(&JobType::VerifyAsset),
        Arc::new(VerifyAssetHandler { ctx: ctx.clone() }),
    );
    handlers.insert(
        dispatch_key(&JobType::VerifyService),
        Arc::new(VerifyServiceHandler { ctx }),
    );

    handlers
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconwatch_core::EngineConfig;
    use reconwatch_events::EventBus;
    use reconwatch_store::fakes::{
        MemoryFindingStore, MemoryInventoryStore, MemoryJobQueue, MemoryRunEventLedger,
        MemoryRunStore, MemoryScanStore, MemoryTargetStore,
    };

    fn test_ctx() -> Arc<OrchestratorContext> {
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

    #[test]
    fn registry_covers_every_dag_stage_and_verification_job() {
        let handlers = build_handler_registry(test_ctx());
        for key in [
            "pipeline",
            "scanner:subfinder",
            "scanner:dns_resolve",
            "scanner:nmap",
            "scanner:httpx",
            "scanner:nuclei",
            "verify_asset",
            "verify_service",
        ] {
            assert!(handlers.contains_key(key), "missing handler for {key}");
        }
        assert_eq!(handlers.len(), 8);
    }
}

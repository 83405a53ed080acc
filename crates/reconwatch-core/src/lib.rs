//! ReconWatch Core Library
//!
//! Domain model, normalization, and scope enforcement — the pure,
//! I/O-free foundation the storage, scanner, and orchestration crates
//! build on.

pub mod config;
pub mod domain;
pub mod error;
pub mod normalize;
pub mod scope;
pub mod telemetry;

pub use config::EngineConfig;
pub use error::{CoreError, CoreResult};
pub use telemetry::init_tracing;

pub use domain::{
    Asset, AssetId, AssetType, ArtifactStatus, Edge, EdgeId, EdgeRelType, Finding, FindingId, Job,
    JobId, JobStatus, JobType, Proto, Run, RunConfig, RunEvent, RunEventKind, RunId, RunStatus,
    RunTrigger, Scan, ScanId, ScanStatus, Schedule, ScheduleId, ScopePolicy, Service, ServiceId,
    Severity, Target, TargetId,
};

pub use normalize::{normalize_host, normalize_ip, normalize_service, normalize_url};
pub use scope::{evaluate_scope, ScopeVerdict};

//! The ReconWatch data model: targets, runs, jobs, scans, and the inventory
//! entities (assets/services/edges) with their shared lifecycle.

pub mod asset;
pub mod digest;
pub mod edge;
pub mod finding;
pub mod ids;
pub mod job;
pub mod run;
pub mod run_event;
pub mod scan;
pub mod schedule;
pub mod service;
pub mod target;

pub use asset::{Asset, AssetType, ArtifactStatus};
pub use edge::{Edge, EdgeRelType};
pub use finding::{Finding, Severity};
pub use ids::{AssetId, EdgeId, FindingId, JobId, RunId, ScanId, ScheduleId, ServiceId, TargetId};
pub use job::{Job, JobStatus, JobType};
pub use run::{Run, RunConfig, RunStatus, RunTrigger};
pub use run_event::{RunEvent, RunEventKind};
pub use scan::{Scan, ScanStatus};
pub use schedule::Schedule;
pub use service::{Proto, Service};
pub use target::{ScopePolicy, Target};

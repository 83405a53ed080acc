//! RunEvent: the append-only audit log of significant transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::RunId;

/// Taxonomy of the event bus (§4.11), also persisted as audit rows for
/// terminal transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunEventKind {
    RunStarted,
    RunCompleted,
    ScanStarted { scan_id: String, scanner_name: String },
    ScanLine { scan_id: String, line: String },
    ScanCompleted { scan_id: String },
    FindingDiscovered { finding_id: String },
    AssetStateChanged { asset_id: String, from: String, to: String },
    JobLeased { job_id: String, worker_id: String },
    ScopeDenied { target_string: String },
}

impl RunEventKind {
    pub fn label(&self) -> &'static str {
        match self {
            RunEventKind::RunStarted => "run_started",
            RunEventKind::RunCompleted => "run_completed",
            RunEventKind::ScanStarted { .. } => "scan_started",
            RunEventKind::ScanLine { .. } => "scan_line",
            RunEventKind::ScanCompleted { .. } => "scan_completed",
            RunEventKind::FindingDiscovered { .. } => "finding_discovered",
            RunEventKind::AssetStateChanged { .. } => "asset_state_changed",
            RunEventKind::JobLeased { .. } => "job_leased",
            RunEventKind::ScopeDenied { .. } => "scope_denied",
        }
    }

    /// Whether this event is significant enough to persist as an audit row
    /// (§4.11). `scan_line` is high-volume streaming output and `job_leased`
    /// is operational noise; neither is worth a durable row per occurrence.
    pub fn is_audited(&self) -> bool {
        !matches!(self, RunEventKind::ScanLine { .. } | RunEventKind::JobLeased { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: RunId,
    pub seq: u64,
    pub ts: DateTime<Utc>,
    pub kind: RunEventKind,
    pub payload: serde_json::Value,
}

impl RunEvent {
    pub fn new(run_id: RunId, seq: u64, kind: RunEventKind) -> Self {
        let payload = serde_json::to_value(&kind).unwrap_or(serde_json::Value::Null);
        Self {
            run_id,
            seq,
            ts: Utc::now(),
            kind,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_matches_taxonomy() {
        let e = RunEvent::new(RunId::new(), 1, RunEventKind::RunStarted);
        assert_eq!(e.kind.label(), "run_started");
    }
}

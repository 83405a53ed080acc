//! Scan entity: a record of one scanner execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{RunId, ScanId, TargetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn is_immutable(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: ScanId,
    pub run_id: RunId,
    pub target_id: TargetId,
    pub scanner_name: String,
    pub target_string: String,
    pub status: ScanStatus,
    /// Raw stdout+stderr, truncated to the retention cap and redacted.
    pub raw_output: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Scan {
    pub fn start(run_id: RunId, target_id: TargetId, scanner_name: impl Into<String>, target_string: impl Into<String>) -> Self {
        Self {
            id: ScanId::new(),
            run_id,
            target_id,
            scanner_name: scanner_name.into(),
            target_string: target_string.into(),
            status: ScanStatus::Running,
            raw_output: String::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

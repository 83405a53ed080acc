//! Finding entity: a vulnerability or misconfiguration surfaced by a scan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AssetId, FindingId, RunId, ScanId, ServiceId, TargetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: FindingId,
    pub target_id: TargetId,
    pub run_id: RunId,
    pub scan_id: ScanId,
    pub asset_id: Option<AssetId>,
    pub service_id: Option<ServiceId>,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub impact: Option<String>,
    pub remediation: Option<String>,
    pub cve: Option<String>,
    pub cvss: Option<f32>,
    pub discovered_at: DateTime<Utc>,
}

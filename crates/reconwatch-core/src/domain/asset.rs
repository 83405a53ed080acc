//! Asset entity and the lifecycle status shared by assets, services, and
//! edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AssetId, RunId, TargetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Subdomain,
    Host,
    Ip,
    Url,
}

/// Lifecycle status shared across Asset, Service, and Edge.
///
/// `active → stale → (unresolved | closed | active)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Active,
    Stale,
    Closed,
    Unresolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub target_id: TargetId,
    pub asset_type: AssetType,
    pub raw_value: String,
    pub normalized_value: String,
    pub status: ArtifactStatus,
    pub status_reason: Option<String>,
    pub first_seen_run_id: RunId,
    pub last_seen_run_id: RunId,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl Asset {
    pub fn first_seen(
        target_id: TargetId,
        asset_type: AssetType,
        raw_value: impl Into<String>,
        normalized_value: impl Into<String>,
        run_id: RunId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AssetId::new(),
            target_id,
            asset_type,
            raw_value: raw_value.into(),
            normalized_value: normalized_value.into(),
            status: ArtifactStatus::Active,
            status_reason: None,
            first_seen_run_id: run_id,
            last_seen_run_id: run_id,
            first_seen_at: now,
            last_seen_at: now,
            verified_at: None,
        }
    }

    /// §8 invariant: `first_seen_at ≤ last_seen_at`.
    pub fn provenance_invariant_holds(&self) -> bool {
        self.first_seen_at <= self.last_seen_at
    }
}

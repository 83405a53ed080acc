//! Edge entity: a directed relationship between two assets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AssetId, EdgeId, RunId, TargetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeRelType {
    ResolvesTo,
    Serves,
    RedirectsTo,
    Cname,
    Alias,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub target_id: TargetId,
    pub from_asset_id: AssetId,
    pub to_asset_id: AssetId,
    pub rel_type: EdgeRelType,
    pub first_seen_run_id: RunId,
    pub last_seen_run_id: RunId,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl Edge {
    pub fn first_seen(
        target_id: TargetId,
        from_asset_id: AssetId,
        to_asset_id: AssetId,
        rel_type: EdgeRelType,
        run_id: RunId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: EdgeId::new(),
            target_id,
            from_asset_id,
            to_asset_id,
            rel_type,
            first_seen_run_id: run_id,
            last_seen_run_id: run_id,
            first_seen_at: now,
            last_seen_at: now,
        }
    }
}

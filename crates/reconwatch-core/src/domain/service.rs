//! Service entity: a discovered port on an asset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::asset::ArtifactStatus;
use super::ids::{AssetId, RunId, ServiceId, TargetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proto {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub target_id: TargetId,
    pub asset_id: AssetId,
    pub port: u16,
    pub proto: Proto,
    pub name: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
    pub status: ArtifactStatus,
    pub status_reason: Option<String>,
    pub first_seen_run_id: RunId,
    pub last_seen_run_id: RunId,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl Service {
    pub fn first_seen(
        target_id: TargetId,
        asset_id: AssetId,
        port: u16,
        proto: Proto,
        run_id: RunId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ServiceId::new(),
            target_id,
            asset_id,
            port,
            proto,
            name: None,
            product: None,
            version: None,
            status: ArtifactStatus::Active,
            status_reason: None,
            first_seen_run_id: run_id,
            last_seen_run_id: run_id,
            first_seen_at: now,
            last_seen_at: now,
            verified_at: None,
        }
    }

    /// `http*`-prefixed names (or the conventional HTTP ports) mark a
    /// service as an httpx stage candidate.
    pub fn looks_like_http(&self) -> bool {
        matches!(self.port, 80 | 443 | 8080 | 8443)
            || self
                .name
                .as_deref()
                .map(|n| n.to_ascii_lowercase().starts_with("http"))
                .unwrap_or(false)
    }
}

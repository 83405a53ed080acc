//! Run entity: one end-to-end pipeline or verification execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{RunId, TargetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Manual,
    Scheduled,
    Verification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    Discarded,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled | RunStatus::Discarded
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, RunStatus::Queued | RunStatus::Running)
    }
}

/// Config snapshot taken at run creation, frozen for the run's lifetime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RunConfig {
    pub max_hosts: u32,
    pub max_http_targets: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_hosts: 50,
            max_http_targets: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub target_id: TargetId,
    pub trigger: RunTrigger,
    pub status: RunStatus,
    pub config: RunConfig,
    pub config_digest: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_summary: Option<String>,
}

impl Run {
    pub fn new(target_id: TargetId, trigger: RunTrigger, config: RunConfig) -> Self {
        let config_digest = crate::domain::digest::digest_json(&config);
        Self {
            id: RunId::new(),
            target_id,
            trigger,
            status: RunStatus::Queued,
            config,
            config_digest,
            started_at: None,
            completed_at: None,
            failure_summary: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_run_starts_queued_with_stable_config_digest() {
        let t = TargetId::new();
        let r1 = Run::new(t, RunTrigger::Manual, RunConfig::default());
        let r2 = Run::new(t, RunTrigger::Manual, RunConfig::default());
        assert_eq!(r1.status, RunStatus::Queued);
        assert_eq!(r1.config_digest, r2.config_digest);
    }

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Discarded.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Queued.is_active());
    }
}

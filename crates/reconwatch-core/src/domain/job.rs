//! Job entity: a unit of work in the durable queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{JobId, RunId, TargetId};

/// Job type. `Scanner` carries the scanner's name so the worker pool can
/// dispatch to the right handler without a second lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobType {
    Pipeline,
    Scanner { name: String },
    VerifyAsset,
    VerifyService,
}

impl JobType {
    pub fn label(&self) -> String {
        match self {
            JobType::Pipeline => "pipeline".to_string(),
            JobType::Scanner { name } => format!("scanner:{name}"),
            JobType::VerifyAsset => "verify_asset".to_string(),
            JobType::VerifyService => "verify_service".to_string(),
        }
    }

    /// Default lease duration per §4.5: pipeline jobs get 2h, everything
    /// else gets the configured default (300s).
    pub fn default_lease_seconds(&self, default_lease_seconds: u64) -> u64 {
        match self {
            JobType::Pipeline => 7200,
            _ => default_lease_seconds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub target_id: TargetId,
    pub run_id: Option<RunId>,
    pub job_type: JobType,
    pub status: JobStatus,
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub max_attempts: u32,
    pub priority: i32,
    pub available_at: DateTime<Utc>,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub cancel_requested: bool,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        target_id: TargetId,
        run_id: Option<RunId>,
        job_type: JobType,
        payload: serde_json::Value,
        priority: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            target_id,
            run_id,
            job_type,
            status: JobStatus::Queued,
            payload,
            attempts: 0,
            max_attempts: 3,
            priority,
            available_at: now,
            lease_owner: None,
            lease_expires_at: None,
            cancel_requested: false,
            last_error: None,
            created_at: now,
        }
    }

    /// Invariant from §8: `status=running ⇔ lease_owner ∧ lease_expires_at`.
    pub fn lease_invariant_holds(&self) -> bool {
        match self.status {
            JobStatus::Running => self.lease_owner.is_some() && self.lease_expires_at.is_some(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_has_no_lease_and_satisfies_invariant() {
        let j = Job::new(
            TargetId::new(),
            None,
            JobType::Pipeline,
            serde_json::json!({}),
            0,
        );
        assert_eq!(j.status, JobStatus::Queued);
        assert!(j.lease_invariant_holds());
    }

    #[test]
    fn scanner_label_includes_name() {
        let jt = JobType::Scanner {
            name: "nmap".to_string(),
        };
        assert_eq!(jt.label(), "scanner:nmap");
    }

    #[test]
    fn pipeline_gets_long_lease() {
        assert_eq!(JobType::Pipeline.default_lease_seconds(300), 7200);
        assert_eq!(JobType::VerifyAsset.default_lease_seconds(300), 300);
    }
}

//! Schedule entity: per-target recurring pipeline trigger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ScheduleId, TargetId};
use super::run::RunConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub target_id: TargetId,
    pub interval_seconds: u64,
    pub enabled: bool,
    pub pipeline_config: RunConfig,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl Schedule {
    pub fn new(target_id: TargetId, interval_seconds: u64, pipeline_config: RunConfig) -> Self {
        Self {
            id: ScheduleId::new(),
            target_id,
            interval_seconds,
            enabled: true,
            pipeline_config,
            next_run_at: Utc::now(),
            last_run_at: None,
        }
    }

    /// Advance `next_run_at` with drift correction (§4.10): missed ticks
    /// never stack, the schedule always steps forward from "now".
    pub fn advance(&mut self, now: DateTime<Utc>) {
        let interval = chrono::Duration::seconds(self.interval_seconds as i64);
        let naive_next = self.next_run_at + interval;
        let floor = now + interval;
        self.next_run_at = naive_next.max(floor);
        self.last_run_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn advance_does_not_stack_missed_ticks() {
        let mut s = Schedule::new(TargetId::new(), 10, RunConfig::default());
        let far_future_now = s.next_run_at + Duration::seconds(1000);
        s.advance(far_future_now);
        assert_eq!(s.next_run_at, far_future_now + Duration::seconds(10));
    }

    #[test]
    fn advance_steps_by_interval_on_time() {
        let mut s = Schedule::new(TargetId::new(), 10, RunConfig::default());
        let original_next = s.next_run_at;
        s.advance(original_next - Duration::seconds(1));
        assert_eq!(s.next_run_at, original_next + Duration::seconds(10));
    }
}

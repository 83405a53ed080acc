//! Environment-driven engine configuration.
//!
//! Every knob has a documented default and can be overridden by an
//! environment variable, following the same `from_env` convention the
//! storage layer uses for its own connection settings.

use std::time::Duration;

/// Process-wide tunables for the queue, scheduler, and retention sweeper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_concurrent_jobs_global: u32,
    pub max_concurrent_jobs_per_target: u32,
    pub worker_count: u32,
    pub retention_raw_output_days: u32,
    pub retention_completed_runs_days: u32,
    pub lease_duration_seconds: u64,
    pub pipeline_lease_duration_seconds: u64,
    pub scheduler_tick_seconds: u64,
    pub run_deadline_seconds: u64,
    pub scanner_timeout_seconds: u64,
    pub database_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs_global: 5,
            max_concurrent_jobs_per_target: 2,
            worker_count: 4,
            retention_raw_output_days: 30,
            retention_completed_runs_days: 90,
            lease_duration_seconds: 300,
            pipeline_lease_duration_seconds: 2 * 3600,
            scheduler_tick_seconds: 10,
            run_deadline_seconds: 4 * 3600,
            scanner_timeout_seconds: 120,
            database_url: "mem://".to_string(),
        }
    }
}

impl EngineConfig {
    /// Build a config from environment variables, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs_global: env_u32(
                "MAX_CONCURRENT_JOBS_GLOBAL",
                defaults.max_concurrent_jobs_global,
            ),
            max_concurrent_jobs_per_target: env_u32(
                "MAX_CONCURRENT_JOBS_PER_TARGET",
                defaults.max_concurrent_jobs_per_target,
            ),
            worker_count: env_u32("WORKER_COUNT", defaults.worker_count),
            retention_raw_output_days: env_u32(
                "RETENTION_RAW_OUTPUT_DAYS",
                defaults.retention_raw_output_days,
            ),
            retention_completed_runs_days: env_u32(
                "RETENTION_COMPLETED_RUNS_DAYS",
                defaults.retention_completed_runs_days,
            ),
            lease_duration_seconds: env_u64(
                "LEASE_DURATION_SECONDS",
                defaults.lease_duration_seconds,
            ),
            pipeline_lease_duration_seconds: env_u64(
                "PIPELINE_LEASE_DURATION_SECONDS",
                defaults.pipeline_lease_duration_seconds,
            ),
            scheduler_tick_seconds: env_u64(
                "SCHEDULER_TICK_SECONDS",
                defaults.scheduler_tick_seconds,
            ),
            run_deadline_seconds: env_u64("RUN_DEADLINE_SECONDS", defaults.run_deadline_seconds),
            scanner_timeout_seconds: env_u64(
                "SCANNER_TIMEOUT_SECONDS",
                defaults.scanner_timeout_seconds,
            ),
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
        }
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_seconds)
    }

    pub fn pipeline_lease_duration(&self) -> Duration {
        Duration::from_secs(self.pipeline_lease_duration_seconds)
    }

    pub fn scheduler_tick(&self) -> Duration {
        Duration::from_secs(self.scheduler_tick_seconds)
    }

    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.run_deadline_seconds)
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_concurrent_jobs_global, 5);
        assert_eq!(cfg.max_concurrent_jobs_per_target, 2);
        assert_eq!(cfg.retention_raw_output_days, 30);
        assert_eq!(cfg.retention_completed_runs_days, 90);
        assert_eq!(cfg.lease_duration_seconds, 300);
        assert_eq!(cfg.scheduler_tick_seconds, 10);
    }

    #[test]
    fn from_env_falls_back_to_defaults_when_unset() {
        std::env::remove_var("MAX_CONCURRENT_JOBS_GLOBAL");
        let cfg = EngineConfig::from_env();
        assert_eq!(cfg.max_concurrent_jobs_global, 5);
    }
}

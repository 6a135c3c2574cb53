use std::{env, time::Duration};

use tablesync_core::autoscaling::{AutoscalingDefaults, DEFAULT_TARGET_UTILIZATION};
use tablesync_core::planning::{DiffOptions, PlannerConfig, DEFAULT_BILLING_MODE_COOLDOWN_SECS};

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Delay between two convergence polls in milliseconds (default: 2,000)
    pub poll_interval_ms: u64,
    /// Maximum wait for one execution unit in seconds (default: 120)
    pub convergence_timeout_secs: u64,
    /// Minimum interval between billing mode changes in seconds (default: 86,400)
    pub billing_mode_cooldown_secs: i64,
    /// Utilization percent for policies that do not set one (default: 70)
    pub target_utilization: u32,
    /// Compare autoscaled index capacity against the last applied value (default: false)
    pub suppress_index_capacity_drift: bool,
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `TABLESYNC_POLL_INTERVAL_MS` - Poll delay in milliseconds (default: 2,000)
    /// - `TABLESYNC_CONVERGENCE_TIMEOUT_SECS` - Per-unit timeout (default: 120)
    /// - `TABLESYNC_BILLING_MODE_COOLDOWN_SECS` - Billing mode cooldown (default: 86,400)
    /// - `TABLESYNC_TARGET_UTILIZATION` - Default policy utilization percent (default: 70)
    /// - `TABLESYNC_SUPPRESS_INDEX_CAPACITY_DRIFT` - `true` to enable (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            poll_interval_ms: parse_var(&lookup, "TABLESYNC_POLL_INTERVAL_MS").unwrap_or(2_000),
            convergence_timeout_secs: parse_var(&lookup, "TABLESYNC_CONVERGENCE_TIMEOUT_SECS")
                .unwrap_or(120),
            billing_mode_cooldown_secs: parse_var(&lookup, "TABLESYNC_BILLING_MODE_COOLDOWN_SECS")
                .unwrap_or(DEFAULT_BILLING_MODE_COOLDOWN_SECS),
            target_utilization: parse_var(&lookup, "TABLESYNC_TARGET_UTILIZATION")
                .unwrap_or(DEFAULT_TARGET_UTILIZATION),
            suppress_index_capacity_drift: parse_var(
                &lookup,
                "TABLESYNC_SUPPRESS_INDEX_CAPACITY_DRIFT",
            )
            .unwrap_or(false),
        }
    }

    /// Get the poll interval as a Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get the per-unit convergence timeout as a Duration.
    pub fn convergence_timeout(&self) -> Duration {
        Duration::from_secs(self.convergence_timeout_secs)
    }

    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            diff: DiffOptions {
                suppress_index_capacity_drift: self.suppress_index_capacity_drift,
            },
            autoscaling: AutoscalingDefaults {
                target_utilization_percent: self.target_utilization,
            },
            billing_mode_cooldown: chrono::Duration::seconds(self.billing_mode_cooldown_secs),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = EngineConfig::from_lookup(lookup(&[]));

        assert_eq!(config.poll_interval_ms, 2_000);
        assert_eq!(config.convergence_timeout_secs, 120);
        assert_eq!(config.billing_mode_cooldown_secs, 86_400);
        assert_eq!(config.target_utilization, 70);
        assert!(!config.suppress_index_capacity_drift);
    }

    #[test]
    fn test_values_from_variables() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("TABLESYNC_POLL_INTERVAL_MS", "250"),
            ("TABLESYNC_CONVERGENCE_TIMEOUT_SECS", "30"),
            ("TABLESYNC_BILLING_MODE_COOLDOWN_SECS", "3600"),
            ("TABLESYNC_TARGET_UTILIZATION", "55"),
            ("TABLESYNC_SUPPRESS_INDEX_CAPACITY_DRIFT", "true"),
        ]));

        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.convergence_timeout(), Duration::from_secs(30));
        let planner = config.planner_config();
        assert_eq!(planner.billing_mode_cooldown, chrono::Duration::hours(1));
        assert_eq!(planner.autoscaling.target_utilization_percent, 55);
        assert!(planner.diff.suppress_index_capacity_drift);
    }

    #[test]
    fn test_unparsable_values_fall_back_to_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("TABLESYNC_POLL_INTERVAL_MS", "fast"),
            ("TABLESYNC_SUPPRESS_INDEX_CAPACITY_DRIFT", "yes"),
        ]));

        assert_eq!(config.poll_interval_ms, 2_000);
        assert!(!config.suppress_index_capacity_drift);
    }
}

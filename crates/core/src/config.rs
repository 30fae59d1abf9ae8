//! Typed configuration surface (spec §6.5).
//!
//! This is a data shape, not a loader: reading from files/env/CLI flags is
//! process bootstrap, which spec §1 places out of scope. Callers construct
//! a `CoordinatorConfig` however suits their deployment and hand it to the
//! components below.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `broker.*` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BrokerConfig {
    pub url: String,
    pub publish_timeout_ms: u64,
    pub publish_max_retries: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "memory://local".to_string(),
            publish_timeout_ms: 5_000,
            publish_max_retries: 6,
        }
    }
}

/// `log.*` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LogConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub max_in_memory: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
            max_in_memory: 100_000,
        }
    }
}

/// `audit.fsync_policy` values.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsyncPolicy {
    Always,
    Batched,
    Never,
}

/// `audit.*` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AuditConfig {
    pub file_path: Option<String>,
    pub fsync_policy: FsyncPolicy,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            file_path: None,
            fsync_policy: FsyncPolicy::Batched,
        }
    }
}

/// `metrics.alert.*` keys.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricsAlertConfig {
    pub error_rate_threshold_pct: f64,
    pub active_sagas_threshold: u64,
}

impl Default for MetricsAlertConfig {
    fn default() -> Self {
        Self {
            error_rate_threshold_pct: 10.0,
            active_sagas_threshold: 10_000,
        }
    }
}

/// `coordinator.*` and `saga.timeouts.*` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CoordinatorConfig {
    pub workers: usize,
    pub idempotency_window: usize,
    /// Per-step timeout overrides, keyed by step name (`saga.timeouts.<step>_ms`).
    /// A step absent here uses its static `StepDefinition` default.
    pub step_timeout_overrides_ms: HashMap<String, u64>,
    pub broker: BrokerConfig,
    pub log: LogConfig,
    pub audit: AuditConfig,
    pub metrics_alert: MetricsAlertConfig,
    pub state_snapshot_path: Option<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            idempotency_window: 1000,
            step_timeout_overrides_ms: HashMap::new(),
            broker: BrokerConfig::default(),
            log: LogConfig::default(),
            audit: AuditConfig::default(),
            metrics_alert: MetricsAlertConfig::default(),
            state_snapshot_path: None,
        }
    }
}

impl CoordinatorConfig {
    /// Resolve the effective timeout for a step, honoring any configured
    /// override and otherwise falling back to the step's static default.
    pub fn step_timeout(&self, step_name: &str, default: Duration) -> Duration {
        self.step_timeout_overrides_ms
            .get(step_name)
            .map(|ms| Duration::from_millis(*ms))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_backoff_and_window_constants() {
        let cfg = CoordinatorConfig::default();
        assert_eq!(cfg.broker.publish_max_retries, 6);
        assert_eq!(cfg.idempotency_window, 1000);
        assert_eq!(cfg.log.max_in_memory, 100_000);
    }

    #[test]
    fn step_timeout_override_takes_precedence_over_default() {
        let mut cfg = CoordinatorConfig::default();
        cfg.step_timeout_overrides_ms
            .insert("document_verification".to_string(), 90_000);

        assert_eq!(
            cfg.step_timeout("document_verification", Duration::from_secs(60)),
            Duration::from_millis(90_000)
        );
        assert_eq!(
            cfg.step_timeout("contract_creation", Duration::from_secs(30)),
            Duration::from_secs(30)
        );
    }
}

//! Monitor configuration
//!
//! Every field has a default so a partial file or environment overlay
//! deserializes cleanly. The whole structure is also written into the
//! history backup record.

use crate::error::{MonitorError, MonitorResult};
use crate::models::ServiceTarget;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Longest accepted alert cooldown; dedupe entries are dropped after a day
pub const MAX_COOLDOWN_MINS: u64 = 24 * 60;

/// Longest accepted history retention
pub const MAX_RETENTION_DAYS: u64 = 3650;

/// Top-level monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Name reported in logs and alert texts
    pub instance_name: String,
    /// Port of the HTTP surface
    pub api_port: u16,
    pub targets: Vec<TargetConfig>,
    pub probe_interval_secs: u64,
    pub predictive_interval_secs: u64,
    pub prune_interval_secs: u64,
    pub backup_interval_secs: u64,
    pub history: HistoryConfig,
    pub anomaly: AnomalyConfig,
    pub prediction: PredictionConfig,
    pub alerts: AlertConfig,
    pub notification: NotificationConfig,
}

/// One configured health-check target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
    /// Overrides `alerts.alert_threshold` for this target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_threshold: Option<u32>,
    /// Overrides `alerts.recipients` for this target's service-down alerts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipients: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_size: usize,
    pub retention_days: u64,
    pub backup_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Number of historical values compared against
    pub window: usize,
    /// Minimum values per metric before it is evaluated
    pub min_samples: usize,
    /// Multiple of σ beyond which a value is anomalous
    pub std_dev_threshold: f64,
    /// Snapshots required before any detection runs
    pub warmup_snapshots: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub sample_window: usize,
    pub min_samples: usize,
    pub horizon_steps: usize,
    /// Predictions below this R² never alert
    pub min_confidence: f64,
    pub cpu_threshold: f64,
    pub memory_threshold: f64,
    pub disk_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Consecutive failures before a target goes critical
    pub alert_threshold: u32,
    pub recipients: Vec<String>,
    pub anomaly_cooldown_mins: u64,
    pub predictive_cooldown_mins: u64,
    pub service_down_cooldown_mins: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Messaging gateway endpoint; alerts are only logged when unset
    pub webhook_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "monitor".to_string())
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: 8080,
            targets: Vec::new(),
            probe_interval_secs: 60,
            predictive_interval_secs: 5 * 60,
            prune_interval_secs: 60 * 60,
            backup_interval_secs: 6 * 60 * 60,
            history: HistoryConfig::default(),
            anomaly: AnomalyConfig::default(),
            prediction: PredictionConfig::default(),
            alerts: AlertConfig::default(),
            notification: NotificationConfig::default(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            retention_days: 7,
            backup_path: PathBuf::from("data/monitor-history.json"),
        }
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            window: 50,
            min_samples: 5,
            std_dev_threshold: 2.0,
            warmup_snapshots: 10,
        }
    }
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            sample_window: 20,
            min_samples: 10,
            horizon_steps: 120,
            min_confidence: 0.5,
            cpu_threshold: 90.0,
            memory_threshold: 95.0,
            disk_threshold: 85.0,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            alert_threshold: 3,
            recipients: Vec::new(),
            anomaly_cooldown_mins: 30,
            predictive_cooldown_mins: 60,
            service_down_cooldown_mins: 15,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl HistoryConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(24 * 60 * 60))
    }
}

impl AlertConfig {
    /// Reject a cooldown longer than `MAX_COOLDOWN_MINS`
    pub fn check_cooldown(field: &str, mins: u64) -> MonitorResult<()> {
        if mins > MAX_COOLDOWN_MINS {
            return Err(MonitorError::config(format!(
                "{} must be at most {} minutes, got {}",
                field, MAX_COOLDOWN_MINS, mins
            )));
        }
        Ok(())
    }
}

impl TargetConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            timeout_secs: default_probe_timeout(),
            alert_threshold: None,
            recipients: None,
        }
    }

    /// Validate this entry into a probe target
    pub fn to_target(&self) -> MonitorResult<ServiceTarget> {
        let name = self.name.as_str();
        if name.trim().is_empty() {
            return Err(MonitorError::config(format!(
                "target with url '{}' has an empty name",
                self.url
            )));
        }
        // Lookups by name are exact, so the name must be used as written
        if name.trim() != name {
            return Err(MonitorError::config(format!(
                "target '{}': name has leading or trailing whitespace",
                name
            )));
        }

        let url = Url::parse(&self.url).map_err(|e| {
            MonitorError::config(format!("target '{}': invalid url '{}': {}", name, self.url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(MonitorError::config(format!(
                "target '{}': unsupported scheme '{}', expected http or https",
                name,
                url.scheme()
            )));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(MonitorError::config(format!(
                "target '{}': url '{}' has no host",
                name, self.url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(MonitorError::config(format!(
                "target '{}': timeout_secs must be greater than zero",
                name
            )));
        }
        if self.alert_threshold == Some(0) {
            return Err(MonitorError::config(format!(
                "target '{}': alert_threshold must be greater than zero",
                name
            )));
        }

        Ok(ServiceTarget {
            name: name.to_string(),
            url: url.to_string(),
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

impl MonitorConfig {
    /// Validate global settings that would make the agent unusable
    pub fn validate(&self) -> MonitorResult<()> {
        let intervals = [
            ("probe_interval_secs", self.probe_interval_secs),
            ("predictive_interval_secs", self.predictive_interval_secs),
            ("prune_interval_secs", self.prune_interval_secs),
            ("backup_interval_secs", self.backup_interval_secs),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(MonitorError::config(format!("{} must be greater than zero", field)));
            }
        }
        if self.history.max_size == 0 {
            return Err(MonitorError::config("history.max_size must be greater than zero"));
        }
        if self.history.retention_days > MAX_RETENTION_DAYS {
            return Err(MonitorError::config(format!(
                "history.retention_days must be at most {}",
                MAX_RETENTION_DAYS
            )));
        }
        if self.alerts.alert_threshold == 0 {
            return Err(MonitorError::config("alerts.alert_threshold must be greater than zero"));
        }
        AlertConfig::check_cooldown("alerts.anomaly_cooldown_mins", self.alerts.anomaly_cooldown_mins)?;
        AlertConfig::check_cooldown(
            "alerts.predictive_cooldown_mins",
            self.alerts.predictive_cooldown_mins,
        )?;
        AlertConfig::check_cooldown(
            "alerts.service_down_cooldown_mins",
            self.alerts.service_down_cooldown_mins,
        )?;
        if self.anomaly.std_dev_threshold <= 0.0 {
            return Err(MonitorError::config("anomaly.std_dev_threshold must be positive"));
        }
        if let Some(url) = &self.notification.webhook_url {
            Url::parse(url).map_err(|e| {
                MonitorError::config(format!("notification.webhook_url '{}': {}", url, e))
            })?;
        }
        Ok(())
    }

    /// Validate every target individually
    ///
    /// Valid targets are returned even when others are rejected; duplicate
    /// names keep the first occurrence.
    pub fn build_targets(&self) -> (Vec<ServiceTarget>, Vec<MonitorError>) {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        let mut errors = Vec::new();

        for entry in &self.targets {
            match entry.to_target() {
                Ok(target) if !seen.insert(target.name.clone()) => {
                    errors.push(MonitorError::config(format!(
                        "target '{}' is defined more than once",
                        target.name
                    )));
                }
                Ok(target) => targets.push(target),
                Err(e) => errors.push(e),
            }
        }

        (targets, errors)
    }

    pub fn target_config(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn target_config_mut(&mut self, name: &str) -> Option<&mut TargetConfig> {
        self.targets.iter_mut().find(|t| t.name == name)
    }
}

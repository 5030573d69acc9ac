//! Core data models for the service monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Outcome classification of a single health probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Target answered with a success status
    Healthy,
    /// Target answered, but not with a success status
    Unhealthy,
    /// Target timed out or could not be reached
    Error,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Healthy => "healthy",
            ServiceStatus::Unhealthy => "unhealthy",
            ServiceStatus::Error => "error",
        }
    }
}

/// Result of probing one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ServiceHealth {
    pub fn healthy(http_status: u16, response_time_ms: f64) -> Self {
        Self {
            status: ServiceStatus::Healthy,
            http_status: Some(http_status),
            response_time_ms: Some(response_time_ms),
            detail: None,
        }
    }

    pub fn unhealthy(http_status: u16, response_time_ms: f64) -> Self {
        Self {
            status: ServiceStatus::Unhealthy,
            http_status: Some(http_status),
            response_time_ms: Some(response_time_ms),
            detail: Some(format!("unexpected HTTP status {}", http_status)),
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            status: ServiceStatus::Error,
            http_status: None,
            response_time_ms: None,
            detail: Some(detail.into()),
        }
    }

    /// Whether this probe counts as a success for state tracking
    pub fn is_success(&self) -> bool {
        self.status == ServiceStatus::Healthy
    }
}

/// Host resource readings; a metric the host does not expose reads as 0
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_usage_pct: f64,
    pub memory_usage_pct: f64,
    pub disk_usage_pct: f64,
    pub load_average: f64,
}

/// One complete, timestamped set of measurements from a probe cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub timestamp: DateTime<Utc>,
    pub services: BTreeMap<String, ServiceHealth>,
    pub system: SystemMetrics,
}

impl MetricSnapshot {
    pub fn new(
        timestamp: DateTime<Utc>,
        services: BTreeMap<String, ServiceHealth>,
        system: SystemMetrics,
    ) -> Self {
        Self {
            timestamp,
            services,
            system,
        }
    }

    /// Extract the numeric value for a metric, if this snapshot carries it
    pub fn value(&self, key: &MetricKey) -> Option<f64> {
        match key {
            MetricKey::CpuUsage => Some(self.system.cpu_usage_pct),
            MetricKey::MemoryUsage => Some(self.system.memory_usage_pct),
            MetricKey::DiskUsage => Some(self.system.disk_usage_pct),
            MetricKey::LoadAverage => Some(self.system.load_average),
            MetricKey::ResponseTime(name) => {
                self.services.get(name).and_then(|s| s.response_time_ms)
            }
        }
    }

    /// All metric keys this snapshot carries a value for
    pub fn metric_keys(&self) -> Vec<MetricKey> {
        let mut keys = MetricKey::system_keys().to_vec();
        keys.extend(
            self.services
                .iter()
                .filter(|(_, health)| health.response_time_ms.is_some())
                .map(|(name, _)| MetricKey::ResponseTime(name.clone())),
        );
        keys
    }
}

/// Path of a numeric series inside a snapshot
///
/// Rendered as `system.cpu_usage_pct` or `services.<name>.response_time_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKey {
    CpuUsage,
    MemoryUsage,
    DiskUsage,
    LoadAverage,
    ResponseTime(String),
}

impl MetricKey {
    const SYSTEM: [MetricKey; 4] = [
        MetricKey::CpuUsage,
        MetricKey::MemoryUsage,
        MetricKey::DiskUsage,
        MetricKey::LoadAverage,
    ];

    pub fn system_keys() -> &'static [MetricKey] {
        &Self::SYSTEM
    }

    /// Percentage metrics are bounded to [0, 100]
    pub fn is_percentage(&self) -> bool {
        matches!(
            self,
            MetricKey::CpuUsage | MetricKey::MemoryUsage | MetricKey::DiskUsage
        )
    }

    /// Short human label used in alert texts
    pub fn label(&self) -> String {
        match self {
            MetricKey::CpuUsage => "CPU usage".to_string(),
            MetricKey::MemoryUsage => "Memory usage".to_string(),
            MetricKey::DiskUsage => "Disk usage".to_string(),
            MetricKey::LoadAverage => "Load average".to_string(),
            MetricKey::ResponseTime(name) => format!("{} response time", name),
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKey::CpuUsage => write!(f, "system.cpu_usage_pct"),
            MetricKey::MemoryUsage => write!(f, "system.memory_usage_pct"),
            MetricKey::DiskUsage => write!(f, "system.disk_usage_pct"),
            MetricKey::LoadAverage => write!(f, "system.load_average"),
            MetricKey::ResponseTime(name) => write!(f, "services.{}.response_time_ms", name),
        }
    }
}

impl FromStr for MetricKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system.cpu_usage_pct" => Ok(MetricKey::CpuUsage),
            "system.memory_usage_pct" => Ok(MetricKey::MemoryUsage),
            "system.disk_usage_pct" => Ok(MetricKey::DiskUsage),
            "system.load_average" => Ok(MetricKey::LoadAverage),
            other => other
                .strip_prefix("services.")
                .and_then(|rest| rest.strip_suffix(".response_time_ms"))
                .filter(|name| !name.is_empty())
                .map(|name| MetricKey::ResponseTime(name.to_string()))
                .ok_or_else(|| format!("unknown metric key: {}", other)),
        }
    }
}

impl Serialize for MetricKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MetricKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A validated health-check target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub name: String,
    pub url: String,
    pub timeout: Duration,
}

/// Rolling health label of a target, also used for the overall status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Critical,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "healthy"),
            HealthState::Degraded => write!(f, "degraded"),
            HealthState::Critical => write!(f, "critical"),
        }
    }
}

/// Severity of a detected anomaly, graded by z-score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Warning,
    High,
    Critical,
}

impl AnomalySeverity {
    pub fn from_z_score(z: f64) -> Self {
        let z = z.abs();
        if z >= 4.0 {
            AnomalySeverity::Critical
        } else if z >= 3.0 {
            AnomalySeverity::High
        } else {
            AnomalySeverity::Warning
        }
    }
}

impl fmt::Display for AnomalySeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalySeverity::Warning => write!(f, "warning"),
            AnomalySeverity::High => write!(f, "high"),
            AnomalySeverity::Critical => write!(f, "critical"),
        }
    }
}

/// A current value statistically inconsistent with its recent history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub metric_key: MetricKey,
    pub value: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub z_score: f64,
    pub severity: AnomalySeverity,
    pub description: String,
    pub detected_at: DateTime<Utc>,
}

/// Direction of a fitted trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
    InsufficientData,
}

/// Forward projection of a metric from a linear fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPrediction {
    pub metric_key: MetricKey,
    pub slope: f64,
    pub intercept: f64,
    pub projected_value: f64,
    /// R² of the fit, in [0, 1]
    pub confidence: f64,
    pub trend: Trend,
    pub horizon_steps: usize,
    pub samples: usize,
    pub sampled_at: DateTime<Utc>,
}

impl TrendPrediction {
    pub fn insufficient(metric_key: MetricKey, samples: usize, horizon_steps: usize) -> Self {
        Self {
            metric_key,
            slope: 0.0,
            intercept: 0.0,
            projected_value: 0.0,
            confidence: 0.0,
            trend: Trend::InsufficientData,
            horizon_steps,
            samples,
            sampled_at: Utc::now(),
        }
    }
}

/// What an alert is about, with the data that triggered it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum AlertKind {
    Anomaly(Anomaly),
    Predictive {
        prediction: TrendPrediction,
        threshold: f64,
    },
    ServiceDown {
        target: String,
        consecutive_failures: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_detail: Option<String>,
    },
}

impl AlertKind {
    /// Key under which identical alerts are deduplicated
    pub fn dedupe_key(&self) -> String {
        match self {
            AlertKind::Anomaly(anomaly) => format!("anomaly:{}", anomaly.metric_key),
            AlertKind::Predictive { prediction, .. } => {
                format!("predictive:{}", prediction.metric_key)
            }
            AlertKind::ServiceDown { target, .. } => format!("service_down:{}", target),
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            AlertKind::Anomaly(_) => "anomaly",
            AlertKind::Predictive { .. } => "predictive",
            AlertKind::ServiceDown { .. } => "service_down",
        }
    }
}

/// A dispatched (or attempted) notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub kind: AlertKind,
    pub dedupe_key: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// An externally sourced event folded into anomaly context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub source: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

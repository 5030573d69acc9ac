//! Read-only views served by the HTTP surface
//!
//! Every view is an owned copy taken under a short read lock, so readers
//! never hold the agent's state while a response is serialized.

use crate::config::AlertConfig;
use crate::health::{ComponentHealth, ComponentStatus};
use crate::history::HistoryStats;
use crate::models::{
    Alert, Anomaly, ExternalEvent, HealthState, MetricSnapshot, ServiceHealth, TrendPrediction,
};
use crate::tracker::{ServiceTargetState, TargetEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Liveness of the agent itself
#[derive(Debug, Clone, Serialize)]
pub struct AgentHealth {
    pub status: ComponentStatus,
    pub instance: String,
    pub version: &'static str,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub targets_tracked: usize,
    pub active_alerts: usize,
    pub history: HistoryStats,
    pub components: HashMap<String, ComponentHealth>,
}

/// One row of the dashboard
#[derive(Debug, Clone, Serialize)]
pub struct TargetStatus {
    pub url: String,
    #[serde(flatten)]
    pub state: ServiceTargetState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<ServiceHealth>,
}

/// Aggregate view of all targets
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub instance: String,
    pub overall_status: HealthState,
    pub targets: Vec<TargetStatus>,
    pub predictions: Vec<TrendPrediction>,
    pub active_alerts: Vec<Alert>,
    pub generated_at: DateTime<Utc>,
}

/// Latest measurements and analysis results
#[derive(Debug, Clone, Serialize)]
pub struct MetricsView {
    pub latest: Option<MetricSnapshot>,
    pub recent: Vec<MetricSnapshot>,
    pub predictions: Vec<TrendPrediction>,
    pub anomalies: Vec<Anomaly>,
    pub events: Vec<ExternalEvent>,
    /// Newest first, resolved alerts included
    pub recent_alerts: Vec<Alert>,
    pub history: HistoryStats,
}

/// Alert dispatched during a probe or predictive cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertOutcome {
    pub dedupe_key: String,
    pub outcome: &'static str,
}

/// What one probe cycle observed and did
#[derive(Debug, Clone, Serialize)]
pub struct ProbeCycleReport {
    pub snapshot: MetricSnapshot,
    pub anomalies: Vec<Anomaly>,
    pub target_events: Vec<TargetEvent>,
    pub alerts: Vec<AlertOutcome>,
    pub elapsed_ms: f64,
}

/// What one predictive cycle produced
#[derive(Debug, Clone, Serialize)]
pub struct PredictiveCycleReport {
    pub predictions: Vec<TrendPrediction>,
    pub alerts: Vec<AlertOutcome>,
}

/// Changes requested through `POST /alerts/configure`
///
/// With `target` set, `threshold` and `recipients` apply to that target
/// only; otherwise they replace the global defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettingsUpdate {
    pub target: Option<String>,
    pub threshold: Option<u32>,
    pub recipients: Option<Vec<String>>,
    pub anomaly_cooldown_mins: Option<u64>,
    pub predictive_cooldown_mins: Option<u64>,
    pub service_down_cooldown_mins: Option<u64>,
}

/// Effective alert routing of one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetAlertSettings {
    pub name: String,
    pub alert_threshold: u32,
    pub recipients: Vec<String>,
}

/// Effective alert configuration after an update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSettings {
    pub alerts: AlertConfig,
    pub targets: Vec<TargetAlertSettings>,
}

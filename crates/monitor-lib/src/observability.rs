//! Observability infrastructure for the monitor agent
//!
//! Provides:
//! - Prometheus metrics (cycle latency, probe results, alerts, scheduler runs)
//! - Structured JSON logging of agent events with tracing

use crate::models::{Alert, Anomaly, AnomalySeverity, HealthState, TrendPrediction};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for cycle latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

struct AgentMetricsInner {
    probe_cycle_seconds: Histogram,
    prediction_cycle_seconds: Histogram,
    probe_latency_seconds: Histogram,
    probe_results: IntCounterVec,
    target_state: IntGaugeVec,
    targets_monitored: IntGauge,
    history_entries: IntGauge,
    anomalies_detected: IntCounterVec,
    predictions_generated: IntCounter,
    alerts: IntCounterVec,
    task_skipped: IntCounterVec,
    task_failures: IntCounterVec,
    events_received: IntCounter,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            probe_cycle_seconds: register_histogram!(
                "service_monitor_probe_cycle_seconds",
                "Time spent on one probe cycle including analysis",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register probe_cycle_seconds"),

            prediction_cycle_seconds: register_histogram!(
                "service_monitor_prediction_cycle_seconds",
                "Time spent on one predictive analysis cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_cycle_seconds"),

            probe_latency_seconds: register_histogram!(
                "service_monitor_probe_latency_seconds",
                "Response time of successful target probes",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register probe_latency_seconds"),

            probe_results: register_int_counter_vec!(
                "service_monitor_probe_results_total",
                "Probe results by target and status",
                &["target", "status"]
            )
            .expect("Failed to register probe_results"),

            target_state: register_int_gauge_vec!(
                "service_monitor_target_state",
                "Current target state (0 healthy, 1 degraded, 2 critical)",
                &["target"]
            )
            .expect("Failed to register target_state"),

            targets_monitored: register_int_gauge!(
                "service_monitor_targets_monitored",
                "Number of targets currently being probed"
            )
            .expect("Failed to register targets_monitored"),

            history_entries: register_int_gauge!(
                "service_monitor_history_entries",
                "Number of snapshots in the history buffer"
            )
            .expect("Failed to register history_entries"),

            anomalies_detected: register_int_counter_vec!(
                "service_monitor_anomalies_detected_total",
                "Anomalies detected by severity",
                &["severity"]
            )
            .expect("Failed to register anomalies_detected"),

            predictions_generated: register_int_counter!(
                "service_monitor_predictions_generated_total",
                "Total number of trend predictions generated"
            )
            .expect("Failed to register predictions_generated"),

            alerts: register_int_counter_vec!(
                "service_monitor_alerts_total",
                "Alerts by kind and dispatch outcome",
                &["kind", "outcome"]
            )
            .expect("Failed to register alerts"),

            task_skipped: register_int_counter_vec!(
                "service_monitor_task_skipped_total",
                "Scheduled runs skipped because the previous run was still in progress",
                &["task"]
            )
            .expect("Failed to register task_skipped"),

            task_failures: register_int_counter_vec!(
                "service_monitor_task_failures_total",
                "Scheduled runs that returned an error or panicked",
                &["task"]
            )
            .expect("Failed to register task_failures"),

            events_received: register_int_counter!(
                "service_monitor_events_received_total",
                "External events accepted by the webhook endpoint"
            )
            .expect("Failed to register events_received"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new)
    }

    pub fn observe_probe_cycle(&self, duration_secs: f64) {
        self.inner().probe_cycle_seconds.observe(duration_secs);
    }

    pub fn observe_prediction_cycle(&self, duration_secs: f64) {
        self.inner().prediction_cycle_seconds.observe(duration_secs);
    }

    pub fn observe_probe_latency(&self, duration_secs: f64) {
        self.inner().probe_latency_seconds.observe(duration_secs);
    }

    pub fn inc_probe_result(&self, target: &str, status: &str) {
        self.inner()
            .probe_results
            .with_label_values(&[target, status])
            .inc();
    }

    pub fn set_target_state(&self, target: &str, state: HealthState) {
        let value = match state {
            HealthState::Healthy => 0,
            HealthState::Degraded => 1,
            HealthState::Critical => 2,
        };
        self.inner().target_state.with_label_values(&[target]).set(value);
    }

    pub fn set_targets_monitored(&self, count: i64) {
        self.inner().targets_monitored.set(count);
    }

    pub fn set_history_entries(&self, count: i64) {
        self.inner().history_entries.set(count);
    }

    pub fn inc_anomalies_detected(&self, severity: AnomalySeverity) {
        self.inner()
            .anomalies_detected
            .with_label_values(&[&severity.to_string()])
            .inc();
    }

    pub fn inc_predictions_generated(&self) {
        self.inner().predictions_generated.inc();
    }

    pub fn inc_alert(&self, kind: &str, outcome: &str) {
        self.inner().alerts.with_label_values(&[kind, outcome]).inc();
    }

    pub fn inc_task_skipped(&self, task: &str) {
        self.inner().task_skipped.with_label_values(&[task]).inc();
    }

    pub fn inc_task_failures(&self, task: &str) {
        self.inner().task_failures.with_label_values(&[task]).inc();
    }

    pub fn inc_events_received(&self) {
        self.inner().events_received.inc();
    }
}

/// Structured logger for agent events
///
/// Every record carries an `event` field so log pipelines can filter on it.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, targets: usize) {
        info!(
            event = "agent_started",
            instance = %self.instance,
            agent_version = %version,
            targets = targets,
            "Service monitor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Service monitor shutting down"
        );
    }

    pub fn log_anomaly(&self, anomaly: &Anomaly) {
        match anomaly.severity {
            AnomalySeverity::Critical => warn!(
                event = "anomaly_detected",
                instance = %self.instance,
                metric = %anomaly.metric_key,
                severity = %anomaly.severity,
                value = anomaly.value,
                mean = anomaly.mean,
                std_dev = anomaly.std_dev,
                z_score = anomaly.z_score,
                "Critical anomaly detected"
            ),
            _ => info!(
                event = "anomaly_detected",
                instance = %self.instance,
                metric = %anomaly.metric_key,
                severity = %anomaly.severity,
                value = anomaly.value,
                mean = anomaly.mean,
                std_dev = anomaly.std_dev,
                z_score = anomaly.z_score,
                "Anomaly detected"
            ),
        }
    }

    pub fn log_prediction(&self, prediction: &TrendPrediction) {
        info!(
            event = "prediction_generated",
            instance = %self.instance,
            metric = %prediction.metric_key,
            trend = ?prediction.trend,
            slope = prediction.slope,
            projected_value = prediction.projected_value,
            confidence = prediction.confidence,
            horizon_steps = prediction.horizon_steps,
            samples = prediction.samples,
            "Generated trend prediction"
        );
    }

    pub fn log_state_change(&self, target: &str, from: HealthState, to: HealthState, failures: u32) {
        if to != HealthState::Healthy {
            warn!(
                event = "service_state_changed",
                instance = %self.instance,
                target = %target,
                from = %from,
                to = %to,
                consecutive_failures = failures,
                "Target state changed"
            );
        } else {
            info!(
                event = "service_state_changed",
                instance = %self.instance,
                target = %target,
                from = %from,
                to = %to,
                "Target recovered"
            );
        }
    }

    pub fn log_alert_dispatched(&self, alert: &Alert, outcome: &str) {
        info!(
            event = "alert_dispatched",
            instance = %self.instance,
            alert_id = %alert.id,
            dedupe_key = %alert.dedupe_key,
            outcome = %outcome,
            "Alert dispatched"
        );
    }

    pub fn log_alert_failed(&self, alert: &Alert, reason: &str) {
        warn!(
            event = "alert_delivery_failed",
            instance = %self.instance,
            alert_id = %alert.id,
            dedupe_key = %alert.dedupe_key,
            reason = %reason,
            "Alert delivery failed, will retry on next observation"
        );
    }

    pub fn log_backup(&self, path: &str, entries: usize, success: bool) {
        if success {
            info!(
                event = "history_backup",
                instance = %self.instance,
                path = %path,
                entries = entries,
                "History backup written"
            );
        } else {
            warn!(
                event = "history_backup",
                instance = %self.instance,
                path = %path,
                entries = entries,
                success = false,
                "History backup failed"
            );
        }
    }

    pub fn log_restored(&self, path: &str, entries: usize) {
        info!(
            event = "history_restored",
            instance = %self.instance,
            path = %path,
            entries = entries,
            "History restored from backup"
        );
    }

    pub fn log_task_skipped(&self, task: &str) {
        warn!(
            event = "task_skipped",
            instance = %self.instance,
            task = %task,
            "Previous run still in progress, skipping"
        );
    }

    pub fn log_task_failed(&self, task: &str, reason: &str) {
        error!(
            event = "task_failed",
            instance = %self.instance,
            task = %task,
            reason = %reason,
            "Scheduled task failed"
        );
    }
}

//! The monitor agent
//!
//! `Agent` owns every core component and implements the four scheduled
//! tasks on top of them. It is shared as `Arc<Agent>` between the
//! scheduler and the HTTP surface.

mod view;

#[cfg(test)]
mod tests;

pub use view::{
    AgentHealth, AlertOutcome, AlertSettings, AlertSettingsUpdate, Dashboard, MetricsView,
    PredictiveCycleReport, ProbeCycleReport, TargetAlertSettings, TargetStatus,
};

use crate::alert::{AlertDispatcher, AlertRules, DispatchOutcome, NotificationChannel};
use crate::anomaly::AnomalyDetector;
use crate::config::{AlertConfig, MonitorConfig};
use crate::error::{MonitorError, MonitorResult};
use crate::health::{components, HealthRegistry};
use crate::history::{BackupRecord, HistoryStore};
use crate::models::{
    AlertKind, Anomaly, ExternalEvent, MetricSnapshot, ServiceHealth, ServiceTarget,
    SystemMetrics, Trend, TrendPrediction,
};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::predictor::{PredictionRule, TrendPredictor};
use crate::probe::{HealthProbe, SystemSampler};
use crate::scheduler::{Scheduler, TaskIntervals, TaskKind, TaskRunner};
use crate::tracker::{ServiceStateTracker, TargetEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// External events kept for context
const MAX_EVENTS: usize = 100;

/// Events younger than this are appended to anomaly alerts
const EVENT_CONTEXT_WINDOW_MINS: i64 = 15;

/// Alert log entries shown by `/metrics`
const RECENT_ALERTS_SHOWN: usize = 20;

pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct Agent {
    config: RwLock<MonitorConfig>,
    targets: Vec<ServiceTarget>,
    intervals: TaskIntervals,
    probe: Arc<dyn HealthProbe>,
    sampler: Arc<dyn SystemSampler>,
    history: RwLock<HistoryStore>,
    detector: AnomalyDetector,
    predictor: TrendPredictor,
    tracker: Mutex<ServiceStateTracker>,
    dispatcher: AlertDispatcher,
    latest_anomalies: RwLock<Vec<Anomaly>>,
    latest_predictions: RwLock<Vec<TrendPrediction>>,
    events: RwLock<VecDeque<ExternalEvent>>,
    started_at: DateTime<Utc>,
    health: HealthRegistry,
    metrics: AgentMetrics,
    logger: StructuredLogger,
}

impl Agent {
    /// Build an agent from configuration and its outbound collaborators
    ///
    /// Invalid targets are logged and left out; invalid global settings
    /// are an error.
    pub fn new(
        config: MonitorConfig,
        probe: Arc<dyn HealthProbe>,
        sampler: Arc<dyn SystemSampler>,
        channel: Arc<dyn NotificationChannel>,
    ) -> MonitorResult<Self> {
        config.validate()?;

        let (targets, rejected) = config.build_targets();
        for error in &rejected {
            warn!(error = %error, "Rejected target configuration");
        }

        let mut tracker = ServiceStateTracker::new(config.alerts.alert_threshold);
        for target in &targets {
            let threshold = config
                .target_config(&target.name)
                .and_then(|t| t.alert_threshold);
            tracker.register(&target.name, threshold);
        }

        let dispatcher = AlertDispatcher::new(channel, config.instance_name.clone())
            .with_rules(AlertRules::from_config(&config.alerts));

        let metrics = AgentMetrics::new();
        metrics.set_targets_monitored(targets.len() as i64);

        Ok(Self {
            targets,
            intervals: TaskIntervals::from_config(&config),
            probe,
            sampler,
            history: RwLock::new(HistoryStore::new(config.history.max_size)),
            detector: AnomalyDetector::from_config(&config.anomaly),
            predictor: TrendPredictor::from_config(&config.prediction),
            tracker: Mutex::new(tracker),
            dispatcher,
            latest_anomalies: RwLock::new(Vec::new()),
            latest_predictions: RwLock::new(Vec::new()),
            events: RwLock::new(VecDeque::new()),
            started_at: Utc::now(),
            health: HealthRegistry::with_agent_components(),
            metrics,
            logger: StructuredLogger::new(config.instance_name.clone()),
            config: RwLock::new(config),
        })
    }

    pub fn targets(&self) -> &[ServiceTarget] {
        &self.targets
    }

    pub fn health_registry(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Scheduler driving this agent's tasks at the configured intervals
    pub fn scheduler(self: &Arc<Self>) -> Scheduler {
        Scheduler::new(
            Arc::clone(self) as Arc<dyn TaskRunner>,
            self.intervals,
            self.health.clone(),
            self.logger.clone(),
        )
    }

    /// Replace the history with the persisted backup, if one exists
    pub async fn restore_history(&self) -> usize {
        let (path, max_size) = {
            let config = self.config.read().await;
            (config.history.backup_path.clone(), config.history.max_size)
        };

        let load_path = path.clone();
        let restore = tokio::task::spawn_blocking(move || HistoryStore::load(&load_path, max_size));
        let store = match restore.await {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "History restore task failed, starting empty");
                HistoryStore::new(max_size)
            }
        };

        let entries = store.len();
        *self.history.write().await = store;
        self.metrics.set_history_entries(entries as i64);
        if entries > 0 {
            self.logger.log_restored(&path.display().to_string(), entries);
        }
        entries
    }

    /// Probe every target, sample the host and act on the results
    ///
    /// All probes run concurrently and the snapshot is only recorded once
    /// every probe has answered or timed out.
    pub async fn run_probe_cycle(&self) -> ProbeCycleReport {
        let start = Instant::now();

        // A probe task that dies still leaves an entry for its target
        let mut services: BTreeMap<String, ServiceHealth> = self
            .targets
            .iter()
            .map(|t| (t.name.clone(), ServiceHealth::error("probe did not complete")))
            .collect();

        let mut probes = JoinSet::new();
        for target in &self.targets {
            let probe = Arc::clone(&self.probe);
            let target = target.clone();
            probes.spawn(async move {
                let health = probe.probe(&target).await;
                (target.name, health)
            });
        }
        while let Some(result) = probes.join_next().await {
            match result {
                Ok((name, health)) => {
                    services.insert(name, health);
                }
                Err(e) => warn!(error = %e, "Probe task failed"),
            }
        }

        for (name, health) in &services {
            self.metrics.inc_probe_result(name, health.status.as_str());
            if let Some(ms) = health.response_time_ms {
                self.metrics.observe_probe_latency(ms / 1000.0);
            }
        }

        // Disk sampling can block on a stalled mount
        let sampler = Arc::clone(&self.sampler);
        let system = match tokio::task::spawn_blocking(move || sampler.sample()).await {
            Ok(system) => system,
            Err(e) => {
                warn!(error = %e, "System sampling failed");
                SystemMetrics::default()
            }
        };
        let snapshot = MetricSnapshot::new(Utc::now(), services, system);

        // Detect against history that does not yet contain this snapshot
        let anomalies = {
            let mut history = self.history.write().await;
            let anomalies = self.detector.detect(&snapshot, &history);
            history.append(snapshot.clone());
            self.metrics.set_history_entries(history.len() as i64);
            anomalies
        };

        for anomaly in &anomalies {
            self.metrics.inc_anomalies_detected(anomaly.severity);
            self.logger.log_anomaly(anomaly);
        }
        *self.latest_anomalies.write().await = anomalies.clone();

        let target_events = self.update_tracker(&snapshot).await;

        let mut alerts = Vec::new();
        for event in &target_events {
            match event {
                TargetEvent::Down {
                    target,
                    consecutive_failures,
                    last_detail,
                } => {
                    let recipients = self.recipients_for(Some(target)).await;
                    let kind = AlertKind::ServiceDown {
                        target: target.clone(),
                        consecutive_failures: *consecutive_failures,
                        last_detail: last_detail.clone(),
                    };
                    let (key, outcome) = self.send_alert(kind, &[], &recipients).await;
                    if outcome.is_handled() {
                        self.tracker.lock().await.acknowledge_alert(target);
                    }
                    alerts.push(AlertOutcome {
                        dedupe_key: key,
                        outcome: outcome.label(),
                    });
                }
                TargetEvent::Recovered { target, .. } => {
                    let resolved = self
                        .dispatcher
                        .resolve(&format!("service_down:{}", target))
                        .await;
                    if resolved > 0 {
                        info!(target = %target, "Service-down alert resolved");
                    }
                }
                TargetEvent::Degraded { .. } => {}
            }
        }

        if !anomalies.is_empty() {
            let context = self.event_context().await;
            let recipients = self.recipients_for(None).await;
            for anomaly in &anomalies {
                let (key, outcome) = self
                    .send_alert(AlertKind::Anomaly(anomaly.clone()), &context, &recipients)
                    .await;
                alerts.push(AlertOutcome {
                    dedupe_key: key,
                    outcome: outcome.label(),
                });
            }
        }

        let elapsed = start.elapsed();
        self.metrics.observe_probe_cycle(elapsed.as_secs_f64());
        debug!(
            targets = self.targets.len(),
            anomalies = anomalies.len(),
            alerts = alerts.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Probe cycle complete"
        );

        ProbeCycleReport {
            snapshot,
            anomalies,
            target_events,
            alerts,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }

    async fn update_tracker(&self, snapshot: &MetricSnapshot) -> Vec<TargetEvent> {
        let mut tracker = self.tracker.lock().await;
        let mut events = Vec::new();
        for (name, health) in &snapshot.services {
            let before = tracker.state(name).map(|s| s.current_state);
            let event = tracker.observe(name, health);
            if let Some(state) = tracker.state(name) {
                self.metrics.set_target_state(name, state.current_state);
                if let Some(previous) = before.filter(|p| *p != state.current_state) {
                    self.logger.log_state_change(
                        name,
                        previous,
                        state.current_state,
                        state.consecutive_failures,
                    );
                }
            }
            events.extend(event);
        }
        events
    }

    /// Project cpu, memory and disk forward and alert on projected breaches
    pub async fn run_predictive_cycle(&self) -> PredictiveCycleReport {
        let start = Instant::now();
        let config = self.config.read().await.prediction.clone();
        let rules = PredictionRule::defaults_from(&config);

        let predictions: Vec<TrendPrediction> = {
            let history = self.history.read().await;
            rules
                .iter()
                .map(|rule| {
                    self.predictor
                        .predict(&history, &rule.metric_key, config.horizon_steps)
                })
                .collect()
        };

        let recipients = self.recipients_for(None).await;
        let mut alerts = Vec::new();
        for (rule, prediction) in rules.iter().zip(&predictions) {
            if prediction.trend == Trend::InsufficientData {
                debug!(
                    metric = %prediction.metric_key,
                    samples = prediction.samples,
                    "Not enough history for a prediction"
                );
                continue;
            }
            self.metrics.inc_predictions_generated();
            self.logger.log_prediction(prediction);

            if rule.is_breached(prediction, config.min_confidence) {
                let kind = AlertKind::Predictive {
                    prediction: prediction.clone(),
                    threshold: rule.threshold,
                };
                let (key, outcome) = self.send_alert(kind, &[], &recipients).await;
                alerts.push(AlertOutcome {
                    dedupe_key: key,
                    outcome: outcome.label(),
                });
            }
        }

        *self.latest_predictions.write().await = predictions.clone();
        self.metrics
            .observe_prediction_cycle(start.elapsed().as_secs_f64());

        PredictiveCycleReport {
            predictions,
            alerts,
        }
    }

    /// Drop snapshots older than the retention period
    pub async fn prune_history(&self) -> usize {
        let retention = self.config.read().await.history.retention();
        let mut history = self.history.write().await;
        let removed = history.prune(retention);
        self.metrics.set_history_entries(history.len() as i64);
        if removed > 0 {
            info!(removed = removed, remaining = history.len(), "Pruned history");
        }
        removed
    }

    /// Persist the history buffer and configuration
    pub async fn backup_history(&self) -> MonitorResult<usize> {
        let (record, path) = {
            let config = self.config.read().await;
            let history = self.history.read().await;
            (
                BackupRecord::capture(&history, &config),
                config.history.backup_path.clone(),
            )
        };
        let entries = record.metrics.len();
        let display_path = path.display().to_string();

        let result = tokio::task::spawn_blocking(move || record.write_to(&path))
            .await
            .map_err(|e| MonitorError::Persistence(format!("backup task failed: {}", e)))
            .and_then(|r| r);

        self.logger
            .log_backup(&display_path, entries, result.is_ok());
        result.map(|_| entries)
    }

    /// Create and dispatch one alert, recording the outcome
    async fn send_alert(
        &self,
        kind: AlertKind,
        context: &[String],
        recipients: &[String],
    ) -> (String, DispatchOutcome) {
        let alert = self.dispatcher.create_alert(kind, context);
        let slug = alert.kind.slug();
        let outcome = self.dispatcher.dispatch(alert.clone(), recipients).await;

        self.metrics.inc_alert(slug, outcome.label());
        match &outcome {
            DispatchOutcome::Delivered => {
                self.logger.log_alert_dispatched(&alert, outcome.label());
                self.health.set_healthy(components::NOTIFIER).await;
            }
            DispatchOutcome::NoRoute => {
                self.logger.log_alert_dispatched(&alert, outcome.label());
            }
            DispatchOutcome::Suppressed => {}
            DispatchOutcome::Failed(reason) => {
                self.logger.log_alert_failed(&alert, reason);
                self.health
                    .set_degraded(components::NOTIFIER, reason.clone())
                    .await;
            }
        }
        (alert.dedupe_key, outcome)
    }

    /// Target-specific recipients, falling back to the global list
    async fn recipients_for(&self, target: Option<&str>) -> Vec<String> {
        let config = self.config.read().await;
        target
            .and_then(|name| config.target_config(name))
            .and_then(|t| t.recipients.clone())
            .unwrap_or_else(|| config.alerts.recipients.clone())
    }

    /// Recent external events rendered as alert context lines
    async fn event_context(&self) -> Vec<String> {
        let cutoff = Utc::now() - chrono::Duration::minutes(EVENT_CONTEXT_WINDOW_MINS);
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.received_at >= cutoff)
            .map(|e| {
                let mut line = format!("{}/{}", e.source, e.kind);
                if let Some(target) = &e.target {
                    line.push_str(&format!(" on {}", target));
                }
                if let Some(message) = &e.message {
                    line.push_str(&format!(": {}", message));
                }
                line
            })
            .collect()
    }

    /// Accept an external event; malformed payloads are ignored
    pub async fn record_event(&self, payload: serde_json::Value) -> bool {
        let event = match serde_json::from_value::<ExternalEvent>(payload) {
            Ok(event) if !event.source.trim().is_empty() && !event.kind.trim().is_empty() => event,
            Ok(_) => {
                debug!("Ignoring external event without source or kind");
                return false;
            }
            Err(e) => {
                debug!(error = %e, "Ignoring malformed external event");
                return false;
            }
        };

        info!(source = %event.source, kind = %event.kind, "External event received");
        self.metrics.inc_events_received();
        let mut events = self.events.write().await;
        events.push_back(event);
        while events.len() > MAX_EVENTS {
            events.pop_front();
        }
        true
    }

    /// Update thresholds, routing and cooldowns in memory
    pub async fn configure_alerts(&self, update: AlertSettingsUpdate) -> MonitorResult<AlertSettings> {
        if update.threshold == Some(0) {
            return Err(MonitorError::config("threshold must be greater than zero"));
        }
        let cooldowns = [
            ("anomaly_cooldown_mins", update.anomaly_cooldown_mins),
            ("predictive_cooldown_mins", update.predictive_cooldown_mins),
            ("service_down_cooldown_mins", update.service_down_cooldown_mins),
        ];
        for (field, mins) in cooldowns {
            if let Some(mins) = mins {
                AlertConfig::check_cooldown(field, mins)?;
            }
        }

        let mut config = self.config.write().await;
        let mut tracker = self.tracker.lock().await;

        match &update.target {
            Some(name) => {
                let target = config
                    .target_config_mut(name)
                    .filter(|_| tracker.state(name).is_some())
                    .ok_or_else(|| MonitorError::config(format!("unknown target '{}'", name)))?;
                if let Some(threshold) = update.threshold {
                    target.alert_threshold = Some(threshold);
                    tracker.set_threshold(name, threshold);
                }
                if let Some(recipients) = &update.recipients {
                    target.recipients = Some(recipients.clone());
                }
            }
            None => {
                if let Some(threshold) = update.threshold {
                    config.alerts.alert_threshold = threshold;
                    for target in config.targets.iter().filter(|t| t.alert_threshold.is_none()) {
                        tracker.set_threshold(&target.name, threshold);
                    }
                }
                if let Some(recipients) = &update.recipients {
                    config.alerts.recipients = recipients.clone();
                }
            }
        }

        let cooldowns_changed = update.anomaly_cooldown_mins.is_some()
            || update.predictive_cooldown_mins.is_some()
            || update.service_down_cooldown_mins.is_some();
        if let Some(mins) = update.anomaly_cooldown_mins {
            config.alerts.anomaly_cooldown_mins = mins;
        }
        if let Some(mins) = update.predictive_cooldown_mins {
            config.alerts.predictive_cooldown_mins = mins;
        }
        if let Some(mins) = update.service_down_cooldown_mins {
            config.alerts.service_down_cooldown_mins = mins;
        }
        if cooldowns_changed {
            self.dispatcher
                .set_rules(AlertRules::from_config(&config.alerts))
                .await;
        }

        info!(target = ?update.target, "Alert configuration updated");

        let targets = tracker
            .states()
            .map(|state| TargetAlertSettings {
                name: state.name.clone(),
                alert_threshold: state.alert_threshold,
                recipients: config
                    .target_config(&state.name)
                    .and_then(|t| t.recipients.clone())
                    .unwrap_or_else(|| config.alerts.recipients.clone()),
            })
            .collect();

        Ok(AlertSettings {
            alerts: config.alerts.clone(),
            targets,
        })
    }

    pub async fn health_summary(&self) -> AgentHealth {
        let components = self.health.health().await;
        let history = self.history.read().await.stats();
        let now = Utc::now();
        AgentHealth {
            status: components.status,
            instance: self.config.read().await.instance_name.clone(),
            version: AGENT_VERSION,
            started_at: self.started_at,
            uptime_secs: (now - self.started_at).num_seconds(),
            targets_tracked: self.tracker.lock().await.len(),
            active_alerts: self.dispatcher.active_alerts().await.len(),
            history,
            components: components.components,
        }
    }

    pub async fn dashboard(&self) -> Dashboard {
        let latest = self.history.read().await.latest().cloned();
        let (overall_status, states) = {
            let tracker = self.tracker.lock().await;
            (tracker.overall_status(), tracker.states().cloned().collect::<Vec<_>>())
        };

        let targets = states
            .into_iter()
            .map(|state| TargetStatus {
                url: self
                    .targets
                    .iter()
                    .find(|t| t.name == state.name)
                    .map(|t| t.url.clone())
                    .unwrap_or_default(),
                last_check: latest
                    .as_ref()
                    .and_then(|s| s.services.get(&state.name).cloned()),
                state,
            })
            .collect();

        Dashboard {
            instance: self.config.read().await.instance_name.clone(),
            overall_status,
            targets,
            predictions: self.latest_predictions.read().await.clone(),
            active_alerts: self.dispatcher.active_alerts().await,
            generated_at: Utc::now(),
        }
    }

    /// Latest snapshot plus the newest `window` snapshots
    pub async fn metrics_view(&self, window: usize) -> MetricsView {
        let (latest, recent, history) = {
            let history = self.history.read().await;
            (history.latest().cloned(), history.recent(window), history.stats())
        };

        MetricsView {
            latest,
            recent,
            predictions: self.latest_predictions.read().await.clone(),
            anomalies: self.latest_anomalies.read().await.clone(),
            events: self.events.read().await.iter().cloned().collect(),
            recent_alerts: self.dispatcher.recent_alerts(RECENT_ALERTS_SHOWN).await,
            history,
        }
    }
}

#[async_trait]
impl TaskRunner for Agent {
    async fn run_task(&self, kind: TaskKind) -> MonitorResult<()> {
        match kind {
            TaskKind::Probe => {
                self.run_probe_cycle().await;
            }
            TaskKind::Predictive => {
                self.run_predictive_cycle().await;
            }
            TaskKind::Prune => {
                self.prune_history().await;
            }
            TaskKind::Backup => {
                self.backup_history().await?;
            }
        }
        Ok(())
    }
}

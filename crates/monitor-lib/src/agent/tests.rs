//! End-to-end agent scenarios with scripted collaborators

use super::*;
use crate::config::TargetConfig;
use crate::health::ComponentStatus;
use crate::models::{HealthState, MetricKey, SystemMetrics};
use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

/// Answers per target name; unknown targets are healthy
#[derive(Default)]
struct MockProbe {
    failing: StdMutex<HashMap<String, ServiceHealth>>,
}

impl MockProbe {
    fn fail(&self, target: &str, health: ServiceHealth) {
        self.failing.lock().unwrap().insert(target.to_string(), health);
    }

    fn recover(&self, target: &str) {
        self.failing.lock().unwrap().remove(target);
    }
}

#[async_trait]
impl HealthProbe for MockProbe {
    async fn probe(&self, target: &ServiceTarget) -> ServiceHealth {
        self.failing
            .lock()
            .unwrap()
            .get(&target.name)
            .cloned()
            .unwrap_or_else(|| ServiceHealth::healthy(200, 25.0))
    }
}

/// Replays queued readings, then repeats the last one
struct ScriptedSampler {
    readings: StdMutex<VecDeque<SystemMetrics>>,
    last: StdMutex<SystemMetrics>,
}

impl ScriptedSampler {
    fn constant(metrics: SystemMetrics) -> Self {
        Self::sequence(vec![metrics])
    }

    fn sequence(readings: Vec<SystemMetrics>) -> Self {
        Self {
            last: StdMutex::new(readings.first().copied().unwrap_or_default()),
            readings: StdMutex::new(readings.into()),
        }
    }
}

impl SystemSampler for ScriptedSampler {
    fn sample(&self) -> SystemMetrics {
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.readings.lock().unwrap().pop_front() {
            *last = next;
        }
        *last
    }
}

#[derive(Default)]
struct RecordingChannel {
    sent: StdMutex<Vec<(String, String)>>,
    offline: std::sync::atomic::AtomicBool,
}

impl RecordingChannel {
    fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    fn count_containing(&self, needle: &str) -> usize {
        self.messages()
            .iter()
            .filter(|(_, text)| text.contains(needle))
            .count()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send(&self, recipient: &str, text: &str) -> MonitorResult<()> {
        if self.offline.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(MonitorError::delivery(recipient, "gateway offline"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), text.to_string()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

fn steady_system() -> SystemMetrics {
    SystemMetrics {
        cpu_usage_pct: 40.0,
        memory_usage_pct: 55.0,
        disk_usage_pct: 60.0,
        load_average: 1.5,
    }
}

fn config_with_targets(names: &[&str]) -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.instance_name = "test-monitor".to_string();
    config.alerts.recipients = vec!["ops".to_string()];
    config.targets = names
        .iter()
        .map(|name| TargetConfig::new(*name, format!("https://{}.example.com/health", name)))
        .collect();
    config
}

struct Harness {
    agent: Arc<Agent>,
    probe: Arc<MockProbe>,
    channel: Arc<RecordingChannel>,
}

fn harness(config: MonitorConfig, sampler: ScriptedSampler) -> Harness {
    let probe = Arc::new(MockProbe::default());
    let channel = Arc::new(RecordingChannel::default());
    let agent = Agent::new(config, probe.clone(), Arc::new(sampler), channel.clone())
        .expect("valid configuration");
    Harness {
        agent: Arc::new(agent),
        probe,
        channel,
    }
}

#[tokio::test]
async fn test_one_target_down_among_three() {
    let h = harness(
        config_with_targets(&["web", "api", "billing"]),
        ScriptedSampler::constant(steady_system()),
    );
    h.probe
        .fail("billing", ServiceHealth::error("timed out after 10000ms"));

    for _ in 0..3 {
        h.agent.run_probe_cycle().await;
    }

    let dashboard = h.agent.dashboard().await;
    assert_eq!(dashboard.overall_status, HealthState::Degraded);

    let billing = dashboard
        .targets
        .iter()
        .find(|t| t.state.name == "billing")
        .unwrap();
    assert_eq!(billing.state.current_state, HealthState::Critical);
    assert_eq!(billing.state.consecutive_failures, 3);
    assert_eq!(billing.url, "https://billing.example.com/health");

    let messages = h.channel.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "ops");
    assert!(messages[0].1.contains("SERVICE DOWN: billing"));
    assert_eq!(h.channel.count_containing("web"), 0);
    assert_eq!(h.channel.count_containing("api"), 0);

    // Still down: no repeat while the alert is active
    h.agent.run_probe_cycle().await;
    assert_eq!(h.channel.messages().len(), 1);
    assert_eq!(h.agent.dashboard().await.active_alerts.len(), 1);
}

#[tokio::test]
async fn test_degraded_before_threshold_does_not_alert() {
    let h = harness(
        config_with_targets(&["web", "api"]),
        ScriptedSampler::constant(steady_system()),
    );
    h.probe.fail("api", ServiceHealth::unhealthy(503, 12.0));

    h.agent.run_probe_cycle().await;
    h.agent.run_probe_cycle().await;

    let dashboard = h.agent.dashboard().await;
    let api = dashboard.targets.iter().find(|t| t.state.name == "api").unwrap();
    assert_eq!(api.state.current_state, HealthState::Degraded);
    assert_eq!(api.last_check.as_ref().and_then(|c| c.http_status), Some(503));
    assert!(h.channel.messages().is_empty());
}

#[tokio::test]
async fn test_recovery_resolves_service_down_alert() {
    let h = harness(
        config_with_targets(&["api"]),
        ScriptedSampler::constant(steady_system()),
    );
    h.probe.fail("api", ServiceHealth::error("connection refused"));
    for _ in 0..3 {
        h.agent.run_probe_cycle().await;
    }
    assert_eq!(h.agent.dashboard().await.overall_status, HealthState::Critical);
    assert_eq!(h.agent.dashboard().await.active_alerts.len(), 1);

    h.probe.recover("api");
    let report = h.agent.run_probe_cycle().await;
    assert!(matches!(
        report.target_events.as_slice(),
        [TargetEvent::Recovered { previous: HealthState::Critical, .. }]
    ));

    let dashboard = h.agent.dashboard().await;
    assert_eq!(dashboard.overall_status, HealthState::Healthy);
    assert!(dashboard.active_alerts.is_empty());
}

#[tokio::test]
async fn test_failed_delivery_retried_while_condition_holds() {
    let h = harness(
        config_with_targets(&["api"]),
        ScriptedSampler::constant(steady_system()),
    );
    h.channel
        .offline
        .store(true, std::sync::atomic::Ordering::SeqCst);
    h.probe.fail("api", ServiceHealth::error("timed out after 10000ms"));

    for _ in 0..3 {
        h.agent.run_probe_cycle().await;
    }
    assert!(h.channel.messages().is_empty());
    let health = h.agent.health_registry().health().await;
    assert_eq!(
        health.components[components::NOTIFIER].status,
        ComponentStatus::Degraded
    );

    h.channel
        .offline
        .store(false, std::sync::atomic::Ordering::SeqCst);
    let report = h.agent.run_probe_cycle().await;
    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].outcome, "delivered");
    assert_eq!(h.channel.count_containing("SERVICE DOWN: api"), 1);
}

#[tokio::test]
async fn test_rising_cpu_raises_one_predictive_alert() {
    let readings = (0..20)
        .map(|i| SystemMetrics {
            cpu_usage_pct: 50.0 + 2.0 * i as f64,
            ..steady_system()
        })
        .collect();
    let h = harness(config_with_targets(&["web"]), ScriptedSampler::sequence(readings));

    for _ in 0..20 {
        h.agent.run_probe_cycle().await;
    }
    let report = h.agent.run_predictive_cycle().await;

    let cpu = report
        .predictions
        .iter()
        .find(|p| p.metric_key == MetricKey::CpuUsage)
        .unwrap();
    assert_eq!(cpu.trend, Trend::Increasing);
    assert!(cpu.confidence > 0.99);
    assert_eq!(cpu.projected_value, 100.0);

    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].dedupe_key, "predictive:system.cpu_usage_pct");
    assert_eq!(h.channel.count_containing("PREDICTIVE ALERT"), 1);

    // Cooldown holds across the next cycle
    let report = h.agent.run_predictive_cycle().await;
    assert_eq!(report.alerts[0].outcome, "suppressed");
    assert_eq!(h.channel.count_containing("PREDICTIVE ALERT"), 1);
}

#[tokio::test]
async fn test_predictive_cycle_abstains_without_history() {
    let h = harness(
        config_with_targets(&["web"]),
        ScriptedSampler::constant(steady_system()),
    );
    for _ in 0..5 {
        h.agent.run_probe_cycle().await;
    }

    let report = h.agent.run_predictive_cycle().await;
    assert_eq!(report.predictions.len(), 3);
    assert!(report
        .predictions
        .iter()
        .all(|p| p.trend == Trend::InsufficientData));
    assert!(report.alerts.is_empty());
}

#[tokio::test]
async fn test_cpu_spike_alert_carries_recent_events() {
    let mut readings: Vec<SystemMetrics> = (0..12)
        .map(|i| SystemMetrics {
            cpu_usage_pct: if i % 2 == 0 { 40.0 } else { 42.0 },
            ..steady_system()
        })
        .collect();
    readings.push(SystemMetrics {
        cpu_usage_pct: 97.0,
        ..steady_system()
    });
    let h = harness(config_with_targets(&["web"]), ScriptedSampler::sequence(readings));

    assert!(
        h.agent
            .record_event(serde_json::json!({
                "source": "ci",
                "kind": "deploy",
                "message": "release 42",
                "target": "web"
            }))
            .await
    );

    for _ in 0..12 {
        let report = h.agent.run_probe_cycle().await;
        assert!(report.anomalies.is_empty());
    }
    let report = h.agent.run_probe_cycle().await;

    assert_eq!(report.anomalies.len(), 1);
    assert_eq!(report.anomalies[0].metric_key, MetricKey::CpuUsage);

    let messages = h.channel.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].1.contains("ANOMALY"));
    assert!(messages[0].1.contains("ci/deploy on web: release 42"));

    let view = h.agent.metrics_view(5).await;
    assert_eq!(view.recent.len(), 5);
    assert_eq!(view.anomalies.len(), 1);
    assert_eq!(view.events.len(), 1);
    assert_eq!(view.history.entries, 13);
}

#[tokio::test]
async fn test_malformed_events_are_ignored() {
    let h = harness(
        config_with_targets(&["web"]),
        ScriptedSampler::constant(steady_system()),
    );

    assert!(!h.agent.record_event(serde_json::json!("not an object")).await);
    assert!(!h.agent.record_event(serde_json::json!({"source": "ci"})).await);
    assert!(!h.agent.record_event(serde_json::json!({"source": " ", "kind": "x"})).await);
    assert!(h.agent.metrics_view(10).await.events.is_empty());

    for i in 0..(MAX_EVENTS + 5) {
        h.agent
            .record_event(serde_json::json!({"source": "ci", "kind": format!("build-{}", i)}))
            .await;
    }
    let events = h.agent.metrics_view(10).await.events;
    assert_eq!(events.len(), MAX_EVENTS);
    assert_eq!(events[0].kind, "build-5");
}

#[tokio::test]
async fn test_configure_alerts_per_target_and_global() {
    let h = harness(
        config_with_targets(&["web", "api"]),
        ScriptedSampler::constant(steady_system()),
    );

    let settings = h
        .agent
        .configure_alerts(AlertSettingsUpdate {
            target: Some("api".to_string()),
            threshold: Some(1),
            recipients: Some(vec!["api-oncall".to_string()]),
            ..Default::default()
        })
        .await
        .unwrap();
    let api = settings.targets.iter().find(|t| t.name == "api").unwrap();
    assert_eq!(api.alert_threshold, 1);
    assert_eq!(api.recipients, vec!["api-oncall".to_string()]);

    h.probe.fail("api", ServiceHealth::error("connection refused"));
    h.agent.run_probe_cycle().await;
    let messages = h.channel.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "api-oncall");

    let settings = h
        .agent
        .configure_alerts(AlertSettingsUpdate {
            threshold: Some(5),
            service_down_cooldown_mins: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(settings.alerts.alert_threshold, 5);
    assert_eq!(settings.alerts.service_down_cooldown_mins, 1);
    let web = settings.targets.iter().find(|t| t.name == "web").unwrap();
    assert_eq!(web.alert_threshold, 5);
    // Per-target override survives a global change
    let api = settings.targets.iter().find(|t| t.name == "api").unwrap();
    assert_eq!(api.alert_threshold, 1);
}

#[tokio::test]
async fn test_configure_alerts_rejects_bad_input() {
    let h = harness(
        config_with_targets(&["web"]),
        ScriptedSampler::constant(steady_system()),
    );

    let unknown = h
        .agent
        .configure_alerts(AlertSettingsUpdate {
            target: Some("nope".to_string()),
            threshold: Some(2),
            ..Default::default()
        })
        .await;
    assert!(matches!(unknown, Err(MonitorError::Configuration(_))));

    let zero = h
        .agent
        .configure_alerts(AlertSettingsUpdate {
            threshold: Some(0),
            ..Default::default()
        })
        .await;
    assert!(zero.is_err());
}

#[tokio::test]
async fn test_oversized_cooldown_rejected_without_side_effects() {
    let h = harness(
        config_with_targets(&["web"]),
        ScriptedSampler::constant(steady_system()),
    );
    let rules_before = h.agent.dispatcher.rules().await;

    let result = h
        .agent
        .configure_alerts(AlertSettingsUpdate {
            threshold: Some(7),
            service_down_cooldown_mins: Some(5),
            anomaly_cooldown_mins: Some(u64::MAX / 2),
            ..Default::default()
        })
        .await;
    let err = result.unwrap_err();
    assert!(matches!(err, MonitorError::Configuration(_)));
    assert!(err.to_string().contains("anomaly_cooldown_mins"));

    {
        let config = h.agent.config.read().await;
        assert_eq!(config.alerts.alert_threshold, 3);
        assert_eq!(config.alerts.anomaly_cooldown_mins, 30);
        assert_eq!(config.alerts.service_down_cooldown_mins, 15);
    }
    assert_eq!(h.agent.dispatcher.rules().await, rules_before);

    // A later valid update still applies
    let settings = h
        .agent
        .configure_alerts(AlertSettingsUpdate {
            anomaly_cooldown_mins: Some(45),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(settings.alerts.anomaly_cooldown_mins, 45);
    assert_eq!(
        h.agent.dispatcher.rules().await.anomaly_cooldown,
        std::time::Duration::from_secs(45 * 60)
    );
}

struct PanickingSampler;

impl SystemSampler for PanickingSampler {
    fn sample(&self) -> SystemMetrics {
        panic!("statvfs failed");
    }
}

#[tokio::test]
async fn test_sampler_failure_still_records_snapshot() {
    let probe = Arc::new(MockProbe::default());
    let channel = Arc::new(RecordingChannel::default());
    let agent = Agent::new(
        config_with_targets(&["web"]),
        probe,
        Arc::new(PanickingSampler),
        channel,
    )
    .expect("valid configuration");

    let report = agent.run_probe_cycle().await;
    assert_eq!(report.snapshot.system, SystemMetrics::default());
    assert_eq!(report.snapshot.services["web"].status, crate::models::ServiceStatus::Healthy);
    assert_eq!(agent.history.read().await.len(), 1);
}

#[tokio::test]
async fn test_invalid_targets_are_skipped() {
    let mut config = config_with_targets(&["web"]);
    config.targets.push(TargetConfig::new("broken", "not a url"));
    config.targets.push(TargetConfig::new("web", "https://duplicate.example.com"));

    let h = harness(config, ScriptedSampler::constant(steady_system()));
    assert_eq!(h.agent.targets().len(), 1);

    let report = h.agent.run_probe_cycle().await;
    assert_eq!(report.snapshot.services.len(), 1);
    assert!(report.snapshot.services.contains_key("web"));
}

#[tokio::test]
async fn test_backup_and_restore_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_with_targets(&["web"]);
    config.history.backup_path = dir.path().join("history.json");

    let h = harness(config.clone(), ScriptedSampler::constant(steady_system()));
    for _ in 0..4 {
        h.agent.run_probe_cycle().await;
    }
    assert_eq!(h.agent.backup_history().await.unwrap(), 4);

    let restored = harness(config, ScriptedSampler::constant(steady_system()));
    assert_eq!(restored.agent.restore_history().await, 4);
    let view = restored.agent.metrics_view(10).await;
    assert_eq!(view.history.entries, 4);
    assert_eq!(
        view.latest.map(|s| s.system),
        Some(steady_system())
    );
}

#[tokio::test]
async fn test_backup_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-directory");
    std::fs::write(&blocker, b"file").unwrap();

    let mut config = config_with_targets(&["web"]);
    config.history.backup_path = blocker.join("history.json");
    let h = harness(config, ScriptedSampler::constant(steady_system()));

    let result = h.agent.backup_history().await;
    assert!(matches!(result, Err(MonitorError::Persistence(_))));

    let scheduler = h.agent.scheduler();
    let outcome = scheduler.run_now(TaskKind::Backup).await;
    assert!(matches!(outcome, crate::scheduler::RunOutcome::Failed(_)));
    let health = h.agent.health_summary().await;
    assert_eq!(
        health.components[components::HISTORY].status,
        ComponentStatus::Degraded
    );
}

#[tokio::test]
async fn test_health_summary_counts() {
    let h = harness(
        config_with_targets(&["web", "api"]),
        ScriptedSampler::constant(steady_system()),
    );
    h.agent.run_probe_cycle().await;

    let health = h.agent.health_summary().await;
    assert_eq!(health.instance, "test-monitor");
    assert_eq!(health.targets_tracked, 2);
    assert_eq!(health.active_alerts, 0);
    assert_eq!(health.history.entries, 1);
    assert_eq!(health.status, ComponentStatus::Healthy);
}

#[tokio::test]
async fn test_prune_keeps_recent_history() {
    let h = harness(
        config_with_targets(&["web"]),
        ScriptedSampler::constant(steady_system()),
    );
    for _ in 0..3 {
        h.agent.run_probe_cycle().await;
    }

    assert_eq!(h.agent.prune_history().await, 0);
    assert_eq!(h.agent.metrics_view(10).await.history.entries, 3);
}

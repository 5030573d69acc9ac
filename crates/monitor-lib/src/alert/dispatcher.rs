//! Alert formatting, deduplication and delivery
//!
//! Identical alerts (same dedupe key) are suppressed within a per-kind
//! cooldown. Failed deliveries do not start the cooldown, so the alert is
//! attempted again the next time its condition is observed.

use super::NotificationChannel;
use crate::config::AlertConfig;
use crate::models::{Alert, AlertKind};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Alerts kept in the in-memory log
const ALERT_LOG_CAPACITY: usize = 200;

/// Minimum interval between identical alerts, per alert kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertRules {
    pub anomaly_cooldown: Duration,
    pub predictive_cooldown: Duration,
    pub service_down_cooldown: Duration,
}

impl Default for AlertRules {
    fn default() -> Self {
        Self::from_config(&AlertConfig::default())
    }
}

fn minutes(mins: u64) -> Duration {
    Duration::from_secs(mins.saturating_mul(60))
}

impl AlertRules {
    pub fn from_config(config: &AlertConfig) -> Self {
        Self {
            anomaly_cooldown: minutes(config.anomaly_cooldown_mins),
            predictive_cooldown: minutes(config.predictive_cooldown_mins),
            service_down_cooldown: minutes(config.service_down_cooldown_mins),
        }
    }

    /// Cooldown for `kind` as a chrono duration, clamped to what chrono can hold
    fn chrono_cooldown(&self, kind: &AlertKind) -> chrono::Duration {
        chrono::Duration::from_std(self.cooldown(kind)).unwrap_or(chrono::Duration::MAX)
    }

    pub fn cooldown(&self, kind: &AlertKind) -> Duration {
        match kind {
            AlertKind::Anomaly(_) => self.anomaly_cooldown,
            AlertKind::Predictive { .. } => self.predictive_cooldown,
            AlertKind::ServiceDown { .. } => self.service_down_cooldown,
        }
    }
}

/// What happened to a dispatched alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Sent to at least one recipient
    Delivered,
    /// An identical alert went out within the cooldown
    Suppressed,
    /// No recipients are configured; recorded only
    NoRoute,
    /// Every recipient failed; recorded as undelivered
    Failed(String),
}

impl DispatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Delivered => "delivered",
            DispatchOutcome::Suppressed => "suppressed",
            DispatchOutcome::NoRoute => "no_route",
            DispatchOutcome::Failed(_) => "failed",
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered)
    }

    /// Whether the condition has been dealt with and need not be re-sent
    pub fn is_handled(&self) -> bool {
        !matches!(self, DispatchOutcome::Failed(_))
    }
}

#[derive(Debug, Default)]
struct DispatchState {
    rules: AlertRules,
    /// Dedupe key -> last handled time
    recent: HashMap<String, DateTime<Utc>>,
    log: VecDeque<Alert>,
}

impl DispatchState {
    fn in_cooldown(&self, alert: &Alert, now: DateTime<Utc>) -> bool {
        let cooldown = self.rules.chrono_cooldown(&alert.kind);
        self.recent
            .get(&alert.dedupe_key)
            .is_some_and(|last| now - *last < cooldown)
    }

    fn record(&mut self, alert: Alert) {
        self.log.push_back(alert);
        while self.log.len() > ALERT_LOG_CAPACITY {
            self.log.pop_front();
        }
    }

    /// Resolve anomaly and predictive alerts whose cooldown has passed
    fn expire(&mut self, now: DateTime<Utc>) {
        let rules = self.rules;
        for alert in self.log.iter_mut().filter(|a| a.is_active()) {
            if matches!(alert.kind, AlertKind::ServiceDown { .. }) {
                continue;
            }
            let cooldown = rules.chrono_cooldown(&alert.kind);
            if now - alert.created_at >= cooldown {
                alert.resolved_at = Some(now);
            }
        }
        self.recent.retain(|_, last| now - *last < chrono::Duration::days(1));
    }
}

/// Formats alerts and forwards them to the notification channel
pub struct AlertDispatcher {
    channel: Arc<dyn NotificationChannel>,
    instance_name: String,
    state: Mutex<DispatchState>,
    sequence: AtomicU64,
}

impl AlertDispatcher {
    pub fn new(channel: Arc<dyn NotificationChannel>, instance_name: impl Into<String>) -> Self {
        Self {
            channel,
            instance_name: instance_name.into(),
            state: Mutex::new(DispatchState::default()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Set custom cooldowns
    pub fn with_rules(self, rules: AlertRules) -> Self {
        Self {
            state: Mutex::new(DispatchState {
                rules,
                ..Default::default()
            }),
            ..self
        }
    }

    pub async fn set_rules(&self, rules: AlertRules) {
        self.state.lock().await.rules = rules;
    }

    pub async fn rules(&self) -> AlertRules {
        self.state.lock().await.rules
    }

    /// Create an alert with a formatted message
    ///
    /// `context` lines (e.g. recent external events) are appended to the text.
    pub fn create_alert(&self, kind: AlertKind, context: &[String]) -> Alert {
        let created_at = Utc::now();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut message = self.format_message(&kind);
        if !context.is_empty() {
            message.push_str("\nRecent events:");
            for line in context {
                message.push_str("\n- ");
                message.push_str(line);
            }
        }

        Alert {
            id: format!("{}-{:x}-{}", kind.slug(), created_at.timestamp_millis(), seq),
            dedupe_key: kind.dedupe_key(),
            kind,
            message,
            created_at,
            delivered: false,
            resolved_at: None,
        }
    }

    fn format_message(&self, kind: &AlertKind) -> String {
        match kind {
            AlertKind::ServiceDown {
                target,
                consecutive_failures,
                last_detail,
            } => format!(
                "[{}] SERVICE DOWN: {}\n{} consecutive failed checks.{}",
                self.instance_name,
                target,
                consecutive_failures,
                last_detail
                    .as_ref()
                    .map(|d| format!("\nLast error: {}", d))
                    .unwrap_or_default()
            ),
            AlertKind::Anomaly(anomaly) => format!(
                "[{}] ANOMALY ({}): {}",
                self.instance_name, anomaly.severity, anomaly.description
            ),
            AlertKind::Predictive {
                prediction,
                threshold,
            } => format!(
                "[{}] PREDICTIVE ALERT: {} projected to reach {:.1} within {} checks \
                 (threshold {:.1}, trend {:+.2} per check, confidence {:.0}%)",
                self.instance_name,
                prediction.metric_key.label(),
                prediction.projected_value,
                prediction.horizon_steps,
                threshold,
                prediction.slope,
                prediction.confidence * 100.0
            ),
        }
    }

    /// Deliver `alert` to `recipients` unless an identical alert is cooling down
    pub async fn dispatch(&self, mut alert: Alert, recipients: &[String]) -> DispatchOutcome {
        let now = Utc::now();
        {
            let mut state = self.state.lock().await;
            if state.in_cooldown(&alert, now) {
                debug!(dedupe_key = %alert.dedupe_key, "Alert suppressed by cooldown");
                return DispatchOutcome::Suppressed;
            }
            if recipients.is_empty() {
                warn!(
                    dedupe_key = %alert.dedupe_key,
                    "No recipients configured, alert recorded without delivery"
                );
                state.recent.insert(alert.dedupe_key.clone(), now);
                state.record(alert);
                return DispatchOutcome::NoRoute;
            }
        }

        let mut delivered = 0usize;
        let mut last_error = None;
        for recipient in recipients {
            match self.channel.send(recipient, &alert.message).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        channel = self.channel.name(),
                        recipient = %recipient,
                        error = %e,
                        "Notification delivery failed"
                    );
                    last_error = Some(e.to_string());
                }
            }
        }

        let mut state = self.state.lock().await;
        if delivered > 0 {
            alert.delivered = true;
            state.recent.insert(alert.dedupe_key.clone(), Utc::now());
            state.record(alert);
            DispatchOutcome::Delivered
        } else {
            state.record(alert);
            DispatchOutcome::Failed(last_error.unwrap_or_else(|| "no delivery".to_string()))
        }
    }

    /// Mark active alerts with `dedupe_key` as resolved
    pub async fn resolve(&self, dedupe_key: &str) -> usize {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        state.recent.remove(dedupe_key);
        let mut resolved = 0;
        for alert in state
            .log
            .iter_mut()
            .filter(|a| a.is_active() && a.dedupe_key == dedupe_key)
        {
            alert.resolved_at = Some(now);
            resolved += 1;
        }
        resolved
    }

    /// Alerts not yet resolved, newest first
    pub async fn active_alerts(&self) -> Vec<Alert> {
        let mut state = self.state.lock().await;
        state.expire(Utc::now());
        state.log.iter().rev().filter(|a| a.is_active()).cloned().collect()
    }

    /// The newest `limit` alerts, newest first
    pub async fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        let state = self.state.lock().await;
        state.log.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MonitorError, MonitorResult};
    use crate::models::{Anomaly, AnomalySeverity, MetricKey};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct RecordingChannel {
        sent: std::sync::Mutex<Vec<(String, String)>>,
        failing: AtomicBool,
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        async fn send(&self, recipient: &str, text: &str) -> MonitorResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(MonitorError::delivery(recipient, "offline"));
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

    fn service_down(target: &str) -> AlertKind {
        AlertKind::ServiceDown {
            target: target.to_string(),
            consecutive_failures: 3,
            last_detail: Some("timed out after 10000ms".to_string()),
        }
    }

    fn anomaly() -> AlertKind {
        AlertKind::Anomaly(Anomaly {
            metric_key: MetricKey::CpuUsage,
            value: 97.0,
            mean: 40.0,
            std_dev: 5.0,
            z_score: 11.4,
            severity: AnomalySeverity::Critical,
            description: "CPU usage at 97.00 is 11.4σ above the recent mean".to_string(),
            detected_at: Utc::now(),
        })
    }

    fn recipients() -> Vec<String> {
        vec!["ops".to_string()]
    }

    #[tokio::test]
    async fn test_deduplication_within_cooldown() {
        let channel = Arc::new(RecordingChannel::default());
        let dispatcher = AlertDispatcher::new(channel.clone(), "node-1");

        let first = dispatcher.create_alert(service_down("api"), &[]);
        assert_eq!(dispatcher.dispatch(first, &recipients()).await, DispatchOutcome::Delivered);

        let second = dispatcher.create_alert(service_down("api"), &[]);
        assert_eq!(dispatcher.dispatch(second, &recipients()).await, DispatchOutcome::Suppressed);

        // Different key is not deduplicated
        let other = dispatcher.create_alert(service_down("db"), &[]);
        assert!(dispatcher.dispatch(other, &recipients()).await.is_delivered());

        assert_eq!(channel.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cooldown_expiry_allows_resend() {
        let channel = Arc::new(RecordingChannel::default());
        let dispatcher = AlertDispatcher::new(channel.clone(), "node-1").with_rules(AlertRules {
            anomaly_cooldown: Duration::from_millis(50),
            predictive_cooldown: Duration::from_millis(50),
            service_down_cooldown: Duration::from_millis(50),
        });

        let alert = dispatcher.create_alert(anomaly(), &[]);
        assert!(dispatcher.dispatch(alert, &recipients()).await.is_delivered());

        tokio::time::sleep(Duration::from_millis(80)).await;

        let alert = dispatcher.create_alert(anomaly(), &[]);
        assert!(dispatcher.dispatch(alert, &recipients()).await.is_delivered());
        assert_eq!(channel.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_oversized_cooldown_still_deduplicates() {
        let config = AlertConfig {
            anomaly_cooldown_mins: u64::MAX / 2,
            service_down_cooldown_mins: u64::MAX,
            ..AlertConfig::default()
        };
        let rules = AlertRules::from_config(&config);
        assert_eq!(rules.anomaly_cooldown, Duration::from_secs(u64::MAX));

        let channel = Arc::new(RecordingChannel::default());
        let dispatcher = AlertDispatcher::new(channel.clone(), "node-1").with_rules(rules);
        for _ in 0..2 {
            let alert = dispatcher.create_alert(anomaly(), &[]);
            dispatcher.dispatch(alert, &recipients()).await;
            let alert = dispatcher.create_alert(service_down("api"), &[]);
            dispatcher.dispatch(alert, &recipients()).await;
        }

        assert_eq!(channel.sent.lock().unwrap().len(), 2);
        assert_eq!(dispatcher.active_alerts().await.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_recorded_and_retried() {
        let channel = Arc::new(RecordingChannel::default());
        channel.failing.store(true, Ordering::SeqCst);
        let dispatcher = AlertDispatcher::new(channel.clone(), "node-1");

        let alert = dispatcher.create_alert(service_down("api"), &[]);
        let outcome = dispatcher.dispatch(alert, &recipients()).await;
        assert!(matches!(outcome, DispatchOutcome::Failed(ref reason) if reason.contains("offline")));
        assert!(!outcome.is_handled());

        let log = dispatcher.recent_alerts(10).await;
        assert_eq!(log.len(), 1);
        assert!(!log[0].delivered);

        // Not in cooldown, so the next attempt goes out
        channel.failing.store(false, Ordering::SeqCst);
        let alert = dispatcher.create_alert(service_down("api"), &[]);
        assert!(dispatcher.dispatch(alert, &recipients()).await.is_delivered());
    }

    #[tokio::test]
    async fn test_no_recipients_records_without_sending() {
        let channel = Arc::new(RecordingChannel::default());
        let dispatcher = AlertDispatcher::new(channel.clone(), "node-1");

        let alert = dispatcher.create_alert(anomaly(), &[]);
        assert_eq!(dispatcher.dispatch(alert, &[]).await, DispatchOutcome::NoRoute);
        assert!(channel.sent.lock().unwrap().is_empty());
        assert_eq!(dispatcher.active_alerts().await.len(), 1);

        let alert = dispatcher.create_alert(anomaly(), &[]);
        assert_eq!(dispatcher.dispatch(alert, &[]).await, DispatchOutcome::Suppressed);
    }

    #[tokio::test]
    async fn test_resolve_service_down() {
        let dispatcher = AlertDispatcher::new(Arc::new(RecordingChannel::default()), "node-1");
        let alert = dispatcher.create_alert(service_down("api"), &[]);
        dispatcher.dispatch(alert, &recipients()).await;
        assert_eq!(dispatcher.active_alerts().await.len(), 1);

        assert_eq!(dispatcher.resolve("service_down:api").await, 1);
        assert!(dispatcher.active_alerts().await.is_empty());

        // Resolution clears the cooldown so a new outage alerts again
        let alert = dispatcher.create_alert(service_down("api"), &[]);
        assert!(dispatcher.dispatch(alert, &recipients()).await.is_delivered());
    }

    #[test]
    fn test_message_formatting() {
        let dispatcher = AlertDispatcher::new(Arc::new(RecordingChannel::default()), "node-1");

        let alert = dispatcher.create_alert(service_down("api"), &["deploy from ci".to_string()]);
        assert!(alert.message.starts_with("[node-1] SERVICE DOWN: api"));
        assert!(alert.message.contains("Last error: timed out"));
        assert!(alert.message.contains("Recent events:\n- deploy from ci"));
        assert_eq!(alert.dedupe_key, "service_down:api");
        assert!(alert.id.starts_with("service_down-"));

        let alert = dispatcher.create_alert(anomaly(), &[]);
        assert!(alert.message.contains("ANOMALY (critical)"));
    }
}

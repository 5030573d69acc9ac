//! Per-target rolling health state
//!
//! 1..threshold-1 consecutive failures read as `Degraded` (dashboard only),
//! reaching the threshold moves the target to `Critical` and requests a
//! service-down alert. Any success resets the target to `Healthy`.

use crate::models::{HealthState, ServiceHealth};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Default consecutive failures before a target is critical
pub const DEFAULT_ALERT_THRESHOLD: u32 = 3;

/// Rolling state of one target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceTargetState {
    pub name: String,
    pub consecutive_failures: u32,
    pub current_state: HealthState,
    pub last_transition_at: DateTime<Utc>,
    pub alert_threshold: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_detail: Option<String>,
    /// A service-down alert was requested and not yet acknowledged
    #[serde(skip)]
    alert_pending: bool,
}

impl ServiceTargetState {
    fn new(name: &str, alert_threshold: u32) -> Self {
        Self {
            name: name.to_string(),
            consecutive_failures: 0,
            current_state: HealthState::Healthy,
            last_transition_at: Utc::now(),
            alert_threshold: alert_threshold.max(1),
            last_detail: None,
            alert_pending: false,
        }
    }

    fn transition(&mut self, state: HealthState) -> Option<HealthState> {
        if self.current_state == state {
            return None;
        }
        let previous = self.current_state;
        self.current_state = state;
        self.last_transition_at = Utc::now();
        Some(previous)
    }
}

/// Something the caller should act on after a probe result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TargetEvent {
    /// Target reached the failure threshold; send a service-down alert
    Down {
        target: String,
        consecutive_failures: u32,
        last_detail: Option<String>,
    },
    /// Target answered successfully after being degraded or critical
    Recovered { target: String, previous: HealthState },
    /// Target moved from healthy to degraded
    Degraded { target: String, consecutive_failures: u32 },
}

/// State machines for all configured targets
#[derive(Debug, Clone)]
pub struct ServiceStateTracker {
    default_threshold: u32,
    states: BTreeMap<String, ServiceTargetState>,
}

impl Default for ServiceStateTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_THRESHOLD)
    }
}

impl ServiceStateTracker {
    pub fn new(default_threshold: u32) -> Self {
        Self {
            default_threshold: default_threshold.max(1),
            states: BTreeMap::new(),
        }
    }

    /// Start tracking a target, keeping existing state if already tracked
    pub fn register(&mut self, name: &str, threshold: Option<u32>) {
        let threshold = threshold.unwrap_or(self.default_threshold);
        self.states
            .entry(name.to_string())
            .and_modify(|s| s.alert_threshold = threshold.max(1))
            .or_insert_with(|| ServiceTargetState::new(name, threshold));
    }

    /// Change the failure threshold of a tracked target
    pub fn set_threshold(&mut self, name: &str, threshold: u32) -> bool {
        match self.states.get_mut(name) {
            Some(state) => {
                state.alert_threshold = threshold.max(1);
                true
            }
            None => false,
        }
    }

    /// Feed one probe result, returning the event to act on, if any
    pub fn observe(&mut self, name: &str, health: &ServiceHealth) -> Option<TargetEvent> {
        if !self.states.contains_key(name) {
            self.register(name, None);
        }
        let state = self.states.get_mut(name)?;

        if health.is_success() {
            state.consecutive_failures = 0;
            state.alert_pending = false;
            state.last_detail = None;
            return state
                .transition(HealthState::Healthy)
                .map(|previous| TargetEvent::Recovered {
                    target: name.to_string(),
                    previous,
                });
        }

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_detail = health.detail.clone();

        if state.consecutive_failures >= state.alert_threshold {
            let newly_critical = state.transition(HealthState::Critical).is_some();
            if newly_critical {
                state.alert_pending = true;
            }
            // Re-request while an earlier request is still unacknowledged
            return state.alert_pending.then(|| TargetEvent::Down {
                target: name.to_string(),
                consecutive_failures: state.consecutive_failures,
                last_detail: state.last_detail.clone(),
            });
        }

        state
            .transition(HealthState::Degraded)
            .map(|_| TargetEvent::Degraded {
                target: name.to_string(),
                consecutive_failures: state.consecutive_failures,
            })
    }

    /// The service-down alert for `name` was handled; stop re-requesting it
    pub fn acknowledge_alert(&mut self, name: &str) {
        if let Some(state) = self.states.get_mut(name) {
            state.alert_pending = false;
        }
    }

    pub fn state(&self, name: &str) -> Option<&ServiceTargetState> {
        self.states.get(name)
    }

    pub fn states(&self) -> impl Iterator<Item = &ServiceTargetState> {
        self.states.values()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Aggregate status: healthy if all are, critical if none are
    pub fn overall_status(&self) -> HealthState {
        overall_status(self.states.values().map(|s| s.current_state))
    }
}

/// Combine target states into one dashboard status
///
/// No targets at all counts as healthy.
pub fn overall_status(states: impl IntoIterator<Item = HealthState>) -> HealthState {
    let mut total = 0usize;
    let mut healthy = 0usize;
    for state in states {
        total += 1;
        if state == HealthState::Healthy {
            healthy += 1;
        }
    }

    if healthy == total {
        HealthState::Healthy
    } else if healthy == 0 {
        HealthState::Critical
    } else {
        HealthState::Degraded
    }
}

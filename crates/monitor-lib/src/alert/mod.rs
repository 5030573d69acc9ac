//! Alert creation and delivery
//!
//! This module provides:
//! - The notification channel seam and its webhook/log implementations
//! - Deduplication of alerts within per-kind cooldowns
//! - The in-memory alert log behind the dashboard's active alerts

mod dispatcher;
mod notification;

pub use dispatcher::{AlertDispatcher, AlertRules, DispatchOutcome};
pub use notification::{channel_from_config, LogChannel, NotificationChannel, WebhookChannel};

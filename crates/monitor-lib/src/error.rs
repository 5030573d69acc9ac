//! Error taxonomy of the monitor
//!
//! Probe failures and insufficient history are not errors at this level:
//! probes fold them into `ServiceHealth::Error` and the analysers abstain.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Rejected configuration, e.g. a malformed target URL
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Loading or saving the history backup failed
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// The notification channel did not accept a message
    #[error("notification delivery failed for {recipient}: {reason}")]
    NotificationDelivery { recipient: String, reason: String },

    /// A probe could not be executed at all (never raised for timeouts)
    #[error("probe failure for {target}: {reason}")]
    Probe { target: String, reason: String },
}

impl MonitorError {
    pub fn config(message: impl Into<String>) -> Self {
        MonitorError::Configuration(message.into())
    }

    pub fn delivery(recipient: impl Into<String>, reason: impl Into<String>) -> Self {
        MonitorError::NotificationDelivery {
            recipient: recipient.into(),
            reason: reason.into(),
        }
    }
}

pub type MonitorResult<T> = std::result::Result<T, MonitorError>;

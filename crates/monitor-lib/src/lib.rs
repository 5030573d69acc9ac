//! Service monitor library
//!
//! This crate provides the core functionality for:
//! - HTTP health probes and host resource sampling
//! - Bounded snapshot history with backup and restore
//! - Z-score anomaly detection and linear trend prediction
//! - Per-target health state tracking and alert dispatch
//! - Skip-if-busy task scheduling, health checks and observability

pub mod agent;
pub mod alert;
pub mod anomaly;
pub mod config;
pub mod error;
pub mod health;
pub mod history;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod probe;
pub mod scheduler;
pub mod tracker;

pub use agent::Agent;
pub use config::MonitorConfig;
pub use error::{MonitorError, MonitorResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use scheduler::{RunOutcome, Scheduler, TaskKind};

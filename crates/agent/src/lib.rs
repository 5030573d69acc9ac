//! Service monitor agent
//!
//! Wires the monitor library to its production collaborators and exposes
//! the HTTP surface. The binary in `main.rs` drives the lifecycle.

pub mod api;
pub mod config;

use anyhow::{Context, Result};
use monitor_lib::{
    alert::channel_from_config,
    probe::{HttpProbe, SysinfoSampler},
    Agent, MonitorConfig,
};
use std::sync::Arc;

/// Build an agent probing over HTTP, sampling this host and notifying
/// through the configured channel
pub fn build_agent(config: MonitorConfig) -> Result<Arc<Agent>> {
    let probe = HttpProbe::new().context("Failed to create HTTP probe")?;
    let channel =
        channel_from_config(&config.notification).context("Failed to create notification channel")?;

    let agent = Agent::new(
        config,
        Arc::new(probe),
        Arc::new(SysinfoSampler::new()),
        channel,
    )
    .context("Failed to initialize agent")?;

    Ok(Arc::new(agent))
}

//! Service monitor agent
//!
//! Probes the configured targets on a schedule, detects anomalies and
//! trends in the collected history, and dispatches alerts.

use anyhow::Result;
use monitor_lib::agent::AGENT_VERSION;
use monitor_agent::{api, build_agent, config};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting monitor-agent");

    let config = config::load()?;
    let api_port = config.api_port;
    info!(
        instance = %config.instance_name,
        targets = config.targets.len(),
        "Agent configured"
    );

    let agent = build_agent(config)?;
    let logger = agent.logger().clone();

    agent.restore_history().await;

    let scheduler = Arc::new(agent.scheduler());
    let (shutdown_tx, _) = broadcast::channel(1);
    let task_handles = scheduler.spawn(&shutdown_tx);

    let app_state = Arc::new(api::AppState::new(agent.clone(), scheduler.clone()));
    let api_handle = tokio::spawn(api::serve(api_port, app_state, shutdown_tx.subscribe()));

    agent.health_registry().set_ready(true).await;
    logger.log_startup(AGENT_VERSION, agent.targets().len());

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    agent.health_registry().set_ready(false).await;

    // Stop the timers; in-flight runs finish before their handles complete
    let _ = shutdown_tx.send(());
    for handle in task_handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Scheduled task ended abnormally");
        }
    }

    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task ended abnormally"),
        Ok(Ok(())) => {}
    }

    if let Err(e) = agent.backup_history().await {
        error!(error = %e, "Final history backup failed");
    }

    info!("Shutdown complete");
    Ok(())
}

//! Service monitor CLI
//!
//! A command-line tool for inspecting the monitor agent, triggering
//! checks, tuning alert routing and submitting external events.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::EventRequest;
use commands::{alerts, events, monitor};

/// Service monitor CLI
#[derive(Parser)]
#[command(name = "monitorctl")]
#[command(author, version, about = "CLI for the service monitor agent", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via MONITOR_API_URL env var)
    #[arg(long, env = "MONITOR_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show target states, predictions and active alerts
    Status,

    /// Show the agent's own health
    Health,

    /// Show recent snapshots, anomalies and events
    Metrics {
        /// Number of recent snapshots to fetch
        #[arg(long, short, default_value_t = 60)]
        window: usize,
    },

    /// Run a probe cycle now
    Check,

    /// Change alert thresholds, recipients and cooldowns
    Configure {
        /// Apply threshold and recipients to this target only
        #[arg(long, short)]
        target: Option<String>,

        /// Consecutive failures before a service-down alert
        #[arg(long)]
        threshold: Option<u32>,

        /// Alert recipient (repeatable)
        #[arg(long = "recipient", short)]
        recipients: Vec<String>,

        /// Minutes before the same anomaly alerts again
        #[arg(long)]
        anomaly_cooldown: Option<u64>,

        /// Minutes before the same prediction alerts again
        #[arg(long)]
        predictive_cooldown: Option<u64>,

        /// Minutes before the same service-down alert repeats
        #[arg(long)]
        service_down_cooldown: Option<u64>,
    },

    /// Submit an external event (deploy, incident, ...)
    Event {
        /// Event source, e.g. ci
        #[arg(long, short)]
        source: String,

        /// Event kind, e.g. deploy
        #[arg(long, short)]
        kind: String,

        /// Free-form description
        #[arg(long, short)]
        message: Option<String>,

        /// Target the event relates to
        #[arg(long, short)]
        target: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let format = cli
        .format
        .or_else(|| {
            config
                .default_format
                .as_deref()
                .and_then(output::OutputFormat::from_name)
        })
        .unwrap_or_default();

    // Initialize client
    let api_url = config.resolve_api_url(cli.api_url);
    let client = client::ApiClient::new(&api_url)?;

    // Execute command
    match cli.command {
        Commands::Status => monitor::show_status(&client, format).await?,
        Commands::Health => monitor::show_health(&client, format).await?,
        Commands::Metrics { window } => monitor::show_metrics(&client, window, format).await?,
        Commands::Check => monitor::run_check(&client, format).await?,
        Commands::Configure {
            target,
            threshold,
            recipients,
            anomaly_cooldown,
            predictive_cooldown,
            service_down_cooldown,
        } => {
            let update = alerts::build_update(
                target,
                threshold,
                recipients,
                anomaly_cooldown,
                predictive_cooldown,
                service_down_cooldown,
            )?;
            alerts::configure(&client, update, format).await?;
        }
        Commands::Event {
            source,
            kind,
            message,
            target,
        } => {
            let request = EventRequest {
                source,
                kind,
                message,
                target,
            };
            events::send_event(&client, request, format).await?;
        }
    }

    Ok(())
}

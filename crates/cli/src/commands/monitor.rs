//! Status, health, metrics and on-demand check commands

use anyhow::Result;
use colored::Colorize;
use reqwest::StatusCode;
use tabled::{settings::Style, Table, Tabled};

use crate::client::{
    AgentHealth, ApiClient, ApiError, CheckResponse, Dashboard, MetricSnapshot, MetricsView,
    Prediction, TargetStatus,
};
use crate::output::{
    color_confidence, color_status, format_latency, format_pct, format_timestamp, format_uptime,
    print_info, print_json, print_success, print_warning, OutputFormat,
};

/// Row for the targets table
#[derive(Tabled)]
struct TargetRow {
    #[tabled(rename = "Target")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Failures")]
    failures: String,
    #[tabled(rename = "HTTP")]
    http_status: String,
    #[tabled(rename = "Latency")]
    latency: String,
    #[tabled(rename = "Since")]
    since: String,
}

impl From<&TargetStatus> for TargetRow {
    fn from(target: &TargetStatus) -> Self {
        let check = target.last_check.as_ref();
        Self {
            name: target.name.clone(),
            state: color_status(&target.current_state),
            failures: format!("{}/{}", target.consecutive_failures, target.alert_threshold),
            http_status: check
                .and_then(|c| c.http_status)
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            latency: format_latency(check.and_then(|c| c.response_time_ms)),
            since: format_timestamp(&target.last_transition_at),
        }
    }
}

/// Row for the predictions table
#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Trend")]
    trend: String,
    #[tabled(rename = "Slope/check")]
    slope: String,
    #[tabled(rename = "Projected")]
    projected: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Samples")]
    samples: usize,
}

impl From<&Prediction> for PredictionRow {
    fn from(p: &Prediction) -> Self {
        Self {
            metric: p.metric_key.clone(),
            trend: p.trend.clone(),
            slope: format!("{:+.3}", p.slope),
            projected: format!("{:.1} in {} checks", p.projected_value, p.horizon_steps),
            confidence: color_confidence(p.confidence),
            samples: p.samples,
        }
    }
}

/// Row for the service results of one snapshot
#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "Service")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "HTTP")]
    http_status: String,
    #[tabled(rename = "Latency")]
    latency: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

fn service_rows(snapshot: &MetricSnapshot) -> Vec<ServiceRow> {
    snapshot
        .services
        .iter()
        .map(|(name, health)| ServiceRow {
            name: name.clone(),
            status: color_status(&health.status),
            http_status: health
                .http_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            latency: format_latency(health.response_time_ms),
            detail: health.detail.clone().unwrap_or_default(),
        })
        .collect()
}

fn print_snapshot(snapshot: &MetricSnapshot) {
    println!("Sampled at: {}", format_timestamp(&snapshot.timestamp));
    println!(
        "CPU {}  Memory {}  Disk {}  Load {:.2}",
        format_pct(snapshot.system.cpu_usage_pct).cyan(),
        format_pct(snapshot.system.memory_usage_pct).cyan(),
        format_pct(snapshot.system.disk_usage_pct).cyan(),
        snapshot.system.load_average
    );
    println!();

    let rows = service_rows(snapshot);
    if !rows.is_empty() {
        let table = Table::new(rows).with(Style::rounded()).to_string();
        println!("{}", table);
    }
}

/// Show the dashboard: target states, predictions and active alerts
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let dashboard: Dashboard = client.get("dashboard").await?;

    match format {
        OutputFormat::Json => print_json(&dashboard)?,
        OutputFormat::Table => {
            println!("{}", "Service Monitor".bold());
            println!("{}", "=".repeat(60));
            println!("Instance: {}", dashboard.instance.cyan());
            println!("Overall:  {}", color_status(&dashboard.overall_status));
            println!();

            if dashboard.targets.is_empty() {
                print_warning("No targets configured");
            } else {
                let rows: Vec<TargetRow> = dashboard.targets.iter().map(TargetRow::from).collect();
                let table = Table::new(rows).with(Style::rounded()).to_string();
                println!("{}", table);
            }

            if !dashboard.predictions.is_empty() {
                println!("\n{}", "Predictions".bold());
                let rows: Vec<PredictionRow> =
                    dashboard.predictions.iter().map(PredictionRow::from).collect();
                let table = Table::new(rows).with(Style::rounded()).to_string();
                println!("{}", table);
            }

            if dashboard.active_alerts.is_empty() {
                println!();
                print_success("No active alerts");
            } else {
                println!("\n{}", "Active Alerts".bold());
                for alert in &dashboard.active_alerts {
                    let first_line = alert.message.lines().next().unwrap_or_default();
                    println!(
                        "  {} {} {}",
                        format_timestamp(&alert.created_at),
                        alert.dedupe_key.red(),
                        first_line
                    );
                }
            }
        }
    }

    Ok(())
}

/// Show the agent's own health
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: AgentHealth = match client.get("health").await {
        Ok(health) => health,
        // An unhealthy agent answers 503 with the same body
        Err(e) => match e.downcast_ref::<ApiError>() {
            Some(api) if api.status() == StatusCode::SERVICE_UNAVAILABLE => {
                print_warning("Agent reports unhealthy");
                return Err(e);
            }
            _ => return Err(e),
        },
    };

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!("{}", "Agent Health".bold());
            println!("{}", "=".repeat(50));
            println!("Instance:        {}", health.instance.cyan());
            println!("Version:         {}", health.version);
            println!("Status:          {}", color_status(&health.status));
            println!("Uptime:          {}", format_uptime(health.uptime_secs));
            println!("Targets:         {}", health.targets_tracked);
            println!("Active alerts:   {}", health.active_alerts);
            println!(
                "History:         {}/{} snapshots",
                health.history.entries, health.history.capacity
            );
            println!();
            println!("{}", "Components".bold());
            println!("{}", "-".repeat(50));
            for (name, component) in &health.components {
                match &component.message {
                    Some(message) => println!(
                        "  {:<14} {} ({})",
                        name,
                        color_status(&component.status),
                        message
                    ),
                    None => println!("  {:<14} {}", name, color_status(&component.status)),
                }
            }
        }
    }

    Ok(())
}

/// Show recent measurements, anomalies and events
pub async fn show_metrics(client: &ApiClient, window: usize, format: OutputFormat) -> Result<()> {
    let path = format!("metrics?window={}", window);
    let view: MetricsView = client.get(&path).await?;

    match format {
        OutputFormat::Json => print_json(&view)?,
        OutputFormat::Table => {
            println!("{}", "Latest Snapshot".bold());
            println!("{}", "=".repeat(60));
            match &view.latest {
                Some(snapshot) => print_snapshot(snapshot),
                None => print_info("No snapshots collected yet"),
            }

            println!(
                "\nHistory: {}/{} snapshots, showing {}",
                view.history.entries,
                view.history.capacity,
                view.recent.len()
            );

            if !view.anomalies.is_empty() {
                println!("\n{}", "Anomalies".bold());
                for anomaly in &view.anomalies {
                    println!(
                        "  [{}] {} (z={:.2})",
                        color_status(&anomaly.severity),
                        anomaly.description,
                        anomaly.z_score
                    );
                }
            }

            if !view.predictions.is_empty() {
                println!("\n{}", "Predictions".bold());
                let rows: Vec<PredictionRow> =
                    view.predictions.iter().map(PredictionRow::from).collect();
                let table = Table::new(rows).with(Style::rounded()).to_string();
                println!("{}", table);
            }

            if !view.recent_alerts.is_empty() {
                println!("\n{}", "Recent Alerts".bold());
                for alert in &view.recent_alerts {
                    let delivery = if alert.delivered {
                        "delivered".green()
                    } else {
                        "undelivered".red()
                    };
                    println!(
                        "  {} {} [{}]",
                        format_timestamp(&alert.created_at),
                        alert.dedupe_key,
                        delivery
                    );
                }
            }

            if !view.events.is_empty() {
                println!("\n{}", "Recent Events".bold());
                for event in &view.events {
                    println!(
                        "  {} {}/{}{}{}",
                        format_timestamp(&event.received_at),
                        event.source,
                        event.kind,
                        event
                            .target
                            .as_ref()
                            .map(|t| format!(" on {}", t))
                            .unwrap_or_default(),
                        event
                            .message
                            .as_ref()
                            .map(|m| format!(": {}", m))
                            .unwrap_or_default()
                    );
                }
            }
        }
    }

    Ok(())
}

/// Trigger a probe cycle and show its snapshot
pub async fn run_check(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response: CheckResponse = match client.post("check", &serde_json::json!({})).await {
        Ok(response) => response,
        Err(e) => match e.downcast_ref::<ApiError>() {
            Some(api) if api.status() == StatusCode::CONFLICT => {
                print_warning("A probe cycle is already running; try again shortly");
                return Ok(());
            }
            _ => return Err(e),
        },
    };

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_success("Probe cycle completed");
            if let Some(snapshot) = &response.snapshot {
                println!();
                print_snapshot(snapshot);
            }
        }
    }

    Ok(())
}

//! Alert configuration command

use anyhow::{bail, Result};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use crate::client::{AlertSettings, AlertSettingsUpdate, ApiClient};
use crate::output::{print_json, print_success, OutputFormat};

/// Row for per-target alert routing
#[derive(Tabled)]
struct RoutingRow {
    #[tabled(rename = "Target")]
    name: String,
    #[tabled(rename = "Threshold")]
    threshold: u32,
    #[tabled(rename = "Recipients")]
    recipients: String,
}

/// Build the update body; at least one setting must change
pub fn build_update(
    target: Option<String>,
    threshold: Option<u32>,
    recipients: Vec<String>,
    anomaly_cooldown_mins: Option<u64>,
    predictive_cooldown_mins: Option<u64>,
    service_down_cooldown_mins: Option<u64>,
) -> Result<AlertSettingsUpdate> {
    if threshold == Some(0) {
        bail!("--threshold must be greater than zero");
    }

    let update = AlertSettingsUpdate {
        target,
        threshold,
        recipients: if recipients.is_empty() {
            None
        } else {
            Some(recipients)
        },
        anomaly_cooldown_mins,
        predictive_cooldown_mins,
        service_down_cooldown_mins,
    };

    if update.threshold.is_none()
        && update.recipients.is_none()
        && update.anomaly_cooldown_mins.is_none()
        && update.predictive_cooldown_mins.is_none()
        && update.service_down_cooldown_mins.is_none()
    {
        bail!("Nothing to configure: pass --threshold, --recipient or a cooldown");
    }

    Ok(update)
}

/// Apply alert settings and show the effective configuration
pub async fn configure(
    client: &ApiClient,
    update: AlertSettingsUpdate,
    format: OutputFormat,
) -> Result<()> {
    let settings: AlertSettings = client.post("alerts/configure", &update).await?;

    match format {
        OutputFormat::Json => print_json(&settings)?,
        OutputFormat::Table => {
            print_success("Alert settings updated");
            println!();
            println!("{}", "Defaults".bold());
            println!("{}", "-".repeat(50));
            println!("Threshold:            {}", settings.alerts.alert_threshold);
            println!("Recipients:           {}", settings.alerts.recipients.join(", "));
            println!(
                "Cooldowns (minutes):  anomaly {}, predictive {}, service down {}",
                settings.alerts.anomaly_cooldown_mins,
                settings.alerts.predictive_cooldown_mins,
                settings.alerts.service_down_cooldown_mins
            );
            println!();

            let rows: Vec<RoutingRow> = settings
                .targets
                .iter()
                .map(|t| RoutingRow {
                    name: t.name.clone(),
                    threshold: t.alert_threshold,
                    recipients: t.recipients.join(", "),
                })
                .collect();
            let table = Table::new(rows).with(Style::rounded()).to_string();
            println!("{}", table);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_update_for_target() {
        let update = build_update(
            Some("billing".to_string()),
            Some(5),
            vec!["oncall".to_string()],
            None,
            None,
            None,
        )
        .unwrap();

        assert_eq!(update.target.as_deref(), Some("billing"));
        assert_eq!(update.threshold, Some(5));
        assert_eq!(update.recipients, Some(vec!["oncall".to_string()]));
    }

    #[test]
    fn test_build_update_requires_a_change() {
        let err = build_update(Some("billing".to_string()), None, vec![], None, None, None)
            .unwrap_err();
        assert!(err.to_string().contains("Nothing to configure"));
    }

    #[test]
    fn test_build_update_rejects_zero_threshold() {
        assert!(build_update(None, Some(0), vec![], None, None, None).is_err());
    }

    #[test]
    fn test_cooldown_only_update_is_valid() {
        let update = build_update(None, None, vec![], Some(10), None, None).unwrap();
        assert_eq!(update.anomaly_cooldown_mins, Some(10));
        assert!(update.recipients.is_none());
    }
}

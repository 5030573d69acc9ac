//! API client for communicating with the monitor agent

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// Non-success answer from the agent
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API error ({status}): {message}")]
    Status { status: StatusCode, message: String },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Status { status, .. } => *status,
        }
    }
}

/// API client for the monitor agent
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(ApiError::Status { status, message }.into());
        }

        response.json().await.context("Failed to parse response")
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryStats {
    pub entries: usize,
    pub capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    pub status: String,
    pub instance: String,
    pub version: String,
    pub started_at: String,
    pub uptime_secs: i64,
    pub targets_tracked: usize,
    pub active_alerts: usize,
    pub history: HistoryStats,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetStatus {
    pub name: String,
    pub url: String,
    pub current_state: String,
    pub consecutive_failures: u32,
    pub alert_threshold: u32,
    pub last_transition_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<ServiceHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub metric_key: String,
    pub slope: f64,
    pub projected_value: f64,
    pub confidence: f64,
    pub trend: String,
    pub horizon_steps: usize,
    pub samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub dedupe_key: String,
    pub message: String,
    pub created_at: String,
    pub delivered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub instance: String,
    pub overall_status: String,
    pub targets: Vec<TargetStatus>,
    pub predictions: Vec<Prediction>,
    pub active_alerts: Vec<Alert>,
    pub generated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_usage_pct: f64,
    pub memory_usage_pct: f64,
    pub disk_usage_pct: f64,
    pub load_average: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub timestamp: String,
    pub services: BTreeMap<String, ServiceHealth>,
    pub system: SystemMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub metric_key: String,
    pub value: f64,
    pub z_score: f64,
    pub severity: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub source: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub received_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsView {
    pub latest: Option<MetricSnapshot>,
    pub recent: Vec<MetricSnapshot>,
    pub predictions: Vec<Prediction>,
    pub anomalies: Vec<Anomaly>,
    pub events: Vec<ExternalEvent>,
    #[serde(default)]
    pub recent_alerts: Vec<Alert>,
    pub history: HistoryStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<MetricSnapshot>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertSettingsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipients: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_cooldown_mins: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predictive_cooldown_mins: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_down_cooldown_mins: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDefaults {
    pub alert_threshold: u32,
    pub recipients: Vec<String>,
    pub anomaly_cooldown_mins: u64,
    pub predictive_cooldown_mins: u64,
    pub service_down_cooldown_mins: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetAlertSettings {
    pub name: String,
    pub alert_threshold: u32,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSettings {
    pub alerts: AlertDefaults,
    pub targets: Vec<TargetAlertSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRequest {
    pub source: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResponse {
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_get_parses_health() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "status": "degraded",
                    "instance": "prod-monitor",
                    "version": "0.1.0",
                    "started_at": "2026-10-16T08:00:00Z",
                    "uptime_secs": 3600,
                    "targets_tracked": 3,
                    "active_alerts": 1,
                    "history": {"entries": 120, "capacity": 1440},
                    "components": {
                        "notifier": {"status": "degraded", "message": "gateway offline", "last_check_timestamp": 0}
                    }
                }"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let health: AgentHealth = client.get("health").await.unwrap();

        mock.assert_async().await;
        assert_eq!(health.status, "degraded");
        assert_eq!(health.history.entries, 120);
        assert_eq!(
            health.components["notifier"].message.as_deref(),
            Some("gateway offline")
        );
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/webhook/event")
            .match_body(Matcher::Json(serde_json::json!({
                "source": "ci",
                "kind": "deploy"
            })))
            .with_status(200)
            .with_body(r#"{"accepted": true}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let request = EventRequest {
            source: "ci".to_string(),
            kind: "deploy".to_string(),
            message: None,
            target: None,
        };
        let response: EventResponse = client.post("webhook/event", &request).await.unwrap();

        mock.assert_async().await;
        assert!(response.accepted);
    }

    #[tokio::test]
    async fn test_error_body_becomes_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/alerts/configure")
            .with_status(400)
            .with_body(r#"{"error": "Configuration error: unknown target 'nope'"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .post::<AlertSettings, _>("alerts/configure", &AlertSettingsUpdate::default())
            .await
            .unwrap_err();

        let api_error = err.downcast_ref::<ApiError>().unwrap();
        assert_eq!(api_error.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("unknown target 'nope'"));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(ApiClient::new("not a url").is_err());
    }
}

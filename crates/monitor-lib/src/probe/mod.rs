//! Health probes and host sampling
//!
//! A probe issues one bounded-timeout HTTP check against a target and
//! always returns a `ServiceHealth`; timeouts and connection failures are
//! folded into `ServiceStatus::Error` instead of being raised.

mod system;

pub use system::{SysinfoSampler, SystemSampler};

use crate::error::{MonitorError, MonitorResult};
use crate::models::{ServiceHealth, ServiceTarget};
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default per-probe timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Trait for single-target health checks
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Check one target; never fails, errors become `ServiceStatus::Error`
    async fn probe(&self, target: &ServiceTarget) -> ServiceHealth;
}

/// HTTP reachability and latency probe
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    /// Create a probe with a shared connection pool
    pub fn new() -> MonitorResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("service-monitor/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(DEFAULT_PROBE_TIMEOUT)
            .build()
            .map_err(|e| MonitorError::config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Issue the request, returning status code and elapsed milliseconds
    async fn request(&self, target: &ServiceTarget) -> MonitorResult<(u16, f64)> {
        let start = Instant::now();
        let send = self.client.get(&target.url).timeout(target.timeout).send();

        let response = tokio::time::timeout(target.timeout, send)
            .await
            .map_err(|_| timed_out(target))?
            .map_err(|e| {
                if e.is_timeout() {
                    timed_out(target)
                } else {
                    MonitorError::Probe {
                        target: target.name.clone(),
                        reason: format!("connection failed: {}", e),
                    }
                }
            })?;

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        Ok((response.status().as_u16(), elapsed_ms))
    }
}

fn timed_out(target: &ServiceTarget) -> MonitorError {
    MonitorError::Probe {
        target: target.name.clone(),
        reason: format!("timed out after {}ms", target.timeout.as_millis()),
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, target: &ServiceTarget) -> ServiceHealth {
        match self.request(target).await {
            Ok((status, elapsed_ms)) if (200..300).contains(&status) => {
                ServiceHealth::healthy(status, elapsed_ms)
            }
            Ok((status, elapsed_ms)) => ServiceHealth::unhealthy(status, elapsed_ms),
            Err(e) => {
                debug!(target = %target.name, error = %e, "Probe failed");
                ServiceHealth::error(e.to_string())
            }
        }
    }
}

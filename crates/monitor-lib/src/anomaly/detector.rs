//! Z-score anomaly detection
//!
//! Each tracked metric of the current snapshot is compared with the last
//! `window` historical values of the same metric. Detection abstains during
//! warm-up and for metrics with too few samples or a flat history.

use crate::config::AnomalyConfig;
use crate::history::HistoryStore;
use crate::models::{Anomaly, AnomalySeverity, MetricKey, MetricSnapshot};
use chrono::Utc;

/// Minimum values per metric required for detection
pub const MIN_SAMPLES_FOR_DETECTION: usize = 5;

/// Snapshots required in history before any detection runs
pub const WARMUP_SNAPSHOTS: usize = 10;

/// Default number of historical values compared against
const DEFAULT_WINDOW: usize = 50;

/// Detects statistically anomalous current values
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    /// Number of standard deviations to consider anomalous
    pub std_dev_threshold: f64,
    /// Historical values per metric
    pub window: usize,
    pub min_samples: usize,
    pub warmup_snapshots: usize,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self {
            std_dev_threshold: 2.0,
            window: DEFAULT_WINDOW,
            min_samples: MIN_SAMPLES_FOR_DETECTION,
            warmup_snapshots: WARMUP_SNAPSHOTS,
        }
    }
}

impl AnomalyDetector {
    pub fn new(std_dev_threshold: f64) -> Self {
        Self {
            std_dev_threshold,
            ..Default::default()
        }
    }

    pub fn from_config(config: &AnomalyConfig) -> Self {
        Self {
            std_dev_threshold: config.std_dev_threshold,
            window: config.window,
            min_samples: config.min_samples,
            warmup_snapshots: config.warmup_snapshots,
        }
    }

    /// Evaluate every metric of `current` against `history`
    ///
    /// `history` must not contain `current`. Metrics are independent, so
    /// one cycle may produce any number of anomalies.
    pub fn detect(&self, current: &MetricSnapshot, history: &HistoryStore) -> Vec<Anomaly> {
        if history.len() < self.warmup_snapshots {
            return Vec::new();
        }

        current
            .metric_keys()
            .into_iter()
            .filter_map(|key| {
                let value = current.value(&key)?;
                let stats = SeriesStats::from_values(&history.values(&key, self.window));
                self.evaluate(key, value, &stats)
            })
            .collect()
    }

    /// Check one value against the statistics of its history
    pub fn evaluate(&self, key: MetricKey, value: f64, stats: &SeriesStats) -> Option<Anomaly> {
        if stats.count < self.min_samples {
            return None;
        }

        // Flat history: no basis for a z-score
        if stats.std_dev < f64::EPSILON {
            return None;
        }

        let deviation = value - stats.mean;
        if deviation.abs() <= self.std_dev_threshold * stats.std_dev {
            return None;
        }

        let z_score = deviation / stats.std_dev;
        let severity = AnomalySeverity::from_z_score(z_score);
        let direction = if deviation > 0.0 { "above" } else { "below" };
        let description = format!(
            "{} at {:.2} is {:.1}σ {} the recent mean of {:.2} (σ = {:.2})",
            key.label(),
            value,
            z_score.abs(),
            direction,
            stats.mean,
            stats.std_dev
        );

        Some(Anomaly {
            metric_key: key,
            value,
            mean: stats.mean,
            std_dev: stats.std_dev,
            z_score,
            severity,
            description,
            detected_at: Utc::now(),
        })
    }
}

/// Mean and sample standard deviation of a series
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SeriesStats {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

impl SeriesStats {
    pub fn from_values(values: &[f64]) -> Self {
        let count = values.len();
        if count == 0 {
            return Self::default();
        }

        let mean = values.iter().sum::<f64>() / count as f64;

        // Two-pass variance with Bessel's correction
        let std_dev = if count > 1 {
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / (count - 1) as f64;
            variance.sqrt()
        } else {
            0.0
        };

        Self {
            mean,
            std_dev,
            count,
        }
    }
}

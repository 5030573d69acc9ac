//! Trend prediction engine
//!
//! Fits a least-squares line to the most recent samples of a metric and
//! projects it forward. The predictor is metric-agnostic; callers decide
//! which metrics to project and which projected values are alarming.

mod trend;

pub use trend::{linear_regression, LinearFit, TrendPredictor, MIN_SAMPLES, SAMPLE_WINDOW};

use crate::config::PredictionConfig;
use crate::models::{MetricKey, TrendPrediction};

/// A metric watched for exhaustion and the projected value that alerts
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRule {
    pub metric_key: MetricKey,
    pub threshold: f64,
}

impl PredictionRule {
    /// Rules for cpu, memory and disk from configuration
    pub fn defaults_from(config: &PredictionConfig) -> Vec<PredictionRule> {
        vec![
            PredictionRule {
                metric_key: MetricKey::CpuUsage,
                threshold: config.cpu_threshold,
            },
            PredictionRule {
                metric_key: MetricKey::MemoryUsage,
                threshold: config.memory_threshold,
            },
            PredictionRule {
                metric_key: MetricKey::DiskUsage,
                threshold: config.disk_threshold,
            },
        ]
    }

    /// Whether a prediction should raise a predictive alert
    pub fn is_breached(&self, prediction: &TrendPrediction, min_confidence: f64) -> bool {
        prediction.metric_key == self.metric_key
            && prediction.samples > 0
            && prediction.confidence >= min_confidence
            && prediction.projected_value > self.threshold
    }
}

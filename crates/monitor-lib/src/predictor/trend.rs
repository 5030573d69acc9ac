//! Linear trend regression

use crate::config::PredictionConfig;
use crate::history::HistoryStore;
use crate::models::{MetricKey, Trend, TrendPrediction};
use chrono::Utc;

/// Samples fitted per prediction
pub const SAMPLE_WINDOW: usize = 20;

/// Minimum samples required before a fit is attempted
pub const MIN_SAMPLES: usize = 10;

/// Result of an ordinary least-squares fit of value against sample index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

/// Fit `y = slope * x + intercept` with `x = 0, 1, 2, ...`
///
/// Returns `None` for fewer than two points. R² is 0 for a flat series.
pub fn linear_regression(values: &[f64]) -> Option<LinearFit> {
    let n = values.len() as f64;
    if values.len() < 2 {
        return None;
    }

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;

    for (i, y) in values.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        return None;
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;

    let mean_y = sum_y / n;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (i, y) in values.iter().enumerate() {
        let predicted = slope * i as f64 + intercept;
        ss_res += (y - predicted).powi(2);
        ss_tot += (y - mean_y).powi(2);
    }

    let r_squared = if ss_tot.abs() < f64::EPSILON {
        0.0
    } else {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    };

    Some(LinearFit {
        slope,
        intercept,
        r_squared,
    })
}

/// Projects metric values forward from their recent linear trend
#[derive(Debug, Clone)]
pub struct TrendPredictor {
    pub sample_window: usize,
    pub min_samples: usize,
}

impl Default for TrendPredictor {
    fn default() -> Self {
        Self {
            sample_window: SAMPLE_WINDOW,
            min_samples: MIN_SAMPLES,
        }
    }
}

impl TrendPredictor {
    pub fn from_config(config: &PredictionConfig) -> Self {
        Self {
            sample_window: config.sample_window,
            min_samples: config.min_samples.max(2),
        }
    }

    /// Predict `metric_key` `horizon_steps` samples past the end of history
    pub fn predict(
        &self,
        history: &HistoryStore,
        metric_key: &MetricKey,
        horizon_steps: usize,
    ) -> TrendPrediction {
        let values = history.values(metric_key, self.sample_window);
        self.predict_values(metric_key.clone(), &values, horizon_steps)
    }

    /// Predict from an explicit series, oldest first
    pub fn predict_values(
        &self,
        metric_key: MetricKey,
        values: &[f64],
        horizon_steps: usize,
    ) -> TrendPrediction {
        if values.len() < self.min_samples {
            return TrendPrediction::insufficient(metric_key, values.len(), horizon_steps);
        }

        let Some(fit) = linear_regression(values) else {
            return TrendPrediction::insufficient(metric_key, values.len(), horizon_steps);
        };

        let n = values.len() as f64;
        let mut projected_value = fit.slope * (n + horizon_steps as f64) + fit.intercept;
        if metric_key.is_percentage() {
            projected_value = projected_value.clamp(0.0, 100.0);
        }

        let trend = if fit.slope > 0.0 {
            Trend::Increasing
        } else if fit.slope < 0.0 {
            Trend::Decreasing
        } else {
            Trend::Stable
        };

        TrendPrediction {
            metric_key,
            slope: fit.slope,
            intercept: fit.intercept,
            projected_value,
            confidence: fit.r_squared,
            trend,
            horizon_steps,
            samples: values.len(),
            sampled_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricSnapshot, SystemMetrics};
    use std::collections::BTreeMap;

    fn history_of(cpu_values: &[f64]) -> HistoryStore {
        let mut store = HistoryStore::new(1000);
        for cpu in cpu_values {
            store.append(MetricSnapshot::new(
                Utc::now(),
                BTreeMap::new(),
                SystemMetrics {
                    cpu_usage_pct: *cpu,
                    load_average: *cpu,
                    ..Default::default()
                },
            ));
        }
        store
    }

    #[test]
    fn test_insufficient_data() {
        let predictor = TrendPredictor::default();
        let history = history_of(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0]);

        let prediction = predictor.predict(&history, &MetricKey::CpuUsage, 10);
        assert_eq!(prediction.trend, Trend::InsufficientData);
        assert_eq!(prediction.confidence, 0.0);
        assert_eq!(prediction.samples, 9);
    }

    #[test]
    fn test_perfectly_linear_series() {
        let predictor = TrendPredictor::default();
        let values: Vec<f64> = (10..30).map(f64::from).collect();
        let history = history_of(&values);

        // Load average is not a percentage, so the projection is unclamped
        let prediction = predictor.predict(&history, &MetricKey::LoadAverage, 5);

        assert_eq!(prediction.trend, Trend::Increasing);
        assert!((prediction.confidence - 1.0).abs() < 1e-9);
        assert!((prediction.slope - 1.0).abs() < 1e-9);
        assert!((prediction.intercept - 10.0).abs() < 1e-9);
        let expected = prediction.slope * (20.0 + 5.0) + prediction.intercept;
        assert!((prediction.projected_value - expected).abs() < 1e-9);
        assert!((prediction.projected_value - 35.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentage_projection_is_clamped() {
        let predictor = TrendPredictor::default();
        let rising: Vec<f64> = (0..20).map(|i| 50.0 + 2.0 * i as f64).collect();
        let prediction = predictor.predict(&history_of(&rising), &MetricKey::CpuUsage, 120);
        assert_eq!(prediction.projected_value, 100.0);

        let falling: Vec<f64> = (0..20).map(|i| 40.0 - 2.0 * i as f64).collect();
        let prediction = predictor.predict(&history_of(&falling), &MetricKey::CpuUsage, 120);
        assert_eq!(prediction.trend, Trend::Decreasing);
        assert_eq!(prediction.projected_value, 0.0);
    }

    #[test]
    fn test_only_last_window_is_fitted() {
        let predictor = TrendPredictor::default();
        let mut values = vec![90.0; 30];
        values.extend((0..20).map(|i| 20.0 + i as f64));
        let prediction = predictor.predict(&history_of(&values), &MetricKey::CpuUsage, 0);

        assert_eq!(prediction.samples, 20);
        assert!((prediction.slope - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_flat_series_is_stable() {
        let predictor = TrendPredictor::default();
        let prediction = predictor.predict_values(MetricKey::DiskUsage, &[42.0; 15], 100);

        assert_eq!(prediction.trend, Trend::Stable);
        assert!((prediction.projected_value - 42.0).abs() < 1e-9);
        assert_eq!(prediction.confidence, 0.0);
    }

    #[test]
    fn test_noisy_series_has_partial_confidence() {
        let predictor = TrendPredictor::default();
        let values: Vec<f64> = (0..20)
            .map(|i| i as f64 + if i % 2 == 0 { 4.0 } else { -4.0 })
            .collect();
        let prediction = predictor.predict_values(MetricKey::LoadAverage, &values, 1);

        assert!(prediction.confidence > 0.0 && prediction.confidence < 1.0);
    }

    #[test]
    fn test_regression_rejects_single_point() {
        assert!(linear_regression(&[1.0]).is_none());
        assert!(linear_regression(&[]).is_none());
    }
}

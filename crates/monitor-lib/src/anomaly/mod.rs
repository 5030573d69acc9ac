//! Anomaly detection over snapshot history
//!
//! Flags current values whose distance from the recent mean exceeds a
//! configurable number of standard deviations.

mod detector;

pub use detector::{AnomalyDetector, SeriesStats, MIN_SAMPLES_FOR_DETECTION, WARMUP_SNAPSHOTS};

//! Bounded time series of probe-cycle snapshots
//!
//! This module provides the history the analysers run against:
//! - FIFO eviction once `max_size` snapshots are held
//! - Time-based pruning against a retention window
//! - Durable backup and best-effort restore (see `backup`)

mod backup;

pub use backup::BackupRecord;

use crate::models::{MetricKey, MetricSnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

/// Default maximum number of snapshots
pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// Default retention window (7 days)
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Ordered, oldest-first, capacity-bounded snapshot history
#[derive(Debug, Clone)]
pub struct HistoryStore {
    snapshots: VecDeque<MetricSnapshot>,
    max_size: usize,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl HistoryStore {
    /// Create an empty store holding at most `max_size` snapshots
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            snapshots: VecDeque::with_capacity(max_size.min(DEFAULT_MAX_HISTORY)),
            max_size,
        }
    }

    /// Build a store from existing snapshots, keeping the newest `max_size`
    pub fn with_snapshots(max_size: usize, snapshots: Vec<MetricSnapshot>) -> Self {
        let mut store = Self::new(max_size);
        for snapshot in snapshots {
            store.append(snapshot);
        }
        store
    }

    /// Add a snapshot at the tail, evicting from the head when full
    ///
    /// Returns the number of evicted snapshots.
    pub fn append(&mut self, snapshot: MetricSnapshot) -> usize {
        self.snapshots.push_back(snapshot);

        let mut evicted = 0;
        while self.snapshots.len() > self.max_size {
            self.snapshots.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Remove every snapshot older than `now - older_than`
    pub fn prune(&mut self, older_than: Duration) -> usize {
        let window = chrono::Duration::from_std(older_than)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        let cutoff = Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.prune_before(cutoff)
    }

    /// Remove every snapshot with a timestamp strictly before `cutoff`
    ///
    /// A snapshot exactly at the cutoff is retained.
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.snapshots.len();
        self.snapshots.retain(|s| s.timestamp >= cutoff);
        before - self.snapshots.len()
    }

    /// Numeric series for `key` over the newest `last_n` snapshots carrying it
    ///
    /// Oldest first; snapshots without the key are skipped.
    pub fn values(&self, key: &MetricKey, last_n: usize) -> Vec<f64> {
        let mut values: Vec<f64> = self
            .snapshots
            .iter()
            .rev()
            .filter_map(|s| s.value(key))
            .take(last_n)
            .collect();
        values.reverse();
        values
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn latest(&self) -> Option<&MetricSnapshot> {
        self.snapshots.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSnapshot> {
        self.snapshots.iter()
    }

    /// Copy of the newest `n` snapshots, oldest first
    pub fn recent(&self, n: usize) -> Vec<MetricSnapshot> {
        let skip = self.snapshots.len().saturating_sub(n);
        self.snapshots.iter().skip(skip).cloned().collect()
    }

    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            entries: self.snapshots.len(),
            capacity: self.max_size,
            oldest_timestamp: self.snapshots.front().map(|s| s.timestamp),
            newest_timestamp: self.snapshots.back().map(|s| s.timestamp),
        }
    }
}

/// History statistics
#[derive(Debug, Clone, Serialize)]
pub struct HistoryStats {
    pub entries: usize,
    pub capacity: usize,
    pub oldest_timestamp: Option<DateTime<Utc>>,
    pub newest_timestamp: Option<DateTime<Utc>>,
}

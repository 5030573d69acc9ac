//! Durable history backup
//!
//! One JSON record per agent instance, `{timestamp, metrics, config}`,
//! written atomically through a temp file and read once at startup.

use super::HistoryStore;
use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::models::MetricSnapshot;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Persisted state of one agent instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub timestamp: DateTime<Utc>,
    pub metrics: Vec<MetricSnapshot>,
    pub config: MonitorConfig,
}

impl BackupRecord {
    /// Copy the store contents so the write can happen off the owning task
    pub fn capture(store: &HistoryStore, config: &MonitorConfig) -> Self {
        Self {
            timestamp: Utc::now(),
            metrics: store.iter().cloned().collect(),
            config: config.clone(),
        }
    }

    /// Write the record atomically to `path`
    pub fn write_to(&self, path: &Path) -> MonitorResult<()> {
        self.write_atomic(path)
            .map_err(|e| MonitorError::Persistence(format!("{:#}", e)))?;
        debug!(path = %path.display(), entries = self.metrics.len(), "History backup written");
        Ok(())
    }

    fn write_atomic(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let json = serde_json::to_vec(self).context("Failed to serialize history backup")?;

        let temp_path = path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;

        file.write_all(&json).context("Failed to write history backup")?;
        file.sync_all().context("Failed to sync history backup")?;

        std::fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

        Ok(())
    }

    /// Read a record from `path`
    pub fn read_from(path: &Path) -> MonitorResult<Self> {
        let read = || -> anyhow::Result<Self> {
            let data = std::fs::read(path)
                .with_context(|| format!("Failed to read history backup {:?}", path))?;
            serde_json::from_slice(&data).context("Failed to deserialize history backup")
        };
        read().map_err(|e| MonitorError::Persistence(format!("{:#}", e)))
    }
}

impl HistoryStore {
    /// Serialize the whole buffer plus configuration to `path`
    pub fn save_snapshot(&self, path: &Path, config: &MonitorConfig) -> MonitorResult<()> {
        BackupRecord::capture(self, config).write_to(path)
    }

    /// Restore a store from `path`, starting empty on absence or failure
    pub fn load(path: &Path, max_size: usize) -> Self {
        if !path.exists() {
            info!(path = %path.display(), "No history backup found, starting empty");
            return Self::new(max_size);
        }

        match BackupRecord::read_from(path) {
            Ok(record) => {
                let mut metrics = record.metrics;
                metrics.sort_by_key(|s| s.timestamp);
                let store = Self::with_snapshots(max_size, metrics);
                info!(
                    path = %path.display(),
                    entries = store.len(),
                    saved_at = %record.timestamp,
                    "Loaded history backup"
                );
                store
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load history backup, starting empty");
                Self::new(max_size)
            }
        }
    }
}

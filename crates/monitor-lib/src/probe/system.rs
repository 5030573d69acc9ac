//! Host resource sampling

use crate::models::SystemMetrics;
use std::path::Path;
use std::sync::Mutex;
use sysinfo::{Disks, System};
use tracing::{debug, warn};

/// Trait for reading host resource metrics
pub trait SystemSampler: Send + Sync {
    /// Read current CPU, memory, disk and load; unavailable readings are 0
    fn sample(&self) -> SystemMetrics;
}

/// Sampler backed by `sysinfo`, which covers Linux, macOS and Windows
///
/// CPU usage is a delta between refreshes, so the sampler keeps its
/// `System` across calls. The first reading after construction may be 0.
pub struct SysinfoSampler {
    system: Mutex<System>,
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoSampler {
    pub fn new() -> Self {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            warn!("Host metrics are not supported on this platform, readings will be 0");
        }

        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();

        Self {
            system: Mutex::new(system),
        }
    }

    fn disk_usage_pct() -> f64 {
        let disks = Disks::new_with_refreshed_list();

        // Prefer the root filesystem, otherwise the largest disk
        let disk = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .or_else(|| disks.list().iter().max_by_key(|d| d.total_space()));

        match disk {
            Some(disk) if disk.total_space() > 0 => {
                let used = disk.total_space().saturating_sub(disk.available_space());
                used as f64 / disk.total_space() as f64 * 100.0
            }
            _ => {
                debug!("No disk information available");
                0.0
            }
        }
    }
}

impl SystemSampler for SysinfoSampler {
    fn sample(&self) -> SystemMetrics {
        // A poisoned lock still holds a usable System
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpu_usage_pct = f64::from(system.global_cpu_usage());
        let total_memory = system.total_memory();
        let memory_usage_pct = if total_memory > 0 {
            system.used_memory() as f64 / total_memory as f64 * 100.0
        } else {
            0.0
        };
        drop(system);

        SystemMetrics {
            cpu_usage_pct: available(cpu_usage_pct),
            memory_usage_pct: available(memory_usage_pct),
            disk_usage_pct: available(Self::disk_usage_pct()),
            load_average: available(System::load_average().one),
        }
    }
}

/// Map non-finite readings to the 0 sentinel
fn available(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_is_within_bounds() {
        let sampler = SysinfoSampler::new();
        let metrics = sampler.sample();

        for pct in [
            metrics.cpu_usage_pct,
            metrics.memory_usage_pct,
            metrics.disk_usage_pct,
        ] {
            assert!((0.0..=100.0).contains(&pct), "out of range: {}", pct);
        }
        assert!(metrics.load_average >= 0.0);
    }

    #[test]
    fn test_non_finite_readings_become_zero() {
        assert_eq!(available(f64::NAN), 0.0);
        assert_eq!(available(f64::INFINITY), 0.0);
        assert_eq!(available(42.5), 42.5);
    }
}

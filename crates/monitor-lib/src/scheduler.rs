//! Periodic task scheduling
//!
//! Four independent tickers drive the probe, predictive, prune and backup
//! tasks. Each task has a guard: a tick that arrives while the previous run
//! of the same task is still executing is skipped, never queued. Runs are
//! spawned so a panic is contained to that run, and shutdown waits for
//! in-flight runs before returning.

use crate::config::MonitorConfig;
use crate::error::MonitorResult;
use crate::health::{components, HealthRegistry};
use crate::observability::{AgentMetrics, StructuredLogger};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// The scheduled tasks of the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Probe,
    Predictive,
    Prune,
    Backup,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::Probe,
        TaskKind::Predictive,
        TaskKind::Prune,
        TaskKind::Backup,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Probe => "probe",
            TaskKind::Predictive => "predictive",
            TaskKind::Prune => "prune",
            TaskKind::Backup => "backup",
        }
    }

    /// Health component whose status follows this task's outcome
    pub fn component(&self) -> &'static str {
        match self {
            TaskKind::Probe => components::PROBE_CYCLE,
            TaskKind::Predictive => components::PREDICTOR,
            TaskKind::Prune | TaskKind::Backup => components::HISTORY,
        }
    }

    fn index(&self) -> usize {
        match self {
            TaskKind::Probe => 0,
            TaskKind::Predictive => 1,
            TaskKind::Prune => 2,
            TaskKind::Backup => 3,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Work executed by the scheduler
#[async_trait]
pub trait TaskRunner: Send + Sync + 'static {
    async fn run_task(&self, kind: TaskKind) -> MonitorResult<()>;
}

/// Period of each task
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskIntervals {
    pub probe: Duration,
    pub predictive: Duration,
    pub prune: Duration,
    pub backup: Duration,
}

impl TaskIntervals {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            probe: Duration::from_secs(config.probe_interval_secs.max(1)),
            predictive: Duration::from_secs(config.predictive_interval_secs.max(1)),
            prune: Duration::from_secs(config.prune_interval_secs.max(1)),
            backup: Duration::from_secs(config.backup_interval_secs.max(1)),
        }
    }

    pub fn get(&self, kind: TaskKind) -> Duration {
        match kind {
            TaskKind::Probe => self.probe,
            TaskKind::Predictive => self.predictive,
            TaskKind::Prune => self.prune,
            TaskKind::Backup => self.backup,
        }
    }
}

/// Skip-if-busy guard of one task
#[derive(Debug, Clone, Default)]
pub struct TaskGuard {
    running: Arc<AtomicBool>,
}

impl TaskGuard {
    /// Claim the task, or `None` if a run is already in progress
    pub fn try_acquire(&self) -> Option<TaskPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TaskPermit {
                running: Arc::clone(&self.running),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Releases the guard when dropped, including during a panic unwind
#[derive(Debug)]
pub struct TaskPermit {
    running: Arc<AtomicBool>,
}

impl Drop for TaskPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Result of one requested run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The previous run of the same task was still executing
    Skipped,
    Failed(String),
}

/// Drives the agent's periodic tasks
pub struct Scheduler {
    runner: Arc<dyn TaskRunner>,
    intervals: TaskIntervals,
    guards: [TaskGuard; 4],
    health: HealthRegistry,
    metrics: AgentMetrics,
    logger: StructuredLogger,
}

impl Scheduler {
    pub fn new(
        runner: Arc<dyn TaskRunner>,
        intervals: TaskIntervals,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            runner,
            intervals,
            guards: Default::default(),
            health,
            metrics: AgentMetrics::new(),
            logger,
        }
    }

    pub fn is_running(&self, kind: TaskKind) -> bool {
        self.guards[kind.index()].is_running()
    }

    /// Start one ticker per task
    ///
    /// The probe task fires immediately; the others first fire after one
    /// full period. Every returned handle finishes after `shutdown` is
    /// broadcast and its in-flight run has completed.
    pub fn spawn(self: &Arc<Self>, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        TaskKind::ALL
            .iter()
            .map(|&kind| {
                let scheduler = Arc::clone(self);
                let shutdown = shutdown.subscribe();
                tokio::spawn(async move { scheduler.run_loop(kind, shutdown).await })
            })
            .collect()
    }

    async fn run_loop(self: Arc<Self>, kind: TaskKind, mut shutdown: broadcast::Receiver<()>) {
        let period = self.intervals.get(kind);
        let start = match kind {
            TaskKind::Probe => Instant::now(),
            _ => Instant::now() + period,
        };
        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(task = %kind, interval_secs = period.as_secs(), "Starting scheduled task");

        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.guards[kind.index()].try_acquire() {
                        Some(permit) => {
                            let runner = Arc::clone(&self.runner);
                            in_flight.spawn(async move {
                                let _permit = permit;
                                runner.run_task(kind).await
                            });
                        }
                        None => self.record_skip(kind),
                    }
                }
                Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                    self.record_completion(kind, result).await;
                }
                _ = shutdown.recv() => {
                    break;
                }
            }
        }

        while let Some(result) = in_flight.join_next().await {
            self.record_completion(kind, result).await;
        }
        info!(task = %kind, "Scheduled task stopped");
    }

    /// Run `kind` now, outside its timer, unless it is already running
    pub async fn run_now(&self, kind: TaskKind) -> RunOutcome {
        let Some(permit) = self.guards[kind.index()].try_acquire() else {
            self.record_skip(kind);
            return RunOutcome::Skipped;
        };

        let runner = Arc::clone(&self.runner);
        let result = tokio::spawn(async move {
            let _permit = permit;
            runner.run_task(kind).await
        })
        .await;

        self.record_completion(kind, result).await
    }

    fn record_skip(&self, kind: TaskKind) {
        self.metrics.inc_task_skipped(kind.name());
        self.logger.log_task_skipped(kind.name());
    }

    async fn record_completion(
        &self,
        kind: TaskKind,
        result: Result<MonitorResult<()>, JoinError>,
    ) -> RunOutcome {
        match result {
            Ok(Ok(())) => {
                debug!(task = %kind, "Scheduled run completed");
                self.health.set_healthy(kind.component()).await;
                RunOutcome::Completed
            }
            Ok(Err(e)) => {
                let reason = e.to_string();
                self.metrics.inc_task_failures(kind.name());
                self.logger.log_task_failed(kind.name(), &reason);
                self.health.set_degraded(kind.component(), reason.clone()).await;
                RunOutcome::Failed(reason)
            }
            Err(join_error) => {
                let reason = if join_error.is_panic() {
                    format!("{} run panicked", kind)
                } else {
                    format!("{} run was cancelled", kind)
                };
                self.metrics.inc_task_failures(kind.name());
                self.logger.log_task_failed(kind.name(), &reason);
                self.health.set_unhealthy(kind.component(), reason.clone()).await;
                RunOutcome::Failed(reason)
            }
        }
    }
}

//! Background Scheduler
//!
//! Two independent periodic tasks that live only while a session is active:
//! - **Proactive refresh** (every 10 minutes): mints a new access token
//! - **Heartbeat** (every 2 minutes): advisory liveness signal
//!
//! The session state machine starts the scheduler when it settles into
//! `Authenticated` and stops it before any teardown. Tasks hold only a weak
//! reference to their host, so a dropped host ends them on the next tick.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Work executed by the scheduled tasks
#[async_trait]
pub trait SessionTasks: Send + Sync + 'static {
    async fn proactive_refresh(&self);

    async fn heartbeat(&self);
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between proactive refreshes
    pub refresh_interval: Duration,
    /// Interval between heartbeats
    pub heartbeat_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(600), // 10 minutes
            heartbeat_interval: Duration::from_secs(120), // 2 minutes
        }
    }
}

/// Scheduled task kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScheduledTask {
    Refresh,
    Heartbeat,
}

impl ScheduledTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduledTask::Refresh => "refresh",
            ScheduledTask::Heartbeat => "heartbeat",
        }
    }
}

/// Scheduler counters
#[derive(Debug, Default)]
pub struct SchedulerStats {
    pub starts: AtomicU64,
    pub stops: AtomicU64,
    pub refresh_fires: AtomicU64,
    pub heartbeat_fires: AtomicU64,
}

#[derive(Default)]
struct Handles {
    refresh: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl Handles {
    fn slot(&mut self, task: ScheduledTask) -> &mut Option<JoinHandle<()>> {
        match task {
            ScheduledTask::Refresh => &mut self.refresh,
            ScheduledTask::Heartbeat => &mut self.heartbeat,
        }
    }
}

/// Owner of the two periodic task handles
pub struct BackgroundScheduler {
    config: SchedulerConfig,
    handles: Mutex<Handles>,
    stats: Arc<SchedulerStats>,
}

impl BackgroundScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            handles: Mutex::new(Handles::default()),
            stats: Arc::new(SchedulerStats::default()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Start both tasks. A task kind that is already live is left alone.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<T: SessionTasks>(&self, host: Weak<T>) {
        let mut handles = self.handles.lock();
        let mut started = false;

        for task in [ScheduledTask::Refresh, ScheduledTask::Heartbeat] {
            let slot = handles.slot(task);
            if slot.as_ref().is_some_and(|h| !h.is_finished()) {
                continue;
            }
            *slot = Some(self.spawn(task, host.clone()));
            started = true;
        }

        if started {
            self.stats.starts.fetch_add(1, Ordering::Relaxed);
            debug!("Background scheduler started");
        }
    }

    /// Cancel both tasks. Safe to call when nothing is running.
    pub fn stop(&self) {
        let mut handles = self.handles.lock();
        let mut stopped = false;

        for task in [ScheduledTask::Refresh, ScheduledTask::Heartbeat] {
            if let Some(handle) = handles.slot(task).take() {
                handle.abort();
                stopped = true;
            }
        }

        if stopped {
            self.stats.stops.fetch_add(1, Ordering::Relaxed);
            debug!("Background scheduler stopped");
        }
    }

    /// Whether a live handle exists for `task`
    pub fn is_running(&self, task: ScheduledTask) -> bool {
        self.handles
            .lock()
            .slot(task)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Number of live task handles
    pub fn live_tasks(&self) -> usize {
        [ScheduledTask::Refresh, ScheduledTask::Heartbeat]
            .into_iter()
            .filter(|task| self.is_running(*task))
            .count()
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    fn spawn<T: SessionTasks>(&self, task: ScheduledTask, host: Weak<T>) -> JoinHandle<()> {
        let period = match task {
            ScheduledTask::Refresh => self.config.refresh_interval,
            ScheduledTask::Heartbeat => self.config.heartbeat_interval,
        };
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            // First fire is one full period after start
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let Some(host) = host.upgrade() else {
                    debug!(task = task.as_str(), "Host dropped, scheduled task exiting");
                    break;
                };

                match task {
                    ScheduledTask::Refresh => {
                        stats.refresh_fires.fetch_add(1, Ordering::Relaxed);
                        host.proactive_refresh().await;
                    }
                    ScheduledTask::Heartbeat => {
                        stats.heartbeat_fires.fetch_add(1, Ordering::Relaxed);
                        host.heartbeat().await;
                    }
                }
            }
        })
    }
}

impl Default for BackgroundScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Drop for BackgroundScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Per-execution monitors. Every running execution gets a monitor with a hard
//! timeout deadline and a one-shot warning threshold; the engine's watchdog tick
//! collects whatever is due and applies the transitions.

use overseer_core::config::WatchdogConfig;
use overseer_core::identifier::{ExecutionId, TaskId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// State tracked for one running execution
#[derive(Debug, Clone)]
pub(crate) struct Monitor {
    pub task_id: TaskId,
    pub started: Instant,
    pub timeout_at: Instant,
    pub warning_at: Instant,
    pub warned: bool,
}

/// Executions whose deadlines have passed, as collected by one tick
#[derive(Debug, Default)]
pub(crate) struct DueMonitors {
    pub timed_out: Vec<ExecutionId>,
    /// Warnings fire once per execution; the monitor is marked on collection
    pub warnings: Vec<(ExecutionId, TaskId, Duration)>,
}

/// The monitor table
pub struct Watchdog {
    monitors: Mutex<HashMap<ExecutionId, Monitor>>,
    timeout: Duration,
    warning_threshold: Duration,
}

impl Watchdog {
    pub fn new(config: &WatchdogConfig) -> Self {
        Self {
            monitors: Mutex::new(HashMap::new()),
            timeout: minutes(config.default_timeout_minutes),
            warning_threshold: minutes(config.warning_threshold_minutes),
        }
    }

    /// Begin monitoring a freshly assigned execution. Returns the hard deadline.
    pub(crate) fn start_monitor(&self, execution_id: ExecutionId, task_id: TaskId) -> Instant {
        let started = Instant::now();
        let timeout_at = started + self.timeout;
        self.monitors.lock().insert(
            execution_id,
            Monitor {
                task_id,
                started,
                timeout_at,
                warning_at: started + self.warning_threshold,
                warned: false,
            },
        );
        timeout_at
    }

    /// Stop monitoring (completion, cancellation, failure)
    pub(crate) fn stop_monitor(&self, execution_id: &ExecutionId) -> Option<Monitor> {
        self.monitors.lock().remove(execution_id)
    }

    /// Collect everything due. Timed-out monitors are removed; warning monitors are
    /// marked so they fire only once.
    pub(crate) fn collect_due(&self) -> DueMonitors {
        let now = Instant::now();
        let mut monitors = self.monitors.lock();
        let mut due = DueMonitors::default();

        for (id, monitor) in monitors.iter_mut() {
            if now >= monitor.timeout_at {
                due.timed_out.push(id.clone());
            } else if now >= monitor.warning_at && !monitor.warned {
                monitor.warned = true;
                due.warnings
                    .push((id.clone(), monitor.task_id.clone(), now - monitor.started));
            }
        }
        for id in &due.timed_out {
            monitors.remove(id);
        }
        due
    }

    pub fn active_monitors(&self) -> usize {
        self.monitors.lock().len()
    }
}

fn minutes(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0) * 60.0)
}

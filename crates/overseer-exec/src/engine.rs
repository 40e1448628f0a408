//! The execution engine: owns the executions map and the queue, drives the
//! scheduler and watchdog ticks, and keeps agent capacity accounting in lockstep
//! with every lifecycle transition.
//!
//! Lock order is `executions → queue → registry`; every path below follows it.

use crate::queue::sort_queue;
use crate::registry::AgentRegistry;
use crate::watchdog::Watchdog;
use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use overseer_core::agent::{Agent, AgentStatus};
use overseer_core::cancel::CancellationToken;
use overseer_core::config::{ExecutionConfig, SchedulingConfig, WatchdogConfig};
use overseer_core::error::{OverseerError, Result};
use overseer_core::events::{EngineEvent, EventBus};
use overseer_core::execution::{
    Execution, ExecutionResult, ExecutionStatus, ResourceRequirements,
};
use overseer_core::identifier::{AgentId, ExecutionId, TaskId};
use overseer_core::task::Task;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Counts for the metrics snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetrics {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub timed_out: usize,
    pub queue_depth: usize,
    pub active_monitors: usize,
    pub agents: usize,
    pub idle_agents: usize,
}

/// The task execution engine
pub struct ExecutionEngine {
    scheduling: SchedulingConfig,
    watchdog_config: WatchdogConfig,
    execution_config: ExecutionConfig,
    registry: Arc<AgentRegistry>,
    watchdog: Watchdog,
    bus: Arc<EventBus>,
    executions: Mutex<HashMap<ExecutionId, Execution>>,
    queue: Mutex<Vec<ExecutionId>>,
}

impl ExecutionEngine {
    pub fn new(
        scheduling: SchedulingConfig,
        watchdog_config: WatchdogConfig,
        execution_config: ExecutionConfig,
        registry: Arc<AgentRegistry>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            watchdog: Watchdog::new(&watchdog_config),
            scheduling,
            watchdog_config,
            execution_config,
            registry,
            bus,
            executions: Mutex::new(HashMap::new()),
            queue: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Queue a fresh execution for a task.
    ///
    /// # Error
    /// `conflict` when the engine already has `max_concurrent_executions` in flight.
    pub fn submit(
        &self,
        task: &Task,
        requirements: Option<ResourceRequirements>,
    ) -> Result<ExecutionId> {
        self.submit_with(task, requirements, &CancellationToken::new())
    }

    /// [`submit`](Self::submit) with a caller-supplied cancellation token
    pub fn submit_with(
        &self,
        task: &Task,
        requirements: Option<ResourceRequirements>,
        token: &CancellationToken,
    ) -> Result<ExecutionId> {
        token.check("submit execution")?;
        let mut executions = self.executions.lock();
        let in_flight = executions
            .values()
            .filter(|e| !e.status.is_terminal())
            .count();
        if in_flight >= self.execution_config.max_concurrent_executions {
            return Err(OverseerError::conflict(format!(
                "execution capacity reached: {} in flight",
                in_flight
            )));
        }

        let requirements = requirements.unwrap_or_else(|| ResourceRequirements::from_task(task));
        let execution = Execution::new(
            task,
            requirements,
            self.watchdog_config.max_retries,
            self.execution_timeout(),
        );
        let id = execution.execution_id.clone();
        executions.insert(id.clone(), execution);
        self.queue.lock().push(id.clone());
        debug!("queued execution {} for task {}", id, task.id);
        self.bus.publish(EngineEvent::TaskSubmitted {
            task_id: task.id.clone(),
            execution_id: id.clone(),
        });
        Ok(id)
    }

    /// One scheduler pass: sort the queue, take a batch, assign each entry to the
    /// best eligible agent. Unassigned entries keep their place at the head of the
    /// queue. Returns how many assignments were made.
    pub fn schedule_tick(&self) -> usize {
        let mut executions = self.executions.lock();
        let mut queue = self.queue.lock();
        sort_queue(&mut queue, &executions, self.scheduling.algorithm);

        let take = self.scheduling.batch_size.min(queue.len());
        let batch: Vec<ExecutionId> = queue.drain(..take).collect();
        let mut unassigned = vec![];
        let mut assigned = 0;

        for id in batch {
            let execution = match executions.get_mut(&id) {
                Some(execution) if execution.status == ExecutionStatus::Queued => execution,
                // cancelled or already resolved while queued; drop the stale entry
                _ => continue,
            };
            match self.registry.select_and_reserve(&execution.requirements) {
                Some(agent_id) => {
                    if let Err(e) = execution.transition(ExecutionStatus::Running) {
                        error!("scheduler could not start {}: {}", id, e);
                        let _ = self.registry.release(&agent_id, &execution.requirements, None);
                        continue;
                    }
                    execution.agent_id = Some(agent_id.clone());
                    if self.watchdog_config.enabled {
                        let deadline = self
                            .watchdog
                            .start_monitor(id.clone(), execution.task_id.clone());
                        execution.timeout_at = deadline;
                    }
                    assigned += 1;
                    self.bus.publish(EngineEvent::TaskAssigned {
                        execution_id: id.clone(),
                        task_id: execution.task_id.clone(),
                        agent_id,
                    });
                }
                None => unassigned.push(id),
            }
        }

        for id in unassigned.into_iter().rev() {
            queue.insert(0, id);
        }
        assigned
    }

    /// One watchdog pass: emit due warnings, time out overdue executions (with
    /// retry), and evict the work of stale agents. Never propagates errors.
    pub fn watchdog_tick(&self) {
        if !self.watchdog_config.enabled {
            return;
        }
        let due = self.watchdog.collect_due();
        for (execution_id, task_id, running_for) in due.warnings {
            warn!(
                "execution {} has been running {}s",
                execution_id,
                running_for.as_secs()
            );
            self.bus.publish(EngineEvent::TaskWarning {
                execution_id,
                task_id,
                running_for,
            });
        }
        for id in due.timed_out {
            self.finish_overdue(&id);
        }

        let stale_after = Duration::from_millis(self.watchdog_config.stale_heartbeat_ms);
        for agent_id in self.registry.mark_stale(stale_after) {
            self.evict_agent_work(&agent_id);
        }
    }

    /// Report a successful completion from the agent side.
    pub fn complete(&self, id: &ExecutionId, result: ExecutionResult) -> Result<()> {
        let mut executions = self.executions.lock();
        let execution = executions
            .get_mut(id)
            .ok_or_else(|| OverseerError::validation(format!("unknown execution {}", id)))?;
        execution.transition(ExecutionStatus::Completed)?;
        execution.result = Some(result.clone());

        let duration = execution.actual_duration().unwrap_or_default();
        if let Some(agent_id) = execution.agent_id.clone() {
            let _ = self
                .registry
                .release(&agent_id, &execution.requirements, Some((result.success, duration)));
        }
        self.watchdog.stop_monitor(id);
        self.bus.publish(EngineEvent::ExecutionCompleted {
            execution_id: id.clone(),
            task_id: execution.task_id.clone(),
            success: result.success,
        });
        Ok(())
    }

    /// Report a failure from the agent side. Queues a retry while attempts remain;
    /// the returned id is the retry execution, `None` when the failure is final.
    pub fn fail(&self, id: &ExecutionId, error: impl Into<String>) -> Result<Option<ExecutionId>> {
        let error = error.into();
        let mut executions = self.executions.lock();
        let execution = executions
            .get_mut(id)
            .ok_or_else(|| OverseerError::validation(format!("unknown execution {}", id)))?;
        execution.transition(ExecutionStatus::Failed)?;
        execution.result = Some(ExecutionResult::failure(error));

        let duration = execution.actual_duration().unwrap_or_default();
        if let Some(agent_id) = execution.agent_id.clone() {
            let _ = self
                .registry
                .release(&agent_id, &execution.requirements, Some((false, duration)));
        }
        self.watchdog.stop_monitor(id);

        let previous = execution.clone();
        if previous.can_retry() {
            let retry_id = self.enqueue_retry(&previous, &mut executions);
            Ok(Some(retry_id))
        } else {
            // final failure surfaces as an unsuccessful completion
            self.bus.publish(EngineEvent::ExecutionCompleted {
                execution_id: id.clone(),
                task_id: previous.task_id,
                success: false,
            });
            Ok(None)
        }
    }

    /// Cancel a queued or running execution
    pub fn cancel(&self, id: &ExecutionId) -> Result<()> {
        let mut executions = self.executions.lock();
        let execution = executions
            .get_mut(id)
            .ok_or_else(|| OverseerError::validation(format!("unknown execution {}", id)))?;
        let was_queued = execution.status == ExecutionStatus::Queued;
        execution.transition(ExecutionStatus::Cancelled)?;

        if was_queued {
            self.queue.lock().retain(|queued| queued != id);
        } else if let Some(agent_id) = execution.agent_id.clone() {
            let _ = self.registry.release(&agent_id, &execution.requirements, None);
            self.watchdog.stop_monitor(id);
        }
        self.bus.publish(EngineEvent::ExecutionCancelled {
            execution_id: id.clone(),
            task_id: execution.task_id.clone(),
        });
        Ok(())
    }

    /// Unregister an agent, cancelling whatever it was running
    pub fn remove_agent(&self, agent_id: &AgentId) -> Result<Agent> {
        let running: Vec<ExecutionId> = {
            let executions = self.executions.lock();
            executions
                .values()
                .filter(|e| {
                    e.status == ExecutionStatus::Running && e.agent_id.as_ref() == Some(agent_id)
                })
                .map(|e| e.execution_id.clone())
                .collect()
        };
        for id in running {
            if let Err(e) = self.cancel(&id) {
                warn!("could not cancel {} while removing agent {}: {}", id, agent_id, e);
            }
        }
        self.registry.unregister(agent_id)
    }

    pub fn execution(&self, id: &ExecutionId) -> Option<Execution> {
        self.executions.lock().get(id).cloned()
    }

    /// Every execution ever queued for a task, oldest first
    pub fn executions_for_task(&self, task_id: &TaskId) -> Vec<Execution> {
        let executions = self.executions.lock();
        let mut matching: Vec<Execution> = executions
            .values()
            .filter(|e| &e.task_id == task_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.retry_count
                .cmp(&b.retry_count)
                .then_with(|| a.execution_id.cmp(&b.execution_id))
        });
        matching
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn metrics(&self) -> ExecutionMetrics {
        let executions = self.executions.lock();
        let count = |status: ExecutionStatus| {
            executions.values().filter(|e| e.status == status).count()
        };
        let agents = self.registry.agents();
        ExecutionMetrics {
            queued: count(ExecutionStatus::Queued),
            running: count(ExecutionStatus::Running),
            completed: count(ExecutionStatus::Completed),
            failed: count(ExecutionStatus::Failed),
            cancelled: count(ExecutionStatus::Cancelled),
            timed_out: count(ExecutionStatus::Timeout),
            queue_depth: self.queue.lock().len(),
            active_monitors: self.watchdog.active_monitors(),
            idle_agents: agents
                .iter()
                .filter(|a| a.status == AgentStatus::Idle)
                .count(),
            agents: agents.len(),
        }
    }

    /// Start the scheduler and watchdog loops. The returned handle stops both on
    /// drop; loop errors are logged and never escape.
    pub fn start(self: &Arc<Self>) -> EngineLoops {
        let mut loops = EngineLoops::default();

        let engine = Arc::clone(self);
        let interval = Duration::from_millis(self.scheduling.scheduling_interval_ms);
        loops.add(spawn_loop(interval, move || {
            let assigned = engine.schedule_tick();
            if assigned > 0 {
                debug!("scheduler assigned {} executions", assigned);
            }
        }));

        let engine = Arc::clone(self);
        let interval = Duration::from_millis(self.watchdog_config.health_check_interval_ms);
        loops.add(spawn_loop(interval, move || engine.watchdog_tick()));

        loops
    }

    // --- internal ---

    fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_config.execution_timeout_ms)
    }

    /// Timeout one overdue execution, re-enqueueing a retry when attempts remain
    fn finish_overdue(&self, id: &ExecutionId) {
        let mut executions = self.executions.lock();
        let previous = match executions.get_mut(id) {
            Some(execution) if execution.status == ExecutionStatus::Running => {
                if let Err(e) = execution.transition(ExecutionStatus::Timeout) {
                    error!("watchdog could not time out {}: {}", id, e);
                    return;
                }
                let duration = execution.actual_duration().unwrap_or_default();
                if let Some(agent_id) = execution.agent_id.clone() {
                    let _ = self.registry.release(
                        &agent_id,
                        &execution.requirements,
                        Some((false, duration)),
                    );
                }
                execution.clone()
            }
            _ => return,
        };

        let retrying = previous.can_retry();
        self.bus.publish(EngineEvent::TaskTimeout {
            execution_id: id.clone(),
            task_id: previous.task_id.clone(),
            retrying,
        });
        if retrying {
            self.enqueue_retry(&previous, &mut executions);
        }
    }

    /// The timeout-with-retry path for every running execution of a dead agent
    fn evict_agent_work(&self, agent_id: &AgentId) {
        let overdue: Vec<ExecutionId> = {
            let executions = self.executions.lock();
            executions
                .values()
                .filter(|e| {
                    e.status == ExecutionStatus::Running && e.agent_id.as_ref() == Some(agent_id)
                })
                .map(|e| e.execution_id.clone())
                .collect()
        };
        for id in overdue {
            self.watchdog.stop_monitor(&id);
            self.finish_overdue(&id);
        }
    }

    fn enqueue_retry(
        &self,
        previous: &Execution,
        executions: &mut HashMap<ExecutionId, Execution>,
    ) -> ExecutionId {
        let retry = Execution::retry_of(previous, self.execution_timeout());
        let retry_id = retry.execution_id.clone();
        info!(
            "retrying task {} as {} (attempt {})",
            retry.task_id, retry_id, retry.retry_count
        );
        self.bus.publish(EngineEvent::ExecutionRetry {
            execution_id: retry_id.clone(),
            previous: previous.execution_id.clone(),
            task_id: retry.task_id.clone(),
            retry_count: retry.retry_count,
        });
        executions.insert(retry_id.clone(), retry);
        self.queue.lock().push(retry_id.clone());
        retry_id
    }
}

/// Background loop handles; stops and joins everything on drop
#[derive(Default)]
pub struct EngineLoops {
    stops: Vec<Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl EngineLoops {
    fn add(&mut self, loop_parts: (Sender<()>, JoinHandle<()>)) {
        self.stops.push(loop_parts.0);
        self.handles.push(loop_parts.1);
    }

    /// Stop every loop and wait for the threads to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        for stop in &self.stops {
            let _ = stop.try_send(());
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for EngineLoops {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_loop<F: FnMut() + Send + 'static>(
    interval: Duration,
    mut tick: F,
) -> (Sender<()>, JoinHandle<()>) {
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let handle = std::thread::spawn(move || loop {
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => tick(),
            _ => break,
        }
    });
    (stop_tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::Receiver;
    use overseer_core::agent::ResourceBudget;
    use overseer_core::config::SchedulingAlgorithm;
    use overseer_core::identifier::ProjectId;
    use overseer_core::task::TaskPriority;

    struct Fixture {
        engine: Arc<ExecutionEngine>,
        events: Receiver<EngineEvent>,
    }

    /// Engine with immediate-timeout watchdog config and a deterministic algorithm
    fn fixture(algorithm: SchedulingAlgorithm, timeout_minutes: f64, max_retries: u32) -> Fixture {
        let bus = Arc::new(EventBus::new());
        let events = bus.subscribe();
        let registry = Arc::new(AgentRegistry::new(Arc::clone(&bus)));
        let engine = Arc::new(ExecutionEngine::new(
            SchedulingConfig {
                algorithm,
                ..SchedulingConfig::default()
            },
            WatchdogConfig {
                default_timeout_minutes: timeout_minutes,
                warning_threshold_minutes: timeout_minutes,
                max_retries,
                ..WatchdogConfig::default()
            },
            ExecutionConfig::default(),
            registry,
            bus,
        ));
        Fixture { engine, events }
    }

    fn small_agent(name: &str) -> Agent {
        Agent::new(
            AgentId::new(name).unwrap(),
            name,
            ResourceBudget::new(1024, 1.0, 1),
        )
    }

    fn task(id: &str, priority: TaskPriority) -> Task {
        Task::new(
            TaskId::new(id).unwrap(),
            ProjectId::new("p1").unwrap(),
            id,
            0.1,
        )
        .unwrap()
        .with_priority(priority)
    }

    fn small_requirements() -> ResourceRequirements {
        ResourceRequirements {
            memory_mb: 256,
            cpu_weight: 0.5,
            estimated_duration_minutes: 6.0,
        }
    }

    #[test]
    fn priority_first_assigns_the_high_priority_task() {
        let Fixture { engine, .. } = fixture(SchedulingAlgorithm::PriorityFirst, 30.0, 3);
        engine.registry().register(small_agent("solo")).unwrap();

        let lo = engine
            .submit(&task("lo", TaskPriority::Low), Some(small_requirements()))
            .unwrap();
        let hi = engine
            .submit(&task("hi", TaskPriority::High), Some(small_requirements()))
            .unwrap();

        assert_eq!(engine.schedule_tick(), 1);
        assert_eq!(
            engine.execution(&hi).unwrap().status,
            ExecutionStatus::Running
        );
        assert_eq!(
            engine.execution(&lo).unwrap().status,
            ExecutionStatus::Queued
        );
        assert_eq!(engine.queue_depth(), 1);

        // completing hi frees the slot for lo on the next tick
        engine.complete(&hi, ExecutionResult::success("done")).unwrap();
        assert_eq!(engine.schedule_tick(), 1);
        assert_eq!(
            engine.execution(&lo).unwrap().status,
            ExecutionStatus::Running
        );
    }

    #[test]
    fn timeout_retries_until_exhausted() {
        let Fixture { engine, events } = fixture(SchedulingAlgorithm::PriorityFirst, 0.0, 2);
        engine.registry().register(small_agent("slow")).unwrap();
        let task = task("never-finishes", TaskPriority::Medium);
        engine.submit(&task, Some(small_requirements())).unwrap();

        // the agent never reports completion; each tick pair times out one attempt
        for _ in 0..3 {
            assert_eq!(engine.schedule_tick(), 1);
            engine.watchdog_tick();
        }
        engine.schedule_tick();

        let attempts = engine.executions_for_task(&task.id);
        assert_eq!(attempts.len(), 3);
        assert!(attempts
            .iter()
            .all(|e| e.status == ExecutionStatus::Timeout));
        assert_eq!(attempts[0].retry_count, 0);
        assert_eq!(attempts[1].retry_count, 1);
        assert_eq!(attempts[2].retry_count, 2);
        assert!(!attempts[2].can_retry());

        let retrying: Vec<bool> = events
            .try_iter()
            .filter_map(|e| match e {
                EngineEvent::TaskTimeout { retrying, .. } => Some(retrying),
                _ => None,
            })
            .collect();
        assert_eq!(retrying, vec![true, true, false]);

        // the agent slot drained back after the final timeout
        let agent = engine.registry().agents().remove(0);
        assert_eq!(agent.status, AgentStatus::Idle);
        assert_eq!(agent.active_tasks(), 0);
    }

    #[test]
    fn completion_updates_agent_statistics() {
        let Fixture { engine, .. } = fixture(SchedulingAlgorithm::HybridOptimal, 30.0, 3);
        engine.registry().register(small_agent("worker")).unwrap();
        let id = engine
            .submit(&task("t1", TaskPriority::Medium), Some(small_requirements()))
            .unwrap();
        engine.schedule_tick();
        engine.complete(&id, ExecutionResult::success("ok")).unwrap();

        let agent = engine.registry().agents().remove(0);
        assert_eq!(agent.metadata.total_tasks_executed, 1);
        assert!((agent.metadata.success_rate - 1.0).abs() < 1e-9);
        assert_eq!(agent.status, AgentStatus::Idle);

        let execution = engine.execution(&id).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert!(execution.actual_duration().is_some());
    }

    #[test]
    fn cancel_from_queued_and_running() {
        let Fixture { engine, .. } = fixture(SchedulingAlgorithm::PriorityFirst, 30.0, 3);
        engine.registry().register(small_agent("a")).unwrap();

        let queued = engine
            .submit(&task("q", TaskPriority::Medium), Some(small_requirements()))
            .unwrap();
        engine.cancel(&queued).unwrap();
        assert_eq!(engine.queue_depth(), 0);
        assert_eq!(
            engine.execution(&queued).unwrap().status,
            ExecutionStatus::Cancelled
        );

        let running = engine
            .submit(&task("r", TaskPriority::Medium), Some(small_requirements()))
            .unwrap();
        engine.schedule_tick();
        engine.cancel(&running).unwrap();
        assert_eq!(
            engine.execution(&running).unwrap().status,
            ExecutionStatus::Cancelled
        );
        // cancellation from either state is terminal; a second cancel is invalid
        assert!(engine.cancel(&running).is_err());
        assert_eq!(engine.registry().agents().remove(0).active_tasks(), 0);
    }

    #[test]
    fn failure_retries_and_finally_reports_unsuccessful_completion() {
        let Fixture { engine, events } = fixture(SchedulingAlgorithm::PriorityFirst, 30.0, 1);
        engine.registry().register(small_agent("a")).unwrap();
        let first = engine
            .submit(&task("flaky", TaskPriority::Medium), Some(small_requirements()))
            .unwrap();

        engine.schedule_tick();
        let retry = engine.fail(&first, "transient").unwrap().expect("one retry left");
        engine.schedule_tick();
        assert!(engine.fail(&retry, "still broken").unwrap().is_none());

        let completions: Vec<bool> = events
            .try_iter()
            .filter_map(|e| match e {
                EngineEvent::ExecutionCompleted { success, .. } => Some(success),
                _ => None,
            })
            .collect();
        assert_eq!(completions, vec![false]);
    }

    #[test]
    fn capacity_limit_rejects_excess_submissions() {
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(AgentRegistry::new(Arc::clone(&bus)));
        let engine = ExecutionEngine::new(
            SchedulingConfig::default(),
            WatchdogConfig::default(),
            ExecutionConfig {
                max_concurrent_executions: 1,
                ..ExecutionConfig::default()
            },
            registry,
            bus,
        );
        engine
            .submit(&task("one", TaskPriority::Medium), None)
            .unwrap();
        let err = engine
            .submit(&task("two", TaskPriority::Medium), None)
            .unwrap_err();
        assert_eq!(err.kind(), overseer_core::error::ErrorKind::Conflict);
    }

    #[test]
    fn removing_an_agent_cancels_its_work() {
        let Fixture { engine, .. } = fixture(SchedulingAlgorithm::PriorityFirst, 30.0, 3);
        engine.registry().register(small_agent("doomed")).unwrap();
        let id = engine
            .submit(&task("t", TaskPriority::Medium), Some(small_requirements()))
            .unwrap();
        engine.schedule_tick();

        engine.remove_agent(&AgentId::new("doomed").unwrap()).unwrap();
        assert_eq!(
            engine.execution(&id).unwrap().status,
            ExecutionStatus::Cancelled
        );
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn cancelled_submission_token_is_respected() {
        let Fixture { engine, .. } = fixture(SchedulingAlgorithm::PriorityFirst, 30.0, 3);
        let token = CancellationToken::new();
        token.cancel();
        let err = engine
            .submit_with(&task("t", TaskPriority::Medium), None, &token)
            .unwrap_err();
        assert_eq!(err.kind(), overseer_core::error::ErrorKind::Cancelled);
    }
}

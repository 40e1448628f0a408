//! An execution is one attempt to run one task on one agent. Executions live only in
//! memory; the queue does not survive a process restart.

use crate::error::{OverseerError, Result};
use crate::identifier::{AgentId, ExecutionId, TaskId};
use crate::task::{Task, TaskPriority};
use std::time::{Duration, Instant};

/// Lifecycle status of an execution.
///
/// ```text
/// queued ──assign──▶ running ──complete──▶ completed
///    │                   │
///    │                   ├─timeout────▶ timeout
///    │                   └─fail──────▶ failed
///    └─cancel────▶ cancelled
/// running ──cancel──▶ cancelled
/// ```
///
/// A retry after `timeout` or `failed` is a *new* execution with a fresh id and
/// `retry_count + 1`; terminal records never transition again.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl ExecutionStatus {
    /// Whether the state machine allows moving from `self` to `to`
    pub fn can_transition(self, to: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, to),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Timeout)
                | (Running, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        use ExecutionStatus::*;
        matches!(self, Completed | Failed | Cancelled | Timeout)
    }
}

/// Resources an execution asks of its agent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    pub memory_mb: u64,
    pub cpu_weight: f64,
    pub estimated_duration_minutes: f64,
}

impl Default for ResourceRequirements {
    fn default() -> Self {
        Self {
            memory_mb: 512,
            cpu_weight: 1.0,
            estimated_duration_minutes: 60.0,
        }
    }
}

impl ResourceRequirements {
    /// Derive requirements from a task's estimate, using defaults for the rest
    pub fn from_task(task: &Task) -> Self {
        Self {
            estimated_duration_minutes: task.estimated_hours * 60.0,
            ..Self::default()
        }
    }
}

/// The outcome reported by an agent for a finished execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// A single attempt to run one task on one agent
#[derive(Debug, Clone)]
pub struct Execution {
    pub execution_id: ExecutionId,
    pub task_id: TaskId,
    /// Unset until the scheduler assigns an agent
    pub agent_id: Option<AgentId>,
    pub status: ExecutionStatus,
    pub priority: TaskPriority,
    pub scheduled_at: Instant,
    pub started_at: Option<Instant>,
    pub completed_at: Option<Instant>,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Hard deadline enforced by the watchdog once running
    pub timeout_at: Instant,
    pub result: Option<ExecutionResult>,
    pub requirements: ResourceRequirements,
}

impl Execution {
    /// Queue a fresh execution for a task
    pub fn new(
        task: &Task,
        requirements: ResourceRequirements,
        max_retries: u32,
        timeout: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            execution_id: ExecutionId::generate(),
            task_id: task.id.clone(),
            agent_id: None,
            status: ExecutionStatus::Queued,
            priority: task.priority,
            scheduled_at: now,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries,
            timeout_at: now + timeout,
            result: None,
            requirements,
        }
    }

    /// Queue the retry successor of a finished execution: fresh id, same task,
    /// `retry_count + 1`
    pub fn retry_of(previous: &Execution, timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            execution_id: ExecutionId::generate(),
            task_id: previous.task_id.clone(),
            agent_id: None,
            status: ExecutionStatus::Queued,
            priority: previous.priority,
            scheduled_at: now,
            started_at: None,
            completed_at: None,
            retry_count: previous.retry_count + 1,
            max_retries: previous.max_retries,
            timeout_at: now + timeout,
            result: None,
            requirements: previous.requirements,
        }
    }

    /// Whether another retry may be queued after this execution fails or times out
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Apply a lifecycle transition, stamping the relevant times.
    ///
    /// # Error
    /// Errors with the `invalidTransition` kind when the state machine forbids it.
    pub fn transition(&mut self, to: ExecutionStatus) -> Result<()> {
        if !self.status.can_transition(to) {
            return Err(OverseerError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        match to {
            ExecutionStatus::Running => self.started_at = Some(Instant::now()),
            _ if to.is_terminal() => self.completed_at = Some(Instant::now()),
            _ => {}
        }
        self.status = to;
        Ok(())
    }

    /// Wall-clock duration between start and completion, when both are known
    pub fn actual_duration(&self) -> Option<Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::ProjectId;

    fn execution() -> Execution {
        let task = Task::new(
            TaskId::new("t1").unwrap(),
            ProjectId::new("p1").unwrap(),
            "compile",
            1.0,
        )
        .unwrap();
        Execution::new(
            &task,
            ResourceRequirements::default(),
            3,
            Duration::from_secs(60),
        )
    }

    #[test]
    fn legal_lifecycle_transitions() {
        let mut exec = execution();
        exec.transition(ExecutionStatus::Running).unwrap();
        assert!(exec.started_at.is_some());
        exec.transition(ExecutionStatus::Completed).unwrap();
        assert!(exec.completed_at.is_some());
        assert!(exec.actual_duration().is_some());
    }

    #[test]
    fn rejects_transitions_outside_the_table() {
        let mut exec = execution();
        let err = exec.transition(ExecutionStatus::Completed).unwrap_err();
        assert!(matches!(err, OverseerError::InvalidTransition { .. }));
        assert_eq!(exec.status, ExecutionStatus::Queued);

        exec.transition(ExecutionStatus::Cancelled).unwrap();
        assert!(exec.transition(ExecutionStatus::Running).is_err());
    }

    #[test]
    fn retry_successor_bumps_count_and_id() {
        let mut exec = execution();
        exec.transition(ExecutionStatus::Running).unwrap();
        exec.transition(ExecutionStatus::Timeout).unwrap();
        assert!(exec.can_retry());

        let retry = Execution::retry_of(&exec, Duration::from_secs(60));
        assert_ne!(retry.execution_id, exec.execution_id);
        assert_eq!(retry.retry_count, 1);
        assert_eq!(retry.status, ExecutionStatus::Queued);
        assert_eq!(retry.task_id, exec.task_id);
    }
}

//! Tasks are the atomic units of work: small enough to be executed as a single unit
//! by one agent without further decomposition.

use crate::clock;
use crate::error::{OverseerError, Result};
use crate::identifier::{EpicId, ProjectId, TaskId};

/// Lifecycle status of a task
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
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl TaskStatus {
    /// Whether the task can never run again
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Timeout
        )
    }
}

/// Scheduling priority. Variant order is rank order, `Critical` first.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl TaskPriority {
    /// Rank as a number, 0 = most urgent
    pub fn rank(self) -> u8 {
        match self {
            TaskPriority::Critical => 0,
            TaskPriority::High => 1,
            TaskPriority::Medium => 2,
            TaskPriority::Low => 3,
        }
    }
}

/// A single atomic unit of work within a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    /// Estimated effort in hours. Always positive.
    pub estimated_hours: f64,
    pub project_id: ProjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic_id: Option<EpicId>,
    pub created_at: String,
    pub updated_at: String,
    /// File paths this task is expected to touch
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
}

impl Task {
    /// Create a pending, medium-priority task.
    ///
    /// # Error
    /// Errors with the `validation` kind if `estimated_hours` is not a positive,
    /// finite number.
    pub fn new(
        id: TaskId,
        project_id: ProjectId,
        title: impl Into<String>,
        estimated_hours: f64,
    ) -> Result<Self> {
        if !estimated_hours.is_finite() || estimated_hours <= 0.0 {
            return Err(OverseerError::validation(format!(
                "estimated hours must be positive, got {}",
                estimated_hours
            )));
        }
        let now = clock::now_rfc3339();
        Ok(Self {
            id,
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            estimated_hours,
            project_id,
            epic_id: None,
            created_at: now.clone(),
            updated_at: now,
            file_paths: vec![],
            task_type: None,
        })
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_epic(mut self, epic: EpicId) -> Self {
        self.epic_id = Some(epic);
        self
    }

    pub fn with_file_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.file_paths = paths.into_iter().map(|p| p.into()).collect();
        self
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    /// Refresh the modification timestamp
    pub fn touch(&mut self) {
        self.updated_at = clock::now_rfc3339();
    }

    /// Move the task to a new status and refresh `updated_at`
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(hours: f64) -> Result<Task> {
        Task::new(
            TaskId::new("t1").unwrap(),
            ProjectId::new("p1").unwrap(),
            "write parser",
            hours,
        )
    }

    #[test]
    fn rejects_non_positive_hours() {
        assert!(task(0.0).is_err());
        assert!(task(-2.0).is_err());
        assert!(task(f64::NAN).is_err());
        assert!(task(1.5).is_ok());
    }

    #[test]
    fn new_tasks_are_pending() {
        let task = task(1.0).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert!(!task.status.is_terminal());
    }

    #[test]
    fn status_serialises_lowercase() {
        let json = serde_json::to_string(&TaskStatus::Timeout).unwrap();
        assert_eq!(json, "\"timeout\"");
        assert_eq!(TaskPriority::Critical.rank(), 0);
        assert!(TaskPriority::Critical < TaskPriority::Low);
    }
}

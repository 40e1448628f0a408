//! Projects own tasks and epics. An epic is a named, ordered grouping of tasks
//! within a project.

use crate::clock;
use crate::identifier::{EpicId, ProjectId, TaskId};

/// A project: the root of ownership for tasks, epics, and the dependency graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub epic_ids: Vec<EpicId>,
    #[serde(default)]
    pub task_ids: Vec<TaskId>,
}

impl Project {
    pub fn new(id: ProjectId, name: impl Into<String>) -> Self {
        let now = clock::now_rfc3339();
        Self {
            id,
            name: name.into(),
            created_at: now.clone(),
            updated_at: now,
            epic_ids: vec![],
            task_ids: vec![],
        }
    }

    /// Record a task as owned by this project. No-op when already present.
    pub fn adopt_task(&mut self, task: TaskId) {
        if !self.task_ids.contains(&task) {
            self.task_ids.push(task);
            self.touch();
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = clock::now_rfc3339();
    }
}

/// A named collection of tasks within a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Epic {
    pub id: EpicId,
    pub project_id: ProjectId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Task ids in epic order
    #[serde(default)]
    pub task_ids: Vec<TaskId>,
}

impl Epic {
    pub fn new(id: EpicId, project_id: ProjectId, title: impl Into<String>) -> Self {
        Self {
            id,
            project_id,
            title: title.into(),
            description: String::new(),
            task_ids: vec![],
        }
    }
}

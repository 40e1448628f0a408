//! The entity abstraction: anything the storage engine persists as an individual
//! record plus an index summary. Tasks, projects, epics, and dependency edges all
//! implement it.

use overseer_core::project::{Epic, Project};
use overseer_core::task::Task;
use overseer_graph::DependencyEdge;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

/// The four persisted entity kinds
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum EntityKind {
    Task,
    Project,
    Dependency,
    Epic,
}

impl EntityKind {
    /// Directory under the data root holding this kind's records
    pub fn dir_name(self) -> &'static str {
        match self {
            EntityKind::Task => "tasks",
            EntityKind::Project => "projects",
            EntityKind::Dependency => "dependencies",
            EntityKind::Epic => "epics",
        }
    }

    /// The field its index file keys the summary array under; also the index file
    /// stem (`indexes/tasks.json` holds `{ "tasks": [...] }`)
    pub fn index_field(self) -> &'static str {
        self.dir_name()
    }
}

/// A persistable entity
pub trait Entity: Serialize + DeserializeOwned + Clone {
    /// Which kind this entity is stored as
    const KIND: EntityKind;

    /// The record id; also the file stem (after encoding)
    fn entity_id(&self) -> String;

    /// The denormalised summary carried in the kind's index file. Must contain
    /// an `"id"` field.
    fn summary(&self) -> Value;

    /// Refresh the entity's own modification timestamp, when it has one
    fn refresh_updated_at(&mut self) {}
}

impl Entity for Task {
    const KIND: EntityKind = EntityKind::Task;

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn summary(&self) -> Value {
        json!({
            "id": self.id,
            "title": self.title,
            "status": self.status,
            "priority": self.priority,
            "estimatedHours": self.estimated_hours,
            "projectId": self.project_id,
        })
    }

    fn refresh_updated_at(&mut self) {
        self.touch();
    }
}

impl Entity for Project {
    const KIND: EntityKind = EntityKind::Project;

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn summary(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "taskCount": self.task_ids.len(),
            "epicCount": self.epic_ids.len(),
        })
    }

    fn refresh_updated_at(&mut self) {
        self.touch();
    }
}

impl Entity for Epic {
    const KIND: EntityKind = EntityKind::Epic;

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn summary(&self) -> Value {
        json!({
            "id": self.id,
            "projectId": self.project_id,
            "title": self.title,
            "taskCount": self.task_ids.len(),
        })
    }
}

impl Entity for DependencyEdge {
    const KIND: EntityKind = EntityKind::Dependency;

    fn entity_id(&self) -> String {
        self.key().to_string()
    }

    fn summary(&self) -> Value {
        json!({
            "id": self.key().to_string(),
            "from": self.from,
            "to": self.to,
            "type": self.dep_type,
            "critical": self.critical,
        })
    }
}

/// Encode an entity id as a safe file stem. Edge ids contain `->`; anything outside
/// `[A-Za-z0-9._-]` maps to `_`.
pub fn file_stem(id: &str) -> String {
    id.replace("->", "__")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use overseer_core::identifier::{ProjectId, TaskId};
    use overseer_graph::DependencyType;

    #[test]
    fn summaries_carry_an_id() {
        let task = Task::new(
            TaskId::new("t1").unwrap(),
            ProjectId::new("p1").unwrap(),
            "build",
            2.0,
        )
        .unwrap();
        assert_eq!(task.summary()["id"], "t1");
        assert_eq!(Task::KIND.dir_name(), "tasks");

        let edge = DependencyEdge::new(
            TaskId::new("b").unwrap(),
            TaskId::new("a").unwrap(),
            DependencyType::Task,
        );
        assert_eq!(edge.entity_id(), "b->a");
        assert_eq!(edge.summary()["id"], "b->a");
    }

    #[test]
    fn file_stems_are_filesystem_safe() {
        assert_eq!(file_stem("b->a"), "b__a");
        assert_eq!(file_stem("x/y:z"), "x_y_z");
        assert_eq!(file_stem("plain-id_1.2"), "plain-id_1.2");
    }
}

//! Graph nodes. The `dependencies`/`dependents` vectors are denormalised caches of
//! the edge table, kept sorted so that serialisation is deterministic; the adjacency
//! and reverse-index mappings on the graph are the canonical relation.

use overseer_core::identifier::TaskId;
use overseer_core::task::Task;

/// One task inside a dependency graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskNode {
    pub task: Task,
    /// Tasks this node waits on, sorted
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    /// Tasks waiting on this node, sorted
    #[serde(default)]
    pub dependents: Vec<TaskId>,
    /// Set by the latest critical-path analysis
    #[serde(default)]
    pub critical_path: bool,
}

impl TaskNode {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            dependencies: vec![],
            dependents: vec![],
            critical_path: false,
        }
    }

    pub(crate) fn add_dependency(&mut self, id: TaskId) {
        insert_sorted(&mut self.dependencies, id);
    }

    pub(crate) fn add_dependent(&mut self, id: TaskId) {
        insert_sorted(&mut self.dependents, id);
    }

    pub(crate) fn remove_dependency(&mut self, id: &TaskId) {
        self.dependencies.retain(|d| d != id);
    }

    pub(crate) fn remove_dependent(&mut self, id: &TaskId) {
        self.dependents.retain(|d| d != id);
    }
}

fn insert_sorted(list: &mut Vec<TaskId>, id: TaskId) {
    if let Err(index) = list.binary_search(&id) {
        list.insert(index, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overseer_core::identifier::ProjectId;

    #[test]
    fn denormalised_lists_stay_sorted_and_unique() {
        let task = Task::new(
            TaskId::new("t").unwrap(),
            ProjectId::new("p").unwrap(),
            "t",
            1.0,
        )
        .unwrap();
        let mut node = TaskNode::new(task);
        node.add_dependency(TaskId::new("z").unwrap());
        node.add_dependency(TaskId::new("a").unwrap());
        node.add_dependency(TaskId::new("z").unwrap());
        assert_eq!(
            node.dependencies,
            vec![TaskId::new("a").unwrap(), TaskId::new("z").unwrap()]
        );
        node.remove_dependency(&TaskId::new("a").unwrap());
        assert_eq!(node.dependencies.len(), 1);
    }
}

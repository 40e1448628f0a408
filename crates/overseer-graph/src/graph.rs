//! The dependency graph itself. The central invariant: the edge set is a DAG, and the
//! adjacency and reverse-index mappings are exact mutual inverses of the edge table.
//! Every mutation runs the would-this-cycle check *before* committing anything.

use crate::analysis::AnalysisCache;
use crate::edge::{DependencyEdge, DependencyType};
use crate::node::TaskNode;
use overseer_core::error::{OverseerError, Result};
use overseer_core::identifier::{EdgeKey, ProjectId, TaskId};
use overseer_core::task::{Task, TaskStatus};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use std::collections::{BTreeMap, BTreeSet};

/// An in-memory DAG of tasks with typed dependency edges
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    pub(crate) project_id: ProjectId,
    pub(crate) nodes: BTreeMap<TaskId, TaskNode>,
    /// Edge table keyed `"{dependent}->{dependency}"`
    pub(crate) edges: BTreeMap<String, DependencyEdge>,
    /// dependency id → ids of tasks waiting on it
    pub(crate) adjacency: BTreeMap<TaskId, BTreeSet<TaskId>>,
    /// dependent id → ids of tasks it waits on
    pub(crate) reverse_index: BTreeMap<TaskId, BTreeSet<TaskId>>,
    /// Memoised analyses; `None` after any structural mutation
    pub(crate) cache: Option<AnalysisCache>,
}

impl DependencyGraph {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            adjacency: BTreeMap::new(),
            reverse_index: BTreeMap::new(),
            cache: None,
        }
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &TaskId) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &TaskId> {
        self.nodes.keys()
    }

    pub fn edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.values()
    }

    /// Insert a node for a task.
    ///
    /// Idempotent when the identical task is already present; a different task under
    /// the same id fails with the `conflict` kind.
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        if let Some(existing) = self.nodes.get(&task.id) {
            if existing.task == task {
                return Ok(());
            }
            return Err(OverseerError::conflict(format!(
                "task {} already exists with different attributes",
                task.id
            )));
        }
        self.adjacency.entry(task.id.clone()).or_default();
        self.reverse_index.entry(task.id.clone()).or_default();
        self.nodes.insert(task.id.clone(), TaskNode::new(task));
        self.invalidate();
        Ok(())
    }

    /// Add an edge: `dependent` must wait for `dependency`.
    ///
    /// Requires both endpoints, forbids self-edges and duplicates, and refuses any
    /// edge that would make the graph cyclic — the check runs before the commit, so
    /// a rejected call leaves no trace.
    pub fn add_dependency(
        &mut self,
        dependent: &TaskId,
        dependency: &TaskId,
        dep_type: DependencyType,
        weight: f64,
        critical: bool,
        description: Option<String>,
    ) -> Result<()> {
        if dependent == dependency {
            return Err(OverseerError::validation(format!(
                "task {} cannot depend on itself",
                dependent
            )));
        }
        if !self.nodes.contains_key(dependent) {
            return Err(OverseerError::validation(format!(
                "unknown dependent task {}",
                dependent
            )));
        }
        if !self.nodes.contains_key(dependency) {
            return Err(OverseerError::validation(format!(
                "unknown dependency task {}",
                dependency
            )));
        }
        if !weight.is_finite() || weight <= 0.0 {
            return Err(OverseerError::validation(format!(
                "edge weight must be positive, got {}",
                weight
            )));
        }

        let key = EdgeKey::new(dependent.clone(), dependency.clone()).to_string();
        if self.edges.contains_key(&key) {
            return Err(OverseerError::conflict(format!("edge {} already exists", key)));
        }
        if self.reaches(dependent, dependency) {
            return Err(OverseerError::cycle(format!(
                "adding {} would close a cycle: {} already reaches {}",
                key, dependent, dependency
            )));
        }

        let mut edge = DependencyEdge::new(dependent.clone(), dependency.clone(), dep_type)
            .with_weight(weight)
            .with_critical(critical);
        edge.description = description;
        self.edges.insert(key, edge);

        self.adjacency
            .entry(dependency.clone())
            .or_default()
            .insert(dependent.clone());
        self.reverse_index
            .entry(dependent.clone())
            .or_default()
            .insert(dependency.clone());
        if let Some(node) = self.nodes.get_mut(dependent) {
            node.add_dependency(dependency.clone());
        }
        if let Some(node) = self.nodes.get_mut(dependency) {
            node.add_dependent(dependent.clone());
        }
        self.invalidate();
        Ok(())
    }

    /// Remove an edge. No-op when the edge is absent.
    pub fn remove_dependency(&mut self, dependent: &TaskId, dependency: &TaskId) {
        let key = EdgeKey::new(dependent.clone(), dependency.clone()).to_string();
        if self.edges.remove(&key).is_none() {
            return;
        }
        if let Some(dependents) = self.adjacency.get_mut(dependency) {
            dependents.remove(dependent);
        }
        if let Some(dependencies) = self.reverse_index.get_mut(dependent) {
            dependencies.remove(dependency);
        }
        if let Some(node) = self.nodes.get_mut(dependent) {
            node.remove_dependency(dependency);
        }
        if let Some(node) = self.nodes.get_mut(dependency) {
            node.remove_dependent(dependent);
        }
        self.invalidate();
    }

    /// Move a task to a new status.
    ///
    /// Status changes do not touch the topology, so memoised analyses survive.
    pub fn update_task_status(&mut self, id: &TaskId, status: TaskStatus) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| OverseerError::validation(format!("unknown task {}", id)))?;
        node.task.set_status(status);
        Ok(())
    }

    /// Pending tasks whose every dependency is completed, in id order
    pub fn ready_tasks(&self) -> Vec<TaskId> {
        self.nodes
            .iter()
            .filter(|(id, node)| {
                node.task.status == TaskStatus::Pending
                    && self
                        .dependencies_of(id)
                        .all(|dep| {
                            self.nodes
                                .get(dep)
                                .map(|n| n.task.status == TaskStatus::Completed)
                                .unwrap_or(false)
                        })
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Ids this task waits on
    pub fn dependencies_of<'a>(&'a self, id: &TaskId) -> impl Iterator<Item = &'a TaskId> {
        self.reverse_index.get(id).into_iter().flatten()
    }

    /// Ids waiting on this task
    pub fn dependents_of<'a>(&'a self, id: &TaskId) -> impl Iterator<Item = &'a TaskId> {
        self.adjacency.get(id).into_iter().flatten()
    }

    /// Find all cycles. Steady state always returns an empty list; the function is
    /// total for diagnostics on deserialised data.
    pub fn detect_cycles(&self) -> Vec<Vec<TaskId>> {
        let mut graph = DiGraph::<TaskId, ()>::new();
        let mut indices = BTreeMap::new();
        for id in self.nodes.keys() {
            indices.insert(id.clone(), graph.add_node(id.clone()));
        }
        for (dependency, dependents) in &self.adjacency {
            for dependent in dependents {
                if let (Some(&from), Some(&to)) = (indices.get(dependency), indices.get(dependent))
                {
                    graph.add_edge(from, to, ());
                }
            }
        }
        tarjan_scc(&graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                component
                    .into_iter()
                    .map(|index| graph[index].clone())
                    .collect()
            })
            .collect()
    }

    /// Whether `start` reaches `goal` by following dependent links. Used as the
    /// pre-commit cycle check.
    pub(crate) fn reaches(&self, start: &TaskId, goal: &TaskId) -> bool {
        let mut stack = vec![start];
        let mut visited = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if current == goal {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(dependents) = self.adjacency.get(current) {
                stack.extend(dependents.iter());
            }
        }
        false
    }

    pub(crate) fn invalidate(&mut self) {
        self.cache = None;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for the graph test modules

    use super::*;
    use overseer_core::identifier::ProjectId;

    pub fn graph_of(tasks: &[(&str, f64)]) -> DependencyGraph {
        let project = ProjectId::new("p1").unwrap();
        let mut graph = DependencyGraph::new(project.clone());
        for (name, hours) in tasks {
            let task = Task::new(TaskId::new(*name).unwrap(), project.clone(), *name, *hours)
                .unwrap();
            graph.add_task(task).unwrap();
        }
        graph
    }

    pub fn id(name: &str) -> TaskId {
        TaskId::new(name).unwrap()
    }

    pub fn depend(graph: &mut DependencyGraph, dependent: &str, dependency: &str) -> Result<()> {
        graph.add_dependency(
            &id(dependent),
            &id(dependency),
            DependencyType::Task,
            1.0,
            false,
            None,
        )
    }
}

//! Graph analyses: topological order, weighted critical path, and parallel batches.
//! All three are memoised on the graph and recomputed lazily after a structural
//! mutation; task status changes do not disturb them.

use crate::graph::DependencyGraph;
use overseer_core::identifier::{EdgeKey, TaskId};
use overseer_core::task::TaskStatus;
use std::collections::{BTreeMap, BTreeSet};

/// A maximal set of tasks executable concurrently once their predecessors finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelBatch {
    pub tasks: Vec<TaskId>,
    /// Wall-clock lower bound for the batch: the largest estimate in it
    pub estimated_duration: f64,
}

/// The longest weighted chain through the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalPath {
    pub tasks: Vec<TaskId>,
    pub total_duration: f64,
}

/// Summary numbers for a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetrics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub ready_tasks: usize,
    pub completed_tasks: usize,
    pub total_estimated_hours: f64,
    pub critical_path_hours: f64,
}

/// Memoised analysis results
#[derive(Debug, Clone)]
pub(crate) struct AnalysisCache {
    pub topological_order: Vec<TaskId>,
    pub critical_path: CriticalPath,
    pub parallel_batches: Vec<ParallelBatch>,
}

impl DependencyGraph {
    /// Kahn's algorithm over the dependency relation. Returns a valid linear
    /// extension (dependencies before dependents), or an empty list when the graph
    /// is cyclic. Ties resolve to the smaller task id, which keeps the order stable
    /// across runs.
    pub fn topological_order(&mut self) -> Vec<TaskId> {
        self.analysis().topological_order.clone()
    }

    /// The longest weighted path. Node cost along a path is
    /// `estimated_hours × incoming edge weight` (plain `estimated_hours` at the
    /// start); ties break toward the earlier topological index. Marks
    /// `critical_path` on the chosen nodes as a side effect.
    pub fn critical_path(&mut self) -> CriticalPath {
        let path = self.analysis().critical_path.clone();
        let chosen: BTreeSet<TaskId> = path.tasks.iter().cloned().collect();
        for (id, node) in self.nodes.iter_mut() {
            node.critical_path = chosen.contains(id);
        }
        path
    }

    /// Peel the graph into layers: batch 0 holds tasks with no dependencies, batch
    /// k+1 the tasks whose dependencies all sit in batches ≤ k
    pub fn parallel_batches(&mut self) -> Vec<ParallelBatch> {
        self.analysis().parallel_batches.clone()
    }

    /// Current summary numbers. Computed fresh on every call; cheap relative to the
    /// memoised analyses.
    pub fn metrics(&mut self) -> GraphMetrics {
        let critical_path_hours = self.analysis().critical_path.total_duration;
        GraphMetrics {
            total_nodes: self.node_count(),
            total_edges: self.edge_count(),
            ready_tasks: self.ready_tasks().len(),
            completed_tasks: self
                .nodes
                .values()
                .filter(|n| n.task.status == TaskStatus::Completed)
                .count(),
            total_estimated_hours: self.nodes.values().map(|n| n.task.estimated_hours).sum(),
            critical_path_hours,
        }
    }

    pub(crate) fn analysis(&mut self) -> &AnalysisCache {
        if self.cache.is_none() {
            let topological_order = self.compute_topological_order();
            let critical_path = self.compute_critical_path(&topological_order);
            let parallel_batches = self.compute_parallel_batches();
            self.cache = Some(AnalysisCache {
                topological_order,
                critical_path,
                parallel_batches,
            });
        }
        self.cache.as_ref().expect("cache was just populated")
    }

    fn compute_topological_order(&self) -> Vec<TaskId> {
        let mut in_degree: BTreeMap<&TaskId, usize> = self
            .nodes
            .keys()
            .map(|id| {
                (
                    id,
                    self.reverse_index.get(id).map(BTreeSet::len).unwrap_or(0),
                )
            })
            .collect();
        let mut frontier: BTreeSet<&TaskId> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(&next) = frontier.iter().next() {
            frontier.remove(next);
            order.push(next.clone());
            if let Some(dependents) = self.adjacency.get(next) {
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            frontier.insert(dependent);
                        }
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            // a cycle survived into the node set; diagnostics handle it
            return vec![];
        }
        order
    }

    fn compute_critical_path(&self, topological_order: &[TaskId]) -> CriticalPath {
        if topological_order.is_empty() {
            return CriticalPath {
                tasks: vec![],
                total_duration: 0.0,
            };
        }
        let topo_index: BTreeMap<&TaskId, usize> = topological_order
            .iter()
            .enumerate()
            .map(|(index, id)| (id, index))
            .collect();

        let mut distance: BTreeMap<&TaskId, f64> = BTreeMap::new();
        let mut parent: BTreeMap<&TaskId, &TaskId> = BTreeMap::new();

        for id in topological_order {
            let hours = self.nodes[id].task.estimated_hours;
            let mut best: Option<(f64, &TaskId)> = None;
            for dependency in self.dependencies_of(id) {
                let key = EdgeKey::new(id.clone(), dependency.clone()).to_string();
                let weight = self.edges.get(&key).map(|e| e.weight).unwrap_or(1.0);
                let through = distance.get(dependency).copied().unwrap_or(0.0) + hours * weight;
                let better = match best {
                    None => true,
                    Some((best_distance, best_dep)) => {
                        through > best_distance
                            || (through == best_distance
                                && topo_index[dependency] < topo_index[best_dep])
                    }
                };
                if better {
                    best = Some((through, dependency));
                }
            }
            match best {
                Some((through, via)) => {
                    distance.insert(id, through);
                    parent.insert(id, via);
                }
                None => {
                    distance.insert(id, hours);
                }
            }
        }

        let mut end: Option<&TaskId> = None;
        for id in topological_order {
            let better = match end {
                None => true,
                Some(current) => {
                    distance[id] > distance[current]
                        || (distance[id] == distance[current]
                            && topo_index[id] < topo_index[current])
                }
            };
            if better {
                end = Some(id);
            }
        }

        let end = match end {
            Some(id) => id,
            None => {
                return CriticalPath {
                    tasks: vec![],
                    total_duration: 0.0,
                }
            }
        };
        let total_duration = distance[end];
        let mut tasks = vec![end.clone()];
        let mut cursor = end;
        while let Some(&previous) = parent.get(cursor) {
            tasks.push(previous.clone());
            cursor = previous;
        }
        tasks.reverse();
        CriticalPath {
            tasks,
            total_duration,
        }
    }

    fn compute_parallel_batches(&self) -> Vec<ParallelBatch> {
        let mut remaining: BTreeMap<&TaskId, usize> = self
            .nodes
            .keys()
            .map(|id| {
                (
                    id,
                    self.reverse_index.get(id).map(BTreeSet::len).unwrap_or(0),
                )
            })
            .collect();

        let mut batches = vec![];
        while !remaining.is_empty() {
            let batch: Vec<TaskId> = remaining
                .iter()
                .filter(|(_, &degree)| degree == 0)
                .map(|(&id, _)| id.clone())
                .collect();
            if batch.is_empty() {
                // cyclic leftovers; topological diagnostics cover this
                break;
            }
            for id in &batch {
                remaining.remove(id);
                if let Some(dependents) = self.adjacency.get(id) {
                    for dependent in dependents {
                        if let Some(degree) = remaining.get_mut(dependent) {
                            *degree = degree.saturating_sub(1);
                        }
                    }
                }
            }
            let estimated_duration = batch
                .iter()
                .map(|id| self.nodes[id].task.estimated_hours)
                .fold(0.0, f64::max);
            batches.push(ParallelBatch {
                tasks: batch,
                estimated_duration,
            });
        }
        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::testing::{depend, graph_of, id};

    #[test]
    fn simple_chain() {
        let mut graph = graph_of(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        depend(&mut graph, "b", "a").unwrap();
        depend(&mut graph, "c", "b").unwrap();

        assert_eq!(graph.topological_order(), vec![id("a"), id("b"), id("c")]);

        let critical = graph.critical_path();
        assert_eq!(critical.tasks, vec![id("a"), id("b"), id("c")]);
        assert!((critical.total_duration - 6.0).abs() < 1e-9);

        let batches = graph.parallel_batches();
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.tasks.len() == 1));
    }

    #[test]
    fn diamond_critical_path_and_batches() {
        let mut graph = graph_of(&[("a", 1.0), ("b", 5.0), ("c", 2.0), ("d", 1.0)]);
        depend(&mut graph, "b", "a").unwrap();
        depend(&mut graph, "c", "a").unwrap();
        depend(&mut graph, "d", "b").unwrap();
        depend(&mut graph, "d", "c").unwrap();

        let critical = graph.critical_path();
        assert_eq!(critical.tasks, vec![id("a"), id("b"), id("d")]);
        assert!((critical.total_duration - 7.0).abs() < 1e-9);

        let batches = graph.parallel_batches();
        let shapes: Vec<Vec<TaskId>> = batches.iter().map(|b| b.tasks.clone()).collect();
        assert_eq!(shapes, vec![vec![id("a")], vec![id("b"), id("c")], vec![id("d")]]);
        assert!((batches[1].estimated_duration - 5.0).abs() < 1e-9);

        // flags follow the chosen path
        assert!(graph.node(&id("b")).unwrap().critical_path);
        assert!(!graph.node(&id("c")).unwrap().critical_path);
    }

    #[test]
    fn topological_order_is_a_linear_extension() {
        let mut graph = graph_of(&[("a", 1.0), ("b", 1.0), ("c", 1.0), ("d", 1.0)]);
        depend(&mut graph, "c", "a").unwrap();
        depend(&mut graph, "c", "b").unwrap();
        depend(&mut graph, "d", "c").unwrap();

        let order = graph.topological_order();
        let position: BTreeMap<_, _> = order.iter().enumerate().map(|(i, t)| (t.clone(), i)).collect();
        for edge in graph.edges() {
            assert!(position[&edge.to] < position[&edge.from], "{} before {}", edge.to, edge.from);
        }
    }

    #[test]
    fn edge_weight_scales_the_dependent_cost() {
        let mut graph = graph_of(&[("a", 1.0), ("b", 2.0), ("c", 2.0)]);
        // b and c both depend on a; the heavier edge wins the path
        graph
            .add_dependency(&id("b"), &id("a"), crate::DependencyType::Task, 3.0, false, None)
            .unwrap();
        depend(&mut graph, "c", "a").unwrap();

        let critical = graph.critical_path();
        assert_eq!(critical.tasks, vec![id("a"), id("b")]);
        assert!((critical.total_duration - 7.0).abs() < 1e-9);
    }

    #[test]
    fn analyses_are_memoised_until_a_mutation() {
        let mut graph = graph_of(&[("a", 1.0), ("b", 1.0)]);
        depend(&mut graph, "b", "a").unwrap();
        let _ = graph.topological_order();
        assert!(graph.cache.is_some());

        graph.remove_dependency(&id("b"), &id("a"));
        assert!(graph.cache.is_none());
        assert_eq!(graph.topological_order().len(), 2);
    }

    #[test]
    fn metrics_count_ready_and_completed() {
        let mut graph = graph_of(&[("a", 1.0), ("b", 2.0)]);
        depend(&mut graph, "b", "a").unwrap();
        graph
            .update_task_status(&id("a"), overseer_core::task::TaskStatus::Completed)
            .unwrap();

        let metrics = graph.metrics();
        assert_eq!(metrics.total_nodes, 2);
        assert_eq!(metrics.total_edges, 1);
        assert_eq!(metrics.completed_tasks, 1);
        assert_eq!(metrics.ready_tasks, 1);
        assert!((metrics.total_estimated_hours - 3.0).abs() < 1e-9);
    }
}

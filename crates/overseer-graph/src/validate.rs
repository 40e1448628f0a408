//! Whole-graph validation: hard errors a well-behaved engine never produces on its
//! own (they matter for deserialised data), and advisory warnings about edges that
//! are technically fine but probably wrong.

use crate::graph::DependencyGraph;
use overseer_core::identifier::TaskId;
use overseer_core::task::TaskPriority;
use std::collections::BTreeSet;
use thiserror::Error;

/// A structural defect in the graph
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("cycle through {0:?}")]
    Cycle(Vec<TaskId>),
    #[error("edge {edge} references missing task {task}")]
    MissingTask { edge: String, task: TaskId },
    #[error("task {0} depends on itself")]
    SelfDependency(TaskId),
    #[error("edge {edge} has invalid weight {weight}")]
    InvalidWeight { edge: String, weight: f64 },
    #[error("index conflict: {0}")]
    IndexConflict(String),
}

/// An advisory finding
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationWarning {
    /// The edge is implied by a longer path and adds nothing
    #[error("edge {0} is redundant: an alternative path already orders the two tasks")]
    Redundant(String),
    /// A long dependency gating a much shorter dependent
    #[error("edge {edge} is inefficient: dependency is {ratio:.1}x the dependent's estimate")]
    Inefficient { edge: String, ratio: f64 },
    #[error("edge {edge}: {note}")]
    PotentialIssue { edge: String, note: String },
}

/// Result of [`DependencyGraph::validate`]
#[derive(Debug, Clone, Default)]
pub struct GraphValidation {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl GraphValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Estimate ratio past which an edge is flagged as inefficient
const INEFFICIENT_RATIO: f64 = 10.0;

impl DependencyGraph {
    /// Run every structural check and heuristic over the current graph
    pub fn validate(&self) -> GraphValidation {
        let mut report = GraphValidation::default();

        for cycle in self.detect_cycles() {
            report.errors.push(ValidationError::Cycle(cycle));
        }

        for (key, edge) in &self.edges {
            if edge.from == edge.to {
                report
                    .errors
                    .push(ValidationError::SelfDependency(edge.from.clone()));
                continue;
            }
            for endpoint in [&edge.from, &edge.to] {
                if !self.nodes.contains_key(endpoint) {
                    report.errors.push(ValidationError::MissingTask {
                        edge: key.clone(),
                        task: endpoint.clone(),
                    });
                }
            }
            if !edge.weight.is_finite() || edge.weight <= 0.0 {
                report.errors.push(ValidationError::InvalidWeight {
                    edge: key.clone(),
                    weight: edge.weight,
                });
            }
        }

        self.check_index_agreement(&mut report);
        self.check_redundancy(&mut report);
        self.check_estimates_and_priorities(&mut report);
        report
    }

    /// adjacency and reverse index must be exact mutual inverses of the edge table
    fn check_index_agreement(&self, report: &mut GraphValidation) {
        for (key, edge) in &self.edges {
            let forward = self
                .adjacency
                .get(&edge.to)
                .map(|set| set.contains(&edge.from))
                .unwrap_or(false);
            if !forward {
                report.errors.push(ValidationError::IndexConflict(format!(
                    "edge {} missing from adjacency",
                    key
                )));
            }
            let backward = self
                .reverse_index
                .get(&edge.from)
                .map(|set| set.contains(&edge.to))
                .unwrap_or(false);
            if !backward {
                report.errors.push(ValidationError::IndexConflict(format!(
                    "edge {} missing from reverse index",
                    key
                )));
            }
        }
        let out_degree: usize = self.adjacency.values().map(BTreeSet::len).sum();
        if out_degree != self.edges.len() {
            report.errors.push(ValidationError::IndexConflict(format!(
                "adjacency holds {} links but the edge table holds {}",
                out_degree,
                self.edges.len()
            )));
        }
    }

    /// An edge `a -> b` is redundant iff some other path from `a` to `b` exists that
    /// does not traverse this edge
    fn check_redundancy(&self, report: &mut GraphValidation) {
        for (key, edge) in &self.edges {
            // walk from the dependency toward dependents, skipping the direct hop
            let mut stack: Vec<&TaskId> = self
                .adjacency
                .get(&edge.to)
                .into_iter()
                .flatten()
                .filter(|dependent| *dependent != &edge.from)
                .collect();
            let mut visited = BTreeSet::new();
            let mut reachable = false;
            while let Some(current) = stack.pop() {
                if current == &edge.from {
                    reachable = true;
                    break;
                }
                if !visited.insert(current) {
                    continue;
                }
                if let Some(next) = self.adjacency.get(current) {
                    stack.extend(next.iter());
                }
            }
            if reachable {
                report.warnings.push(ValidationWarning::Redundant(key.clone()));
            }
        }
    }

    fn check_estimates_and_priorities(&self, report: &mut GraphValidation) {
        for (key, edge) in &self.edges {
            let (dependent, dependency) =
                match (self.nodes.get(&edge.from), self.nodes.get(&edge.to)) {
                    (Some(a), Some(b)) => (a, b),
                    _ => continue,
                };
            let ratio = dependency.task.estimated_hours / dependent.task.estimated_hours.max(1e-9);
            if ratio >= INEFFICIENT_RATIO {
                report.warnings.push(ValidationWarning::Inefficient {
                    edge: key.clone(),
                    ratio,
                });
            }
            if dependent.task.priority <= TaskPriority::High
                && dependency.task.priority == TaskPriority::Low
            {
                report.warnings.push(ValidationWarning::PotentialIssue {
                    edge: key.clone(),
                    note: "low-priority dependency gates a high-priority task".to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::testing::{depend, graph_of, id};
    use overseer_core::task::TaskPriority;

    #[test]
    fn a_well_formed_graph_validates_clean() {
        let mut graph = graph_of(&[("a", 1.0), ("b", 1.0)]);
        depend(&mut graph, "b", "a").unwrap();
        let report = graph.validate();
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn transitive_shortcut_is_flagged_redundant() {
        let mut graph = graph_of(&[("a", 1.0), ("b", 1.0), ("c", 1.0)]);
        depend(&mut graph, "b", "a").unwrap();
        depend(&mut graph, "c", "b").unwrap();
        depend(&mut graph, "c", "a").unwrap();

        let report = graph.validate();
        assert!(report.is_valid());
        assert_eq!(
            report.warnings,
            vec![ValidationWarning::Redundant("c->a".to_string())]
        );
    }

    #[test]
    fn estimate_mismatch_is_flagged_inefficient() {
        let mut graph = graph_of(&[("big", 50.0), ("small", 0.5)]);
        depend(&mut graph, "small", "big").unwrap();
        let report = graph.validate();
        assert!(matches!(
            report.warnings.as_slice(),
            [ValidationWarning::Inefficient { ratio, .. }] if *ratio >= 10.0
        ));
    }

    #[test]
    fn priority_inversion_is_flagged() {
        let mut graph = graph_of(&[("gate", 1.0), ("urgent", 1.0)]);
        {
            // direct status surgery keeps the fixture small
            let gate = graph.nodes.get_mut(&id("gate")).unwrap();
            gate.task.priority = TaskPriority::Low;
            let urgent = graph.nodes.get_mut(&id("urgent")).unwrap();
            urgent.task.priority = TaskPriority::Critical;
        }
        depend(&mut graph, "urgent", "gate").unwrap();
        let report = graph.validate();
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, ValidationWarning::PotentialIssue { .. })));
    }
}

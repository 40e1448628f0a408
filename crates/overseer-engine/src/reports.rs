//! Structured results the orchestrator hands back to embedders.

use overseer_core::identifier::TaskId;
use overseer_exec::ExecutionMetrics;
use overseer_graph::{DependencyProposal, GraphMetrics};

/// What a decomposition submission did
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecompositionReport {
    pub added_tasks: usize,
    pub added_edges: usize,
    /// Auto-applied proposals (confidence at or above the threshold)
    pub proposals_applied: usize,
    /// Lower-confidence proposals returned for review
    pub proposals_pending: Vec<DependencyProposal>,
    /// Tasks immediately ready to execute
    pub ready: Vec<TaskId>,
}

/// Outcome of a synchronous drain
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub completed: Vec<TaskId>,
    pub failed: Vec<TaskId>,
    /// Pending tasks that can never start because an ancestor failed
    pub blocked: Vec<TaskId>,
    /// Drain passes taken
    pub iterations: usize,
}

/// Point-in-time view of a project and the engines beneath it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub ready: Vec<TaskId>,
    /// Pending tasks gated by a failed, cancelled, or timed-out ancestor
    pub blocked: Vec<TaskId>,
    pub graph: GraphMetrics,
    pub executions: ExecutionMetrics,
}

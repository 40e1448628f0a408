//! Queue ordering. Each scheduler tick sorts the queued executions by the configured
//! algorithm; every algorithm tie-breaks on the lexicographic execution id so that
//! scheduling is deterministic.

use overseer_core::config::SchedulingAlgorithm;
use overseer_core::execution::Execution;
use overseer_core::identifier::ExecutionId;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

/// Normalisation horizons for the hybrid subscores
const URGENCY_HORIZON_SECS: f64 = 3600.0;
const DURATION_HORIZON_MINUTES: f64 = 480.0;
const MEMORY_HORIZON_MB: f64 = 8192.0;
const CPU_HORIZON_WEIGHT: f64 = 16.0;

/// Sort the queue in place, best candidate first
pub(crate) fn sort_queue(
    queue: &mut Vec<ExecutionId>,
    executions: &HashMap<ExecutionId, Execution>,
    algorithm: SchedulingAlgorithm,
) {
    let now = Instant::now();
    queue.sort_by(|a, b| {
        match (executions.get(a), executions.get(b)) {
            (Some(left), Some(right)) => compare(left, right, algorithm, now),
            // unknown ids sink to the back; the tick drops them
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.cmp(b),
        }
    });
}

fn compare(
    left: &Execution,
    right: &Execution,
    algorithm: SchedulingAlgorithm,
    now: Instant,
) -> Ordering {
    let ordering = match algorithm {
        SchedulingAlgorithm::PriorityFirst => left.priority.cmp(&right.priority),
        SchedulingAlgorithm::EarliestDeadline => left.timeout_at.cmp(&right.timeout_at),
        SchedulingAlgorithm::ShortestJob => total_order(
            left.requirements.estimated_duration_minutes,
            right.requirements.estimated_duration_minutes,
        ),
        SchedulingAlgorithm::ResourceBalanced => {
            total_order(footprint(left), footprint(right))
        }
        SchedulingAlgorithm::HybridOptimal => {
            // higher score first
            total_order(hybrid_score(right, now), hybrid_score(left, now))
        }
    };
    ordering.then_with(|| left.execution_id.cmp(&right.execution_id))
}

/// The hybrid score: four subscores each in `[0, 25]` — priority rank, urgency
/// until the timeout, resource footprint (smaller preferred), and estimated
/// duration (shorter preferred)
pub(crate) fn hybrid_score(execution: &Execution, now: Instant) -> f64 {
    let priority = (3 - execution.priority.rank()) as f64 / 3.0 * 25.0;

    let remaining = execution
        .timeout_at
        .saturating_duration_since(now)
        .as_secs_f64();
    let urgency = (1.0 - (remaining / URGENCY_HORIZON_SECS).min(1.0)) * 25.0;

    let resource = (1.0 - footprint(execution)) * 25.0;

    let duration = (1.0
        - (execution.requirements.estimated_duration_minutes / DURATION_HORIZON_MINUTES).min(1.0))
        * 25.0;

    priority + urgency + resource + duration
}

/// Normalised resource footprint in `[0, 1]`
fn footprint(execution: &Execution) -> f64 {
    let memory = (execution.requirements.memory_mb as f64 / MEMORY_HORIZON_MB).min(1.0);
    let cpu = (execution.requirements.cpu_weight / CPU_HORIZON_WEIGHT).min(1.0);
    (memory + cpu) / 2.0
}

fn total_order(left: f64, right: f64) -> Ordering {
    left.partial_cmp(&right).unwrap_or(Ordering::Equal)
}

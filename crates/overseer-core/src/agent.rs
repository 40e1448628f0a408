//! Worker agents. An agent advertises a resource capacity; the scheduler reserves
//! slices of it per assignment and releases them when the execution finishes.

use crate::error::{OverseerError, Result};
use crate::execution::ResourceRequirements;
use crate::identifier::AgentId;
use std::time::{Duration, Instant};

/// Availability of an agent
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
pub enum AgentStatus {
    Idle,
    Busy,
    Offline,
    Error,
}

/// A componentwise resource amount, used both as capacity and as current usage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceBudget {
    pub memory_mb: u64,
    pub cpu_weight: f64,
    pub concurrent_tasks: u32,
}

impl ResourceBudget {
    pub const ZERO: ResourceBudget = ResourceBudget {
        memory_mb: 0,
        cpu_weight: 0.0,
        concurrent_tasks: 0,
    };

    pub fn new(memory_mb: u64, cpu_weight: f64, concurrent_tasks: u32) -> Self {
        Self {
            memory_mb,
            cpu_weight,
            concurrent_tasks,
        }
    }
}

/// Rolling execution statistics for an agent
#[derive(Debug, Clone)]
pub struct AgentMetadata {
    pub last_heartbeat: Instant,
    pub total_tasks_executed: u64,
    pub average_execution_time: Duration,
    /// Fraction of executions that completed successfully, in `[0, 1]`
    pub success_rate: f64,
}

impl Default for AgentMetadata {
    fn default() -> Self {
        Self {
            last_heartbeat: Instant::now(),
            total_tasks_executed: 0,
            average_execution_time: Duration::ZERO,
            // an agent with no history is assumed reliable until proven otherwise
            success_rate: 1.0,
        }
    }
}

/// A registered worker agent
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub status: AgentStatus,
    pub capacity: ResourceBudget,
    pub usage: ResourceBudget,
    pub metadata: AgentMetadata,
}

impl Agent {
    pub fn new(id: AgentId, name: impl Into<String>, capacity: ResourceBudget) -> Self {
        Self {
            id,
            name: name.into(),
            status: AgentStatus::Idle,
            capacity,
            usage: ResourceBudget::ZERO,
            metadata: AgentMetadata::default(),
        }
    }

    /// Number of executions currently assigned
    pub fn active_tasks(&self) -> u32 {
        self.usage.concurrent_tasks
    }

    /// Whether this agent could take on the given requirements right now
    pub fn can_accept(&self, req: &ResourceRequirements) -> bool {
        self.status == AgentStatus::Idle
            && self.usage.memory_mb + req.memory_mb <= self.capacity.memory_mb
            && self.usage.cpu_weight + req.cpu_weight <= self.capacity.cpu_weight
            && self.usage.concurrent_tasks < self.capacity.concurrent_tasks
    }

    /// Reserve resources for an assignment. Keeps `usage ≤ capacity` componentwise.
    pub fn reserve(&mut self, req: &ResourceRequirements) -> Result<()> {
        if !self.can_accept(req) {
            return Err(OverseerError::conflict(format!(
                "agent {} cannot accept {}MB/{} cpu",
                self.id, req.memory_mb, req.cpu_weight
            )));
        }
        self.usage.memory_mb += req.memory_mb;
        self.usage.cpu_weight += req.cpu_weight;
        self.usage.concurrent_tasks += 1;
        self.status = AgentStatus::Busy;
        Ok(())
    }

    /// Release a previous reservation. Saturates at zero and returns the agent to
    /// `Idle` once no executions remain.
    pub fn release(&mut self, req: &ResourceRequirements) {
        self.usage.memory_mb = self.usage.memory_mb.saturating_sub(req.memory_mb);
        self.usage.cpu_weight = (self.usage.cpu_weight - req.cpu_weight).max(0.0);
        self.usage.concurrent_tasks = self.usage.concurrent_tasks.saturating_sub(1);
        if self.usage.concurrent_tasks == 0 && self.status == AgentStatus::Busy {
            self.status = AgentStatus::Idle;
        }
    }

    /// Fold one finished execution into the rolling statistics
    pub fn record_outcome(&mut self, success: bool, duration: Duration) {
        let previous = self.metadata.total_tasks_executed as f64;
        let total = previous + 1.0;
        let outcome = if success { 1.0 } else { 0.0 };
        self.metadata.success_rate = (self.metadata.success_rate * previous + outcome) / total;
        let prior_avg = self.metadata.average_execution_time.as_secs_f64();
        self.metadata.average_execution_time =
            Duration::from_secs_f64((prior_avg * previous + duration.as_secs_f64()) / total);
        self.metadata.total_tasks_executed += 1;
    }

    pub fn heartbeat(&mut self) {
        self.metadata.last_heartbeat = Instant::now();
    }

    /// Mean of the memory, cpu, and task-slot utilisation ratios, in `[0, 1]`
    pub fn utilization(&self) -> f64 {
        let mem = self.usage.memory_mb as f64 / self.capacity.memory_mb.max(1) as f64;
        let cpu = self.usage.cpu_weight / self.capacity.cpu_weight.max(f64::EPSILON);
        let tasks = self.usage.concurrent_tasks as f64 / self.capacity.concurrent_tasks.max(1) as f64;
        (mem + cpu + tasks) / 3.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> Agent {
        Agent::new(
            AgentId::new("a1").unwrap(),
            "builder",
            ResourceBudget::new(1024, 2.0, 2),
        )
    }

    fn req(memory: u64) -> ResourceRequirements {
        ResourceRequirements {
            memory_mb: memory,
            cpu_weight: 1.0,
            estimated_duration_minutes: 5.0,
        }
    }

    #[test]
    fn reserve_and_release_roundtrip() {
        let mut agent = agent();
        agent.reserve(&req(512)).unwrap();
        assert_eq!(agent.status, AgentStatus::Busy);
        assert_eq!(agent.active_tasks(), 1);

        agent.release(&req(512));
        assert_eq!(agent.status, AgentStatus::Idle);
        assert_eq!(agent.usage, ResourceBudget::ZERO);
    }

    #[test]
    fn reserve_refuses_overcommit() {
        let mut agent = agent();
        agent.reserve(&req(800)).unwrap();
        // second reservation would exceed the memory capacity
        assert!(agent.reserve(&req(800)).is_err());
        assert_eq!(agent.active_tasks(), 1);
    }

    #[test]
    fn busy_agents_are_not_eligible() {
        let mut agent = agent();
        agent.reserve(&req(100)).unwrap();
        assert_eq!(agent.status, AgentStatus::Busy);
        assert!(!agent.can_accept(&req(100)));
    }

    #[test]
    fn success_rate_is_a_running_mean() {
        let mut agent = agent();
        agent.record_outcome(true, Duration::from_secs(10));
        agent.record_outcome(false, Duration::from_secs(20));
        assert!((agent.metadata.success_rate - 0.5).abs() < 1e-9);
        assert_eq!(agent.metadata.average_execution_time, Duration::from_secs(15));
        assert_eq!(agent.metadata.total_tasks_executed, 2);
    }
}

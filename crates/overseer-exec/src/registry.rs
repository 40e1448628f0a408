//! The agent registry. All capacity accounting happens under one lock: picking the
//! best agent and reserving its resources is a single critical section, so two
//! concurrent assignments can never double-book a slot.

use overseer_core::agent::{Agent, AgentStatus, ResourceBudget};
use overseer_core::error::{OverseerError, Result};
use overseer_core::events::{EngineEvent, EventBus};
use overseer_core::execution::ResourceRequirements;
use overseer_core::identifier::AgentId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Registry of every known worker agent
pub struct AgentRegistry {
    agents: RwLock<HashMap<AgentId, Agent>>,
    bus: Arc<EventBus>,
}

impl AgentRegistry {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            bus,
        }
    }

    /// Register a new agent.
    ///
    /// # Error
    /// `conflict` when the id is already registered.
    pub fn register(&self, agent: Agent) -> Result<()> {
        let mut agents = self.agents.write();
        if agents.contains_key(&agent.id) {
            return Err(OverseerError::conflict(format!(
                "agent {} already registered",
                agent.id
            )));
        }
        let id = agent.id.clone();
        agents.insert(id.clone(), agent);
        drop(agents);
        info!("agent {} registered", id);
        self.bus.publish(EngineEvent::AgentRegistered { agent_id: id });
        Ok(())
    }

    /// Remove an agent, returning its final state. The engine cancels the agent's
    /// running executions before calling this.
    pub fn unregister(&self, id: &AgentId) -> Result<Agent> {
        let removed = self
            .agents
            .write()
            .remove(id)
            .ok_or_else(|| OverseerError::validation(format!("unknown agent {}", id)))?;
        self.bus.publish(EngineEvent::AgentUnregistered {
            agent_id: id.clone(),
        });
        Ok(removed)
    }

    /// Update an agent's reported status (and optionally its usage), refreshing the
    /// heartbeat.
    pub fn update_status(
        &self,
        id: &AgentId,
        status: AgentStatus,
        usage: Option<ResourceBudget>,
    ) -> Result<()> {
        let mut agents = self.agents.write();
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| OverseerError::validation(format!("unknown agent {}", id)))?;
        if let Some(usage) = usage {
            if usage.memory_mb > agent.capacity.memory_mb
                || usage.cpu_weight > agent.capacity.cpu_weight
                || usage.concurrent_tasks > agent.capacity.concurrent_tasks
            {
                return Err(OverseerError::validation(format!(
                    "reported usage exceeds the capacity of agent {}",
                    id
                )));
            }
            agent.usage = usage;
        }
        agent.status = status;
        agent.heartbeat();
        drop(agents);
        self.bus.publish(EngineEvent::AgentStatusUpdated {
            agent_id: id.clone(),
            status,
        });
        Ok(())
    }

    /// Refresh an agent's heartbeat without touching anything else
    pub fn heartbeat(&self, id: &AgentId) -> Result<()> {
        let mut agents = self.agents.write();
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| OverseerError::validation(format!("unknown agent {}", id)))?;
        agent.heartbeat();
        Ok(())
    }

    /// Pick the best eligible agent for the requirements and reserve its resources,
    /// atomically. The best agent maximises `utilization score + performance score`
    /// (each out of 50); ties resolve to the smaller id.
    pub fn select_and_reserve(&self, requirements: &ResourceRequirements) -> Option<AgentId> {
        let mut agents = self.agents.write();
        let mut best: Option<(f64, AgentId)> = None;
        for agent in agents.values() {
            if !agent.can_accept(requirements) {
                continue;
            }
            let utilization_score = (1.0 - agent.utilization()) * 50.0;
            let performance_score = agent.metadata.success_rate * 50.0;
            let score = utilization_score + performance_score;
            let better = match &best {
                None => true,
                Some((best_score, best_id)) => {
                    score > *best_score || (score == *best_score && agent.id < *best_id)
                }
            };
            if better {
                best = Some((score, agent.id.clone()));
            }
        }
        let (_, id) = best?;
        let agent = agents.get_mut(&id)?;
        match agent.reserve(requirements) {
            Ok(()) => Some(id),
            Err(_) => None,
        }
    }

    /// Release a reservation, optionally folding the execution outcome into the
    /// agent's statistics
    pub fn release(
        &self,
        id: &AgentId,
        requirements: &ResourceRequirements,
        outcome: Option<(bool, Duration)>,
    ) -> Result<()> {
        let mut agents = self.agents.write();
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| OverseerError::validation(format!("unknown agent {}", id)))?;
        agent.release(requirements);
        if let Some((success, duration)) = outcome {
            agent.record_outcome(success, duration);
        }
        Ok(())
    }

    /// Downgrade agents whose heartbeat is older than `threshold` to offline,
    /// returning the ids that were downgraded
    pub fn mark_stale(&self, threshold: Duration) -> Vec<AgentId> {
        let mut agents = self.agents.write();
        let mut stale = vec![];
        for agent in agents.values_mut() {
            if agent.status != AgentStatus::Offline
                && agent.metadata.last_heartbeat.elapsed() > threshold
            {
                warn!("agent {} heartbeat is stale, marking offline", agent.id);
                agent.status = AgentStatus::Offline;
                stale.push(agent.id.clone());
            }
        }
        drop(agents);
        for id in &stale {
            self.bus.publish(EngineEvent::AgentStatusUpdated {
                agent_id: id.clone(),
                status: AgentStatus::Offline,
            });
        }
        stale
    }

    pub fn agent(&self, id: &AgentId) -> Option<Agent> {
        self.agents.read().get(id).cloned()
    }

    pub fn agents(&self) -> Vec<Agent> {
        self.agents.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AgentRegistry {
        AgentRegistry::new(Arc::new(EventBus::new()))
    }

    fn agent(id: &str, memory: u64) -> Agent {
        Agent::new(
            AgentId::new(id).unwrap(),
            id,
            ResourceBudget::new(memory, 4.0, 2),
        )
    }

    fn requirements() -> ResourceRequirements {
        ResourceRequirements {
            memory_mb: 256,
            cpu_weight: 1.0,
            estimated_duration_minutes: 5.0,
        }
    }

    #[test]
    fn register_conflicts_on_duplicate_id() {
        let registry = registry();
        registry.register(agent("a1", 1024)).unwrap();
        let err = registry.register(agent("a1", 2048)).unwrap_err();
        assert_eq!(err.kind(), overseer_core::error::ErrorKind::Conflict);
    }

    #[test]
    fn selection_prefers_the_better_success_rate() {
        let registry = registry();
        let mut flaky = agent("flaky", 4096);
        flaky.record_outcome(false, Duration::from_secs(10));
        registry.register(flaky).unwrap();
        registry.register(agent("solid", 4096)).unwrap();

        let chosen = registry.select_and_reserve(&requirements()).unwrap();
        assert_eq!(chosen.as_str(), "solid");
    }

    #[test]
    fn selection_tie_breaks_on_the_smaller_id() {
        let registry = registry();
        registry.register(agent("beta", 4096)).unwrap();
        registry.register(agent("alpha", 4096)).unwrap();
        let chosen = registry.select_and_reserve(&requirements()).unwrap();
        assert_eq!(chosen.as_str(), "alpha");
    }

    #[test]
    fn reservation_is_exclusive_until_released() {
        let registry = registry();
        registry.register(agent("only", 1024)).unwrap();

        let chosen = registry.select_and_reserve(&requirements()).unwrap();
        // the agent is now busy; nothing is eligible
        assert!(registry.select_and_reserve(&requirements()).is_none());

        registry
            .release(&chosen, &requirements(), Some((true, Duration::from_secs(3))))
            .unwrap();
        let after = registry.agent(&chosen).unwrap();
        assert_eq!(after.status, AgentStatus::Idle);
        assert_eq!(after.metadata.total_tasks_executed, 1);
        assert!(registry.select_and_reserve(&requirements()).is_some());
    }

    #[test]
    fn usage_reports_cannot_exceed_capacity() {
        let registry = registry();
        registry.register(agent("a1", 1024)).unwrap();
        let err = registry
            .update_status(
                &AgentId::new("a1").unwrap(),
                AgentStatus::Busy,
                Some(ResourceBudget::new(9999, 1.0, 1)),
            )
            .unwrap_err();
        assert_eq!(err.kind(), overseer_core::error::ErrorKind::Validation);
    }

    #[test]
    fn stale_heartbeats_downgrade_to_offline() {
        let registry = registry();
        registry.register(agent("a1", 1024)).unwrap();
        assert!(registry.mark_stale(Duration::from_secs(60)).is_empty());

        std::thread::sleep(Duration::from_millis(5));
        let stale = registry.mark_stale(Duration::ZERO);
        assert_eq!(stale.len(), 1);
        assert_eq!(
            registry.agent(&stale[0]).unwrap().status,
            AgentStatus::Offline
        );
        // already offline agents are not reported again
        assert!(registry.mark_stale(Duration::ZERO).is_empty());
    }
}

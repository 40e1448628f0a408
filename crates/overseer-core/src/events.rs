//! The event channels every engine publishes on. Consumers subscribe to the bus and
//! receive their own clone of each event; a publish never blocks the publisher.

use crate::agent::AgentStatus;
use crate::gate::{AuditEvent, LockMode};
use crate::identifier::{AgentId, BackupId, ExecutionId, LockId, TaskId};
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::time::Duration;

/// Everything the engines tell the outside world
#[derive(Debug, Clone)]
pub enum EngineEvent {
    TaskSubmitted {
        task_id: TaskId,
        execution_id: ExecutionId,
    },
    TaskAssigned {
        execution_id: ExecutionId,
        task_id: TaskId,
        agent_id: AgentId,
    },
    ExecutionCompleted {
        execution_id: ExecutionId,
        task_id: TaskId,
        success: bool,
    },
    ExecutionCancelled {
        execution_id: ExecutionId,
        task_id: TaskId,
    },
    TaskTimeout {
        execution_id: ExecutionId,
        task_id: TaskId,
        /// whether a retry was re-enqueued
        retrying: bool,
    },
    TaskWarning {
        execution_id: ExecutionId,
        task_id: TaskId,
        running_for: Duration,
    },
    ExecutionRetry {
        execution_id: ExecutionId,
        previous: ExecutionId,
        task_id: TaskId,
        retry_count: u32,
    },
    AgentRegistered {
        agent_id: AgentId,
    },
    AgentUnregistered {
        agent_id: AgentId,
    },
    AgentStatusUpdated {
        agent_id: AgentId,
        status: AgentStatus,
    },
    LockAcquired {
        lock_id: LockId,
        resource: String,
        mode: LockMode,
    },
    LockReleased {
        lock_id: LockId,
        resource: String,
    },
    SecurityEvent {
        event: AuditEvent,
    },
    BackupCreated {
        backup_id: BackupId,
        size_bytes: u64,
    },
    MetricsCollected {
        snapshot: serde_json::Value,
    },
}

/// Fan-out bus. Each subscriber gets an unbounded channel; disconnected subscribers
/// are dropped on the next publish.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<EngineEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new subscription
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        let (sender, receiver) = unbounded();
        self.subscribers.lock().push(sender);
        receiver
    }

    /// Publish an event to every live subscriber
    pub fn publish(&self, event: EngineEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_sees_every_event() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(EngineEvent::AgentRegistered {
            agent_id: AgentId::new("agent").unwrap(),
        });

        assert!(matches!(a.try_recv().unwrap(), EngineEvent::AgentRegistered { .. }));
        assert!(matches!(b.try_recv().unwrap(), EngineEvent::AgentRegistered { .. }));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());

        bus.publish(EngineEvent::AgentRegistered {
            agent_id: AgentId::new("agent").unwrap(),
        });
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.len(), 1);
    }
}

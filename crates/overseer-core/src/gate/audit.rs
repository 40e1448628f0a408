//! Append-only audit ring. Bounded in memory; a daily GC drops events older than the
//! retention window.

use crate::clock;
use crate::config::AuditConfig;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};

const SECONDS_PER_DAY: u64 = 86_400;

/// How serious an audited event is. Everything above `Medium` is also published on
/// the event bus.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AuditSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// One audited event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: String,
    pub unix_time: u64,
    pub event_type: String,
    pub severity: AuditSeverity,
    pub action: String,
    pub result: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl AuditEvent {
    pub fn new(
        event_type: impl Into<String>,
        severity: AuditSeverity,
        action: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: clock::now_rfc3339(),
            unix_time: clock::unix_seconds(),
            event_type: event_type.into(),
            severity,
            action: action.into(),
            result: result.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// The bounded event ring
pub struct AuditLog {
    events: Mutex<VecDeque<AuditEvent>>,
    max_events: usize,
    retention_days: u32,
}

impl AuditLog {
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            max_events: config.max_events.max(1),
            retention_days: config.retention_days,
        }
    }

    /// Append an event, evicting the oldest when the ring is full
    pub fn record(&self, event: AuditEvent) {
        let mut events = self.events.lock();
        if events.len() == self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// The most recent `n` events, newest last
    pub fn recent(&self, n: usize) -> Vec<AuditEvent> {
        let events = self.events.lock();
        events.iter().rev().take(n).rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Drop events older than the retention window, returning how many were dropped
    pub fn gc(&self) -> usize {
        let cutoff = clock::unix_seconds()
            .saturating_sub(u64::from(self.retention_days) * SECONDS_PER_DAY);
        let mut events = self.events.lock();
        let before = events.len();
        events.retain(|event| event.unix_time >= cutoff);
        before - events.len()
    }
}

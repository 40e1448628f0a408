//! Advisory locks on named resources. Cooperative only: mutual exclusion holds among
//! participants who ask the gate. Readers share with readers; writers and executors
//! are exclusive with everything. Locks expire after `max_lock_duration_ms` and an
//! expiry sweep evicts leftovers.

use crate::config::LockConfig;
use crate::identifier::LockId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// The sharing class of a lock
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LockMode {
    Read,
    Write,
    Execute,
}

impl LockMode {
    fn conflicts_with(self, other: LockMode) -> bool {
        !(self == LockMode::Read && other == LockMode::Read)
    }
}

/// A currently held lock
#[derive(Debug, Clone)]
pub struct LockRecord {
    pub id: LockId,
    pub resource: String,
    pub mode: LockMode,
    pub owner: Option<String>,
    pub acquired_at: Instant,
    pub expires_at: Instant,
}

/// Outcome of a single non-blocking acquisition attempt
enum Attempt {
    Acquired(LockRecord),
    Busy { holder: Option<String>, mode: LockMode },
}

/// Tracks all advisory locks for one gate
pub struct LockManager {
    max_duration: Duration,
    locks: Mutex<HashMap<String, Vec<LockRecord>>>,
}

impl LockManager {
    pub fn new(config: &LockConfig) -> Self {
        Self {
            max_duration: Duration::from_millis(config.max_lock_duration_ms),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire a lock, waiting up to `timeout` for conflicting holders to clear.
    ///
    /// Returns the record on success; `None` when the resource stayed busy for the
    /// whole timeout, alongside a description of the current holder.
    pub fn acquire(
        &self,
        resource: &str,
        mode: LockMode,
        owner: Option<String>,
        timeout: Duration,
    ) -> Result<LockRecord, String> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.try_acquire(resource, mode, owner.clone()) {
                Attempt::Acquired(record) => return Ok(record),
                Attempt::Busy { holder, mode } => {
                    if Instant::now() >= deadline {
                        return Err(format!(
                            "{} lock on {:?} held by {}",
                            mode,
                            resource,
                            holder.as_deref().unwrap_or("<anonymous>")
                        ));
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        }
    }

    fn try_acquire(&self, resource: &str, mode: LockMode, owner: Option<String>) -> Attempt {
        let mut locks = self.locks.lock();
        let held = locks.entry(resource.to_string()).or_default();
        let now = Instant::now();
        held.retain(|record| record.expires_at > now);

        if let Some(conflict) = held
            .iter()
            .find(|record| record.mode.conflicts_with(mode) || mode.conflicts_with(record.mode))
        {
            return Attempt::Busy {
                holder: conflict.owner.clone(),
                mode: conflict.mode,
            };
        }

        let record = LockRecord {
            id: LockId::generate(),
            resource: resource.to_string(),
            mode,
            owner,
            acquired_at: now,
            expires_at: now + self.max_duration,
        };
        held.push(record.clone());
        Attempt::Acquired(record)
    }

    /// Release a held lock. Returns the record, or `None` for an unknown id
    /// (it may have expired and been swept).
    pub fn release(&self, id: &LockId) -> Option<LockRecord> {
        let mut locks = self.locks.lock();
        for held in locks.values_mut() {
            if let Some(index) = held.iter().position(|record| &record.id == id) {
                return Some(held.remove(index));
            }
        }
        None
    }

    /// Evict every expired lock, returning what was evicted
    pub fn sweep_expired(&self) -> Vec<LockRecord> {
        let mut locks = self.locks.lock();
        let now = Instant::now();
        let mut evicted = vec![];
        for held in locks.values_mut() {
            let (dead, alive): (Vec<_>, Vec<_>) =
                held.drain(..).partition(|record| record.expires_at <= now);
            evicted.extend(dead);
            *held = alive;
        }
        locks.retain(|_, held| !held.is_empty());
        evicted
    }

    /// Number of currently held locks
    pub fn held_count(&self) -> usize {
        self.locks.lock().values().map(|held| held.len()).sum()
    }
}

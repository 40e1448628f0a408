//! The security gate mediates every filesystem-touching operation: path validation,
//! input sanitisation, advisory locking, and the audit trail. Other engines hold an
//! `Arc<SecurityGate>` and call it before any I/O.

use crate::config::{AuditConfig, LockConfig, SecurityConfig};
use crate::error::{OverseerError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::identifier::LockId;
use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub mod audit;
pub mod locks;
pub mod paths;
pub mod sanitize;

pub use audit::{AuditEvent, AuditLog, AuditSeverity};
pub use locks::{LockManager, LockMode, LockRecord};
pub use paths::{AccessMode, PathPolicy, PathViolation, PathViolationKind};

/// The gate itself. Construct one per engine at startup and share it via `Arc`.
pub struct SecurityGate {
    policy: PathPolicy,
    locks: LockManager,
    audit: AuditLog,
    security: SecurityConfig,
    lock_config: LockConfig,
    bus: Arc<EventBus>,
}

impl SecurityGate {
    pub fn new(
        security: SecurityConfig,
        locks: LockConfig,
        audit: AuditConfig,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            policy: PathPolicy::from_config(&security),
            locks: LockManager::new(&locks),
            audit: AuditLog::new(&audit),
            security,
            lock_config: locks,
            bus,
        }
    }

    /// Validate a path for the given access mode.
    ///
    /// # Error
    /// A violation surfaces as the `permission` kind and is audited.
    pub fn validate_path(&self, path: &Path, mode: AccessMode) -> Result<PathBuf> {
        match self.policy.validate(path, mode) {
            Ok(normalized) => Ok(normalized),
            Err(violation) => {
                self.log_event(
                    "pathValidation",
                    AuditSeverity::High,
                    format!("{} {}", mode, path.display()),
                    violation.kind.to_string(),
                    &[],
                );
                Err(OverseerError::permission(violation.to_string()))
            }
        }
    }

    /// Recursively sanitise a JSON value in place
    pub fn sanitize(&self, value: &mut Value) {
        sanitize::sanitize_value(value, &self.security);
    }

    /// Sanitise a single string
    pub fn sanitize_text(&self, input: &str) -> String {
        sanitize::sanitize_string(input, &self.security)
    }

    /// Acquire an advisory lock on a named resource.
    ///
    /// # Error
    /// The `permission` kind when the resource stays busy for the whole timeout.
    pub fn acquire_lock(
        &self,
        resource: &str,
        mode: LockMode,
        owner: Option<String>,
        timeout: Duration,
    ) -> Result<LockId> {
        match self.locks.acquire(resource, mode, owner, timeout) {
            Ok(record) => {
                self.bus.publish(EngineEvent::LockAcquired {
                    lock_id: record.id.clone(),
                    resource: record.resource.clone(),
                    mode: record.mode,
                });
                Ok(record.id)
            }
            Err(holder) => {
                self.log_event(
                    "lockContention",
                    AuditSeverity::Medium,
                    format!("acquire {}", resource),
                    &holder,
                    &[],
                );
                Err(OverseerError::permission(format!(
                    "lock busy: {}",
                    holder
                )))
            }
        }
    }

    /// Release a previously acquired lock.
    ///
    /// # Error
    /// The `validation` kind for an unknown id (it may already have expired).
    pub fn release_lock(&self, id: &LockId) -> Result<()> {
        match self.locks.release(id) {
            Some(record) => {
                self.bus.publish(EngineEvent::LockReleased {
                    lock_id: record.id,
                    resource: record.resource,
                });
                Ok(())
            }
            None => Err(OverseerError::validation(format!(
                "unknown lock id {}",
                id
            ))),
        }
    }

    /// Append an audit event. Events above `Medium` severity are also published as
    /// [`EngineEvent::SecurityEvent`].
    pub fn log_event(
        &self,
        event_type: impl Into<String>,
        severity: AuditSeverity,
        action: impl Into<String>,
        result: impl Into<String>,
        details: &[(&str, &str)],
    ) {
        let mut event = AuditEvent::new(event_type, severity, action, result);
        for (key, value) in details {
            event = event.with_detail(*key, *value);
        }
        self.audit.record(event.clone());
        if severity > AuditSeverity::Medium {
            self.bus.publish(EngineEvent::SecurityEvent { event });
        }
    }

    /// The audit trail
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Direct access to the lock table (expiry sweeps, diagnostics)
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Evict expired locks, auditing the sweep when anything was evicted
    pub fn sweep_locks(&self) {
        let evicted = self.locks.sweep_expired();
        if !evicted.is_empty() {
            debug!("evicted {} expired locks", evicted.len());
            self.log_event(
                "lockSweep",
                AuditSeverity::Low,
                "sweep expired locks",
                format!("evicted {}", evicted.len()),
                &[],
            );
        }
        self.audit.gc();
    }

    /// Start the background lock sweeper. The returned handle stops it on drop.
    pub fn spawn_lock_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let gate = Arc::clone(self);
        let interval = Duration::from_millis(self.lock_config.cleanup_interval_ms);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = std::thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => gate.sweep_locks(),
                _ => break,
            }
        });
        SweeperHandle {
            stop: stop_tx,
            handle: Some(handle),
        }
    }
}

/// Stops the lock sweeper when dropped
pub struct SweeperHandle {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverseerConfig;

    fn gate_with(config: OverseerConfig) -> (Arc<SecurityGate>, crossbeam::channel::Receiver<EngineEvent>) {
        let bus = Arc::new(EventBus::new());
        let events = bus.subscribe();
        let gate = Arc::new(SecurityGate::new(
            config.security,
            config.locks,
            config.audit,
            bus,
        ));
        (gate, events)
    }

    #[test]
    fn violations_are_audited_and_permission_kinded() {
        let mut config = OverseerConfig::default();
        config.security.allowed_write_paths = vec![PathBuf::from("/data")];
        let (gate, events) = gate_with(config);

        let err = gate
            .validate_path(Path::new("/data/../etc/shadow"), AccessMode::Write)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Permission);
        assert_eq!(gate.audit().len(), 1);
        // high severity goes out on the bus too
        assert!(matches!(
            events.try_recv().unwrap(),
            EngineEvent::SecurityEvent { .. }
        ));
    }

    #[test]
    fn lock_lifecycle_publishes_events() {
        let (gate, events) = gate_with(OverseerConfig::default());
        let lock = gate
            .acquire_lock("task:t1", LockMode::Write, None, Duration::ZERO)
            .unwrap();
        gate.release_lock(&lock).unwrap();
        assert!(gate.release_lock(&lock).is_err());

        assert!(matches!(
            events.try_recv().unwrap(),
            EngineEvent::LockAcquired { .. }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            EngineEvent::LockReleased { .. }
        ));
    }
}

//! Transactions group entity mutations. Each operation applies immediately but
//! captures a pre-image first; rollback replays the pre-images in reverse order.
//! The entity write locks taken by each operation are held until the transaction
//! resolves, which serialises concurrent transactions touching the same entity.

use crate::cache::StoreCache;
use crate::engine::{EntityLockGuard, StorageEngine};
use crate::entity::{Entity, EntityKind};
use overseer_core::error::{OverseerError, Result};
use serde_json::Value;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Where a transaction is in its life
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "camelCase")]
pub enum TransactionStatus {
    Pending,
    Committed,
    RolledBack,
    Failed,
}

/// What undoing one operation takes
enum UndoRecord {
    /// The entity did not exist before: remove it again
    Remove { kind: EntityKind, id: String },
    /// The entity existed: restore the record and its index entry
    Restore {
        kind: EntityKind,
        id: String,
        value: Value,
        index_entry: Option<Value>,
    },
}

/// A group of mutations with rollback
pub struct Transaction<'a> {
    engine: &'a StorageEngine,
    id: String,
    status: TransactionStatus,
    undo: Vec<UndoRecord>,
    locks: Vec<EntityLockGuard>,
    /// Resources this transaction already holds; the entity lock is not reentrant
    locked: BTreeSet<String>,
}

impl StorageEngine {
    /// Begin a transaction. Drop without commit rolls it back.
    pub fn begin_transaction(&self) -> Transaction<'_> {
        Transaction {
            engine: self,
            id: Uuid::new_v4().to_string(),
            status: TransactionStatus::Pending,
            undo: vec![],
            locks: vec![],
            locked: BTreeSet::new(),
        }
    }
}

impl<'a> Transaction<'a> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Create an entity inside the transaction
    pub fn create<E: Entity>(&mut self, entity: &E) -> Result<()> {
        self.ensure_pending()?;
        let id = entity.entity_id();
        self.lock_once(E::KIND, &id)?;

        let path = self
            .engine
            .entity_path(E::KIND, &id, overseer_core::gate::AccessMode::Write)?;
        if path.exists() {
            return Err(OverseerError::conflict(format!(
                "{} {} already exists",
                E::KIND,
                id
            )));
        }
        let mut value = serde_json::to_value(entity)?;
        self.engine.gate().sanitize(&mut value);
        self.engine
            .raw_write(E::KIND, &id, &value, Some(&entity.summary()))?;
        self.undo.push(UndoRecord::Remove { kind: E::KIND, id });
        Ok(())
    }

    /// Update an entity inside the transaction (partial merge, id immutable)
    pub fn update<E: Entity>(&mut self, id: &str, patch: Value) -> Result<E> {
        self.ensure_pending()?;
        self.lock_once(E::KIND, id)?;

        let before = self.engine.raw_read(E::KIND, id)?;
        let index_before = self.engine.index_entry(E::KIND, id)?;
        let entity = self.apply_update::<E>(id, &before, patch)?;
        self.undo.push(UndoRecord::Restore {
            kind: E::KIND,
            id: id.to_string(),
            value: before,
            index_entry: index_before,
        });
        Ok(entity)
    }

    /// Delete an entity inside the transaction
    pub fn delete<E: Entity>(&mut self, id: &str) -> Result<()> {
        self.ensure_pending()?;
        self.lock_once(E::KIND, id)?;

        let before = self.engine.raw_read(E::KIND, id)?;
        let index_before = self.engine.index_entry(E::KIND, id)?;
        self.engine.raw_delete(E::KIND, id)?;
        self.undo.push(UndoRecord::Restore {
            kind: E::KIND,
            id: id.to_string(),
            value: before,
            index_entry: index_before,
        });
        Ok(())
    }

    /// Keep every applied operation and release the locks
    pub fn commit(mut self) -> Result<()> {
        self.ensure_pending()?;
        self.status = TransactionStatus::Committed;
        self.release_locks();
        Ok(())
    }

    /// Undo every applied operation, newest first
    pub fn rollback(mut self) -> Result<()> {
        self.ensure_pending()?;
        let outcome = self.rollback_inner();
        self.release_locks();
        outcome
    }

    fn rollback_inner(&mut self) -> Result<()> {
        while let Some(record) = self.undo.pop() {
            let result = match record {
                UndoRecord::Remove { kind, ref id } => self.engine.raw_delete(kind, id),
                UndoRecord::Restore {
                    kind,
                    ref id,
                    ref value,
                    ref index_entry,
                } => self
                    .engine
                    .raw_write(kind, id, value, index_entry.as_ref()),
            };
            if let Err(e) = result {
                self.status = TransactionStatus::Failed;
                return Err(OverseerError::system(format!(
                    "rollback of transaction {} failed: {}",
                    self.id, e
                )));
            }
        }
        self.status = TransactionStatus::RolledBack;
        Ok(())
    }

    fn apply_update<E: Entity>(&self, id: &str, before: &Value, patch: Value) -> Result<E> {
        if let Some(patched_id) = patch.get("id") {
            if patched_id != &Value::String(id.to_string()) {
                return Err(OverseerError::validation(format!(
                    "id is immutable, cannot change {} to {}",
                    id, patched_id
                )));
            }
        }
        let mut merged = before.clone();
        crate::engine::merge_value(&mut merged, patch);
        let mut entity: E = serde_json::from_value(merged)?;
        entity.refresh_updated_at();
        let mut value = serde_json::to_value(&entity)?;
        self.engine.gate().sanitize(&mut value);
        self.engine
            .raw_write(E::KIND, id, &value, Some(&entity.summary()))?;
        Ok(entity)
    }

    fn lock_once(&mut self, kind: EntityKind, id: &str) -> Result<()> {
        let key = StoreCache::key(kind, id);
        if self.locked.insert(key) {
            let guard = self.engine.lock_entity(kind, id)?;
            self.locks.push(guard);
        }
        Ok(())
    }

    fn ensure_pending(&self) -> Result<()> {
        if self.status == TransactionStatus::Pending {
            Ok(())
        } else {
            Err(OverseerError::conflict(format!(
                "transaction {} is {}",
                self.id, self.status
            )))
        }
    }

    fn release_locks(&mut self) {
        for guard in self.locks.drain(..) {
            self.engine.unlock(guard);
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.status == TransactionStatus::Pending {
            if let Err(e) = self.rollback_inner() {
                warn!("implicit rollback failed: {}", e);
            }
            self.release_locks();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::testing::store;
    use crate::entity::Entity;
    use super::*;
    use overseer_core::identifier::{ProjectId, TaskId};
    use overseer_core::task::{Task, TaskStatus};
    use serde_json::json;

    fn task(id: &str) -> Task {
        Task::new(
            TaskId::new(id).unwrap(),
            ProjectId::new("p1").unwrap(),
            format!("task {}", id),
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn committed_work_stays() {
        let fixture = store();
        let mut tx = fixture.engine.begin_transaction();
        tx.create(&task("t1")).unwrap();
        tx.create(&task("t2")).unwrap();
        tx.commit().unwrap();

        assert!(fixture.engine.get::<Task>("t1").is_ok());
        assert_eq!(fixture.engine.list(crate::EntityKind::Task).unwrap().len(), 2);
    }

    #[test]
    fn rollback_restores_pre_images_in_reverse() {
        let fixture = store();
        fixture.engine.create(&task("existing")).unwrap();

        let mut tx = fixture.engine.begin_transaction();
        tx.create(&task("fresh")).unwrap();
        let _: Task = tx
            .update("existing", json!({"status": "running"}))
            .unwrap();
        tx.delete::<Task>("existing").unwrap();
        tx.rollback().unwrap();

        // the created entity is gone, the updated-then-deleted one is back untouched
        assert!(fixture.engine.get::<Task>("fresh").is_err());
        let restored: Task = fixture.engine.get::<Task>("existing").unwrap();
        assert_eq!(restored.status, TaskStatus::Pending);
        assert_eq!(fixture.engine.list(crate::EntityKind::Task).unwrap().len(), 1);
    }

    #[test]
    fn dropping_a_pending_transaction_rolls_back() {
        let fixture = store();
        {
            let mut tx = fixture.engine.begin_transaction();
            tx.create(&task("ephemeral")).unwrap();
        }
        assert!(fixture.engine.get::<Task>("ephemeral").is_err());
    }

    #[test]
    fn transactions_serialise_on_the_same_entity() {
        let fixture = store();
        fixture.engine.create(&task("shared")).unwrap();

        let mut tx = fixture.engine.begin_transaction();
        let _: Task = tx.update("shared", json!({"status": "running"})).unwrap();

        // the entity write lock is held; a direct mutation cannot get in
        let err = fixture
            .engine
            .update::<Task>("shared", json!({"status": "cancelled"}))
            .unwrap_err();
        assert_eq!(err.kind(), overseer_core::error::ErrorKind::Permission);

        tx.commit().unwrap();
        let after: Task = fixture.engine.get("shared").unwrap();
        assert_eq!(after.status, TaskStatus::Running);
    }

    #[test]
    fn status_reflects_resolution() {
        let fixture = store();
        let tx = fixture.engine.begin_transaction();
        assert_eq!(tx.status(), TransactionStatus::Pending);
        assert!(!tx.id().is_empty());
        tx.commit().unwrap();

        let tx = fixture.engine.begin_transaction();
        tx.rollback().unwrap();
        assert_eq!(task("a").entity_id(), "a");
    }
}

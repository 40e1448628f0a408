//! The storage engine proper: entity CRUD over per-record JSON files plus index
//! files, all mediated by the security gate. Writes are atomic (temp file, then
//! rename); mutations hold the entity's advisory write lock plus the shared side of
//! the snapshot lock so a running backup excludes them.

use crate::cache::StoreCache;
use crate::entity::{file_stem, Entity, EntityKind};
use overseer_core::checksum::SCHEMA_VERSION;
use overseer_core::clock;
use overseer_core::error::{OverseerError, Result};
use overseer_core::gate::{AccessMode, LockMode, SecurityGate};
use overseer_core::identifier::LockId;
use overseer_core::config::CacheConfig;
use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Directories created beneath the data root
pub const DATA_DIRS: [&str; 8] = [
    "tasks",
    "projects",
    "dependencies",
    "epics",
    "graphs",
    "indexes",
    "backups",
    "logs",
];

/// Resource name of the whole-store snapshot lock. Mutations hold it shared; the
/// backup copy holds it exclusively.
pub(crate) const SNAPSHOT_RESOURCE: &str = "storage:snapshot";

/// How long a mutation waits for locks before giving up
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// File-backed storage for the data model
pub struct StorageEngine {
    root: PathBuf,
    gate: Arc<SecurityGate>,
    cache: Arc<StoreCache>,
}

impl StorageEngine {
    /// Open (and lay out) a store at `root`. The root must be inside the gate's
    /// allowed write paths.
    pub fn new(
        root: impl Into<PathBuf>,
        gate: Arc<SecurityGate>,
        cache_config: &CacheConfig,
    ) -> Result<Self> {
        let root = root.into();
        let root = gate.validate_path(&root, AccessMode::Write)?;
        for dir in DATA_DIRS {
            fs::create_dir_all(root.join(dir))?;
        }
        Ok(Self {
            root,
            gate,
            cache: Arc::new(StoreCache::new(cache_config)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn gate(&self) -> &Arc<SecurityGate> {
        &self.gate
    }

    pub fn cache(&self) -> &Arc<StoreCache> {
        &self.cache
    }

    /// Persist a new entity.
    ///
    /// # Error
    /// `conflict` when a record with the same id already exists.
    pub fn create<E: Entity>(&self, entity: &E) -> Result<()> {
        let id = entity.entity_id();
        let mut value = serde_json::to_value(entity)?;
        self.gate.sanitize(&mut value);
        let guard = self.lock_entity(E::KIND, &id)?;
        let result = (|| {
            let path = self.entity_path(E::KIND, &id, AccessMode::Write)?;
            if path.exists() {
                return Err(OverseerError::conflict(format!(
                    "{} {} already exists",
                    E::KIND,
                    id
                )));
            }
            self.raw_write(E::KIND, &id, &value, Some(&entity.summary()))
        })();
        self.unlock(guard);
        result
    }

    /// Read an entity, cache first.
    ///
    /// # Error
    /// `validation` for an unknown id.
    pub fn get<E: Entity>(&self, id: &str) -> Result<E> {
        let key = StoreCache::key(E::KIND, id);
        if let Some(value) = self.cache.get(&key) {
            return Ok(serde_json::from_value(value)?);
        }
        let value = self.raw_read(E::KIND, id)?;
        self.cache.set(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    /// Apply a partial update: `patch` deep-merges into the stored record. The id is
    /// immutable; a patch that tries to change it is refused.
    pub fn update<E: Entity>(&self, id: &str, patch: Value) -> Result<E> {
        if let Some(patched_id) = patch.get("id") {
            let current = Value::String(id.to_string());
            if patched_id != &current {
                return Err(OverseerError::validation(format!(
                    "id is immutable, cannot change {} to {}",
                    id, patched_id
                )));
            }
        }
        let guard = self.lock_entity(E::KIND, id)?;
        let result = (|| {
            let mut value = self.raw_read(E::KIND, id)?;
            merge_value(&mut value, patch);
            let mut entity: E = serde_json::from_value(value)?;
            entity.refresh_updated_at();
            let mut value = serde_json::to_value(&entity)?;
            self.gate.sanitize(&mut value);
            self.raw_write(E::KIND, id, &value, Some(&entity.summary()))?;
            Ok(entity)
        })();
        self.unlock(guard);
        result
    }

    /// Delete an entity and its index entry.
    ///
    /// # Error
    /// `validation` for an unknown id.
    pub fn delete<E: Entity>(&self, id: &str) -> Result<()> {
        let guard = self.lock_entity(E::KIND, id)?;
        let result = self.raw_delete(E::KIND, id);
        self.unlock(guard);
        result
    }

    /// The indexed summaries of every entity of a kind, sorted by id
    pub fn list(&self, kind: EntityKind) -> Result<Vec<Value>> {
        let index = self.read_index(kind)?;
        match index.get(kind.index_field()) {
            Some(Value::Array(entries)) => Ok(entries.clone()),
            _ => Ok(vec![]),
        }
    }

    /// Case-insensitive substring search over title/name/description fields
    pub fn search<E: Entity>(&self, query: &str) -> Result<Vec<E>> {
        let needle = query.to_lowercase();
        let dir = self.root.join(E::KIND.dir_name());
        let mut matches = vec![];
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let value: Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
            let hit = ["title", "name", "description"].iter().any(|field| {
                value
                    .get(field)
                    .and_then(Value::as_str)
                    .map(|text| text.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            });
            if hit {
                matches.push(serde_json::from_value(value)?);
            }
        }
        Ok(matches)
    }

    // --- raw operations: callers hold the locks ---

    pub(crate) fn raw_read(&self, kind: EntityKind, id: &str) -> Result<Value> {
        let path = self.entity_path(kind, id, AccessMode::Read)?;
        if !path.exists() {
            return Err(OverseerError::validation(format!(
                "unknown {} id {}",
                kind, id
            )));
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    pub(crate) fn raw_write(
        &self,
        kind: EntityKind,
        id: &str,
        value: &Value,
        summary: Option<&Value>,
    ) -> Result<()> {
        let path = self.entity_path(kind, id, AccessMode::Write)?;
        self.write_json_atomic(&path, value)?;
        self.cache.set(StoreCache::key(kind, id), value.clone());
        self.upsert_index(kind, id, summary)
    }

    pub(crate) fn raw_delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        let path = self.entity_path(kind, id, AccessMode::Write)?;
        if !path.exists() {
            return Err(OverseerError::validation(format!(
                "unknown {} id {}",
                kind, id
            )));
        }
        fs::remove_file(path)?;
        self.cache.remove(&StoreCache::key(kind, id));
        self.upsert_index(kind, id, None)
    }

    /// The current index entry for an id, when present
    pub(crate) fn index_entry(&self, kind: EntityKind, id: &str) -> Result<Option<Value>> {
        Ok(self
            .list(kind)?
            .into_iter()
            .find(|entry| entry.get("id").and_then(Value::as_str) == Some(id)))
    }

    // --- locking ---

    pub(crate) fn lock_entity(&self, kind: EntityKind, id: &str) -> Result<EntityLockGuard> {
        let snapshot = self.gate.acquire_lock(
            SNAPSHOT_RESOURCE,
            LockMode::Read,
            Some(format!("{}:{}", kind, id)),
            LOCK_TIMEOUT,
        )?;
        let entity = match self.gate.acquire_lock(
            &StoreCache::key(kind, id),
            LockMode::Write,
            None,
            LOCK_TIMEOUT,
        ) {
            Ok(lock) => lock,
            Err(e) => {
                let _ = self.gate.release_lock(&snapshot);
                return Err(e);
            }
        };
        Ok(EntityLockGuard { snapshot, entity })
    }

    pub(crate) fn unlock(&self, guard: EntityLockGuard) {
        let _ = self.gate.release_lock(&guard.entity);
        let _ = self.gate.release_lock(&guard.snapshot);
    }

    // --- files ---

    pub(crate) fn entity_path(
        &self,
        kind: EntityKind,
        id: &str,
        mode: AccessMode,
    ) -> Result<PathBuf> {
        if id.is_empty() {
            return Err(OverseerError::validation("empty entity id"));
        }
        let path = self
            .root
            .join(kind.dir_name())
            .join(format!("{}.json", file_stem(id)));
        self.gate.validate_path(&path, mode)
    }

    fn index_path(&self, kind: EntityKind, mode: AccessMode) -> Result<PathBuf> {
        let path = self
            .root
            .join("indexes")
            .join(format!("{}.json", kind.index_field()));
        self.gate.validate_path(&path, mode)
    }

    /// Write pretty JSON atomically: to a temp file in the target directory, then
    /// rename over the destination.
    pub(crate) fn write_json_atomic(&self, path: &Path, value: &Value) -> Result<()> {
        let text = serde_json::to_string_pretty(value)?;
        self.write_text_atomic(path, &text)
    }

    pub(crate) fn write_text_atomic(&self, path: &Path, text: &str) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| OverseerError::validation(format!("{} has no parent", path.display())))?;
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(text.as_bytes())?;
        temp.flush()?;
        temp.persist(path)
            .map_err(|e| OverseerError::system(format!("atomic rename failed: {}", e)))?;
        Ok(())
    }

    fn read_index(&self, kind: EntityKind) -> Result<Value> {
        let path = self.index_path(kind, AccessMode::Read)?;
        if !path.exists() {
            return Ok(json!({
                kind.index_field(): [],
                "lastUpdated": clock::now_rfc3339(),
                "version": SCHEMA_VERSION,
            }));
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    /// Replace (or remove, when `summary` is `None`) one entry in a kind's index.
    /// The index file is shared by every entity of the kind, so the read-modify-write
    /// runs under its own write lock.
    fn upsert_index(&self, kind: EntityKind, id: &str, summary: Option<&Value>) -> Result<()> {
        let lock = self.gate.acquire_lock(
            &format!("index:{}", kind.index_field()),
            LockMode::Write,
            None,
            LOCK_TIMEOUT,
        )?;
        let result = self.upsert_index_locked(kind, id, summary);
        let _ = self.gate.release_lock(&lock);
        result
    }

    fn upsert_index_locked(&self, kind: EntityKind, id: &str, summary: Option<&Value>) -> Result<()> {
        let mut index = self.read_index(kind)?;
        let mut entries = match index.get_mut(kind.index_field()) {
            Some(Value::Array(entries)) => std::mem::take(entries),
            _ => vec![],
        };
        entries.retain(|entry| entry.get("id").and_then(Value::as_str) != Some(id));
        if let Some(summary) = summary {
            entries.push(summary.clone());
        }
        entries.sort_by(|a, b| {
            let a = a.get("id").and_then(Value::as_str).unwrap_or_default();
            let b = b.get("id").and_then(Value::as_str).unwrap_or_default();
            a.cmp(b)
        });

        let index_value = json!({
            kind.index_field(): entries,
            "lastUpdated": clock::now_rfc3339(),
            "version": index.get("version").cloned().unwrap_or_else(|| json!(SCHEMA_VERSION)),
        });
        let path = self.index_path(kind, AccessMode::Write)?;
        self.write_json_atomic(&path, &index_value)
    }
}

/// Locks held across one entity mutation
pub(crate) struct EntityLockGuard {
    snapshot: LockId,
    entity: LockId,
}

/// Deep merge: objects merge key by key, everything else is replaced
pub(crate) fn merge_value(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, inner) in patch {
                match target.get_mut(&key) {
                    Some(existing) => merge_value(existing, inner),
                    None => {
                        target.insert(key, inner);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for the store test modules

    use super::*;
    use overseer_core::config::OverseerConfig;
    use overseer_core::events::EventBus;
    use tempfile::TempDir;

    pub struct StoreFixture {
        pub engine: Arc<StorageEngine>,
        pub bus: Arc<EventBus>,
        // keeps the data root alive for the test's lifetime
        pub dir: TempDir,
    }

    pub fn store() -> StoreFixture {
        let dir = TempDir::new().unwrap();
        let mut config = OverseerConfig::default();
        config.security.allowed_write_paths = vec![dir.path().to_path_buf()];
        let bus = Arc::new(EventBus::new());
        let gate = Arc::new(SecurityGate::new(
            config.security,
            config.locks,
            config.audit,
            Arc::clone(&bus),
        ));
        let engine = Arc::new(
            StorageEngine::new(dir.path().join("data"), gate, &config.cache).unwrap(),
        );
        StoreFixture { engine, bus, dir }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::store;
    use super::*;
    use overseer_core::identifier::{ProjectId, TaskId};
    use overseer_core::task::{Task, TaskStatus};

    fn task(id: &str, title: &str) -> Task {
        Task::new(
            TaskId::new(id).unwrap(),
            ProjectId::new("p1").unwrap(),
            title,
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn create_get_roundtrip_and_conflict() {
        let fixture = store();
        let engine = &fixture.engine;
        let task = task("t1", "write docs");
        engine.create(&task).unwrap();

        let loaded: Task = engine.get("t1").unwrap();
        assert_eq!(loaded.title, "write docs");

        let err = engine.create(&task).unwrap_err();
        assert_eq!(err.kind(), overseer_core::error::ErrorKind::Conflict);
    }

    #[test]
    fn unknown_ids_are_validation_errors() {
        let fixture = store();
        let err = fixture.engine.get::<Task>("ghost").unwrap_err();
        assert_eq!(err.kind(), overseer_core::error::ErrorKind::Validation);
        let err = fixture.engine.delete::<Task>("ghost").unwrap_err();
        assert_eq!(err.kind(), overseer_core::error::ErrorKind::Validation);
    }

    #[test]
    fn update_merges_partially_and_id_is_immutable() {
        let fixture = store();
        let engine = &fixture.engine;
        engine.create(&task("t1", "original")).unwrap();

        let updated: Task = engine
            .update("t1", serde_json::json!({"status": "running"}))
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Running);
        assert_eq!(updated.title, "original");

        let err = engine
            .update::<Task>("t1", serde_json::json!({"id": "t2"}))
            .unwrap_err();
        assert_eq!(err.kind(), overseer_core::error::ErrorKind::Validation);
    }

    #[test]
    fn index_tracks_create_update_delete() {
        let fixture = store();
        let engine = &fixture.engine;
        engine.create(&task("b", "second")).unwrap();
        engine.create(&task("a", "first")).unwrap();

        let listed = engine.list(EntityKind::Task).unwrap();
        let ids: Vec<&str> = listed
            .iter()
            .map(|e| e["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        engine.delete::<Task>("a").unwrap();
        assert_eq!(engine.list(EntityKind::Task).unwrap().len(), 1);
    }

    #[test]
    fn search_matches_title_case_insensitively() {
        let fixture = store();
        let engine = &fixture.engine;
        engine.create(&task("t1", "Implement Parser")).unwrap();
        engine.create(&task("t2", "unrelated")).unwrap();

        let found: Vec<Task> = engine.search("parser").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entity_id(), "t1");
    }

    #[test]
    fn records_are_sanitized_on_the_way_in() {
        let fixture = store();
        let engine = &fixture.engine;
        let mut dirty = task("t1", "ok");
        dirty.description = "keep<script>alert(1)</script> this".to_string();
        engine.create(&dirty).unwrap();

        let loaded: Task = engine.get("t1").unwrap();
        assert_eq!(loaded.description, "keep this");
    }

    #[test]
    fn cache_serves_repeat_reads() {
        let fixture = store();
        let engine = &fixture.engine;
        engine.create(&task("t1", "cached")).unwrap();
        let _: Task = engine.get("t1").unwrap();
        let _: Task = engine.get("t1").unwrap();
        let metrics = engine.cache().metrics();
        assert!(metrics.hits >= 2, "write-through then two reads: {:?}", metrics);
    }
}

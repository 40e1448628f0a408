//! Whole-store backups. A snapshot copies the entity directories and indexes into
//! `backups/<timestamp>` together with a checksummed manifest; a retention sweep
//! keeps the newest `max_backups`. The copy holds the exclusive side of the snapshot
//! lock, so entity mutations (which hold the shared side) wait it out.

use crate::engine::{StorageEngine, SNAPSHOT_RESOURCE};
use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use overseer_core::checksum::{checksum32, SCHEMA_VERSION};
use overseer_core::clock;
use overseer_core::config::BackupConfig;
use overseer_core::error::{OverseerError, Result};
use overseer_core::events::{EngineEvent, EventBus};
use overseer_core::gate::LockMode;
use overseer_core::identifier::BackupId;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use walkdir::WalkDir;

/// Directories included in a snapshot
const SNAPSHOT_DIRS: [&str; 6] = [
    "tasks",
    "projects",
    "dependencies",
    "epics",
    "graphs",
    "indexes",
];

/// How long the snapshot waits to exclude in-flight mutations
const SNAPSHOT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// The manifest written at the root of every backup directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    pub id: BackupId,
    pub created_at: String,
    /// Total bytes copied
    pub size: u64,
    pub checksum: String,
    /// Entity file counts per snapshot directory
    pub entities: BTreeMap<String, usize>,
    pub version: String,
}

/// Creates, lists, and prunes backups for one storage engine
pub struct BackupManager {
    engine: Arc<StorageEngine>,
    bus: Arc<EventBus>,
    config: BackupConfig,
}

impl BackupManager {
    pub fn new(engine: Arc<StorageEngine>, bus: Arc<EventBus>, config: BackupConfig) -> Self {
        Self {
            engine,
            bus,
            config,
        }
    }

    /// Copy the data tree into a fresh `backups/<timestamp>` snapshot and write its
    /// manifest. Also applies retention.
    pub fn create_backup(&self) -> Result<BackupManifest> {
        let gate = self.engine.gate();
        let lock = gate.acquire_lock(
            SNAPSHOT_RESOURCE,
            LockMode::Write,
            Some("backup".to_string()),
            SNAPSHOT_LOCK_TIMEOUT,
        )?;
        let outcome = self.copy_snapshot();
        let _ = gate.release_lock(&lock);

        let manifest = outcome?;
        self.bus.publish(EngineEvent::BackupCreated {
            backup_id: manifest.id.clone(),
            size_bytes: manifest.size,
        });
        self.prune()?;
        Ok(manifest)
    }

    fn copy_snapshot(&self) -> Result<BackupManifest> {
        let id = BackupId::new(format!("backup-{}", clock::compact_timestamp()))
            .map_err(|e| OverseerError::system(e.to_string()))?;
        let target = self.engine.root().join("backups").join(id.as_str());
        fs::create_dir_all(&target)?;

        let mut size = 0u64;
        let mut entities = BTreeMap::new();
        for dir in SNAPSHOT_DIRS {
            let source = self.engine.root().join(dir);
            let destination = target.join(dir);
            fs::create_dir_all(&destination)?;
            let mut count = 0usize;
            for entry in WalkDir::new(&source).min_depth(1) {
                let entry = entry.map_err(|e| OverseerError::system(e.to_string()))?;
                let relative = entry
                    .path()
                    .strip_prefix(&source)
                    .map_err(|e| OverseerError::system(e.to_string()))?;
                let into = destination.join(relative);
                if entry.file_type().is_dir() {
                    fs::create_dir_all(&into)?;
                } else {
                    fs::copy(entry.path(), &into)?;
                    size += entry.metadata().map(|m| m.len()).unwrap_or(0);
                    count += 1;
                }
            }
            entities.insert(dir.to_string(), count);
        }

        let mut manifest = BackupManifest {
            id,
            created_at: clock::now_rfc3339(),
            size,
            checksum: String::new(),
            entities,
            version: SCHEMA_VERSION.to_string(),
        };
        manifest.checksum = checksum32(&serde_json::to_value(&manifest)?);
        self.engine
            .write_json_atomic(&target.join("manifest.json"), &serde_json::to_value(&manifest)?)?;
        info!("backup {} created ({} bytes)", manifest.id, manifest.size);
        Ok(manifest)
    }

    /// Remove the oldest snapshots beyond `max_backups`, returning how many went
    pub fn prune(&self) -> Result<usize> {
        let mut snapshots = self.snapshot_dirs()?;
        if snapshots.len() <= self.config.max_backups {
            return Ok(0);
        }
        // timestamp-named directories sort oldest first
        snapshots.sort();
        let excess = snapshots.len() - self.config.max_backups;
        for path in snapshots.into_iter().take(excess) {
            debug!("pruning backup {}", path.display());
            fs::remove_dir_all(path)?;
        }
        Ok(excess)
    }

    /// The manifests of every retained snapshot, oldest first
    pub fn list_backups(&self) -> Result<Vec<BackupManifest>> {
        let mut snapshots = self.snapshot_dirs()?;
        snapshots.sort();
        let mut manifests = vec![];
        for dir in snapshots {
            let manifest_path = dir.join("manifest.json");
            if manifest_path.exists() {
                let text = fs::read_to_string(manifest_path)?;
                manifests.push(serde_json::from_str(&text)?);
            }
        }
        Ok(manifests)
    }

    fn snapshot_dirs(&self) -> Result<Vec<PathBuf>> {
        let root = self.engine.root().join("backups");
        let mut dirs = vec![];
        for entry in fs::read_dir(root)? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        Ok(dirs)
    }

    /// Start the periodic backup loop; a disabled config starts nothing
    pub fn spawn(self: Arc<Self>) -> Option<BackupLoopHandle> {
        if !self.config.enabled {
            return None;
        }
        let interval = Duration::from_secs(self.config.interval_minutes * 60);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = std::thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if let Err(e) = self.create_backup() {
                        // background loops log and continue
                        warn!("periodic backup failed: {}", e);
                    }
                }
                _ => break,
            }
        });
        Some(BackupLoopHandle {
            stop: stop_tx,
            handle: Some(handle),
        })
    }
}

/// Stops the backup loop when dropped
pub struct BackupLoopHandle {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for BackupLoopHandle {
    fn drop(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::store;
    use overseer_core::identifier::{ProjectId, TaskId};
    use overseer_core::task::Task;

    fn manager(fixture: &crate::engine::testing::StoreFixture, max_backups: usize) -> BackupManager {
        BackupManager::new(
            Arc::clone(&fixture.engine),
            Arc::clone(&fixture.bus),
            BackupConfig {
                enabled: true,
                interval_minutes: 60,
                max_backups,
            },
        )
    }

    fn seed(fixture: &crate::engine::testing::StoreFixture, id: &str) {
        let task = Task::new(
            TaskId::new(id).unwrap(),
            ProjectId::new("p1").unwrap(),
            "seeded",
            1.0,
        )
        .unwrap();
        fixture.engine.create(&task).unwrap();
    }

    #[test]
    fn backup_mirrors_entities_and_writes_manifest() {
        let fixture = store();
        seed(&fixture, "t1");
        seed(&fixture, "t2");
        let events = fixture.bus.subscribe();

        let manifest = manager(&fixture, 10).create_backup().unwrap();
        assert_eq!(manifest.entities["tasks"], 2);
        // tasks index exists alongside the records
        assert!(manifest.entities["indexes"] >= 1);
        assert!(manifest.size > 0);

        let target = fixture
            .engine
            .root()
            .join("backups")
            .join(manifest.id.as_str());
        assert!(target.join("tasks").join("t1.json").exists());
        assert!(target.join("manifest.json").exists());

        assert!(events
            .try_iter()
            .any(|e| matches!(e, EngineEvent::BackupCreated { .. })));
    }

    #[test]
    fn manifest_checksum_is_reproducible() {
        let fixture = store();
        seed(&fixture, "t1");
        let manifest = manager(&fixture, 10).create_backup().unwrap();

        let recomputed = checksum32(&serde_json::to_value(&manifest).unwrap());
        assert_eq!(recomputed, manifest.checksum);
    }

    #[test]
    fn retention_keeps_only_the_newest() {
        let fixture = store();
        seed(&fixture, "t1");
        let manager = manager(&fixture, 2);
        // same-second snapshots collide on the timestamp name; space them out
        for i in 0..3 {
            if i > 0 {
                std::thread::sleep(Duration::from_millis(1100));
            }
            manager.create_backup().unwrap();
        }
        let retained = manager.list_backups().unwrap();
        assert_eq!(retained.len(), 2);
    }
}

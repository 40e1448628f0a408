//! The write-through entity cache: bounded LRU with per-entry TTL, keyed
//! `"{kind}:{id}"`. Reads count hits and requests for the metrics snapshot; a
//! background loop evicts expired entries.

use crate::entity::EntityKind;
use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use overseer_core::config::CacheConfig;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

struct CacheEntry {
    value: Value,
    inserted_at: Instant,
    last_access: Instant,
}

/// Hit/size counters for the metrics event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetrics {
    pub hits: u64,
    pub requests: u64,
    pub entries: usize,
    pub hit_rate: f64,
}

/// The cache itself. Disabled caches answer every read with a miss and store nothing.
pub struct StoreCache {
    enabled: bool,
    max_size: usize,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    requests: AtomicU64,
}

impl StoreCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_size: config.max_size.max(1),
            ttl: Duration::from_secs(config.ttl_seconds),
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            requests: AtomicU64::new(0),
        }
    }

    /// The `"{kind}:{id}"` cache key
    pub fn key(kind: EntityKind, id: &str) -> String {
        format!("{}:{}", kind, id)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        if !self.enabled {
            return None;
        }
        self.requests.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                entry.last_access = Instant::now();
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        if !self.enabled {
            return;
        }
        let key = key.into();
        let mut entries = self.entries.lock();
        if entries.len() >= self.max_size && !entries.contains_key(&key) {
            evict_lru(&mut entries);
        }
        let now = Instant::now();
        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                last_access: now,
            },
        );
    }

    pub fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    /// Drop expired entries, returning how many were evicted
    pub fn cleanup(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn metrics(&self) -> CacheMetrics {
        let hits = self.hits.load(Ordering::Relaxed);
        let requests = self.requests.load(Ordering::Relaxed);
        CacheMetrics {
            hits,
            requests,
            entries: self.entries.lock().len(),
            hit_rate: if requests == 0 {
                0.0
            } else {
                hits as f64 / requests as f64
            },
        }
    }

    /// Start the background cleanup loop
    pub fn spawn_cleaner(self: &Arc<Self>, interval: Duration) -> CacheCleanerHandle {
        let cache = Arc::clone(self);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = std::thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let evicted = cache.cleanup();
                    if evicted > 0 {
                        debug!("cache cleanup evicted {} expired entries", evicted);
                    }
                }
                _ => break,
            }
        });
        CacheCleanerHandle {
            stop: stop_tx,
            handle: Some(handle),
        }
    }
}

fn evict_lru(entries: &mut HashMap<String, CacheEntry>) {
    let oldest = entries
        .iter()
        .min_by_key(|(_, entry)| entry.last_access)
        .map(|(key, _)| key.clone());
    if let Some(key) = oldest {
        entries.remove(&key);
    }
}

/// Stops the cache cleaner when dropped
pub struct CacheCleanerHandle {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for CacheCleanerHandle {
    fn drop(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

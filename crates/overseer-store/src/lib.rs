//! # `overseer-store`
//!
//! The storage engine. Entities persist as individual JSON records beneath a data
//! root, with denormalised index files per kind, a write-through LRU/TTL cache,
//! pre-image transactions, periodic whole-tree backups, and integrity-checked graph
//! persistence with recovery. Every path touched here goes through the security gate
//! first; the storage engine is the sole durable owner of the data model.

#![deny(rustdoc::broken_intra_doc_links)]

#[macro_use]
extern crate serde;

#[macro_use]
extern crate log;

pub mod backup;
pub mod cache;
pub mod engine;
pub mod entity;
pub mod graphs;
pub mod transaction;

// Re-exports
pub use backup::{BackupManager, BackupManifest};
pub use cache::{CacheMetrics, StoreCache};
pub use engine::StorageEngine;
pub use entity::{Entity, EntityKind};
pub use graphs::{GraphLoad, GraphSaved};
pub use transaction::{Transaction, TransactionStatus};

//! # `overseer-engine`
//!
//! The orchestration layer. An [`Orchestrator`] builds the gate, storage, graph, and
//! execution engines at startup and threads them through constructors — no
//! singletons; tests create fresh engines per case. It accepts decomposed projects,
//! streams ready tasks from the graph into the execution engine, commits every
//! lifecycle transition back to storage, and reports diagnostics while the graph
//! drains.

#![deny(rustdoc::broken_intra_doc_links)]

#[macro_use]
extern crate serde;

#[macro_use]
extern crate log;

pub mod orchestrator;
pub mod reports;

// Re-exports
pub use orchestrator::{Orchestrator, OrchestratorRunning, ProposedEdge};
pub use reports::{DecompositionReport, DiagnosticsReport, DrainReport};

pub mod prelude {
    //! The types an embedder needs to drive overseer

    pub use crate::orchestrator::{Orchestrator, OrchestratorRunning, ProposedEdge};
    pub use crate::reports::{DecompositionReport, DiagnosticsReport, DrainReport};
    pub use overseer_core::prelude::*;
    pub use overseer_exec::{ExecutionEngine, ExecutionMetrics};
    pub use overseer_graph::{DependencyGraph, DependencyType, GraphFormat};
    pub use overseer_store::{StorageEngine, Transaction};
}

//! # `overseer-graph`
//!
//! The dependency graph engine. A project's tasks form a directed acyclic graph whose
//! edges point from dependent to dependency; the engine keeps the adjacency and
//! reverse-index mappings in exact lockstep with the edge table, refuses any mutation
//! that would introduce a cycle, and derives the analyses the scheduler feeds on:
//! topological order, the weighted critical path, and parallel batches.
//!
//! Persistence of graphs is routed through `overseer-store`; this crate is pure.

#![deny(rustdoc::broken_intra_doc_links)]

#[macro_use]
extern crate serde;

#[macro_use]
extern crate log;

pub mod analysis;
pub mod delta;
pub mod edge;
pub mod graph;
pub mod node;
pub mod proposal;
pub mod serial;
pub mod validate;

// Re-exports
pub use analysis::{CriticalPath, GraphMetrics, ParallelBatch};
pub use delta::GraphDelta;
pub use edge::{DependencyEdge, DependencyType};
pub use graph::DependencyGraph;
pub use node::TaskNode;
pub use proposal::{propose_dependencies, AppliedProposals, DependencyProposal};
pub use serial::{GraphFormat, SerializedGraph};
pub use validate::{GraphValidation, ValidationError, ValidationWarning};

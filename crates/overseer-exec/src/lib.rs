//! # `overseer-exec`
//!
//! The task execution engine: a registry of heterogeneous worker agents with
//! componentwise capacity accounting, a scheduler that orders the queue by a
//! configurable algorithm and assigns work to the best eligible agent, and a
//! watchdog that enforces per-execution timeout and warning deadlines with a
//! bounded retry policy. Agents are external collaborators — the engine assigns
//! and accounts; completion and failure are reported in by the embedder.

#![deny(rustdoc::broken_intra_doc_links)]

#[macro_use]
extern crate serde;

#[macro_use]
extern crate log;

pub mod engine;
pub mod queue;
pub mod registry;
pub mod watchdog;

// Re-exports
pub use engine::{EngineLoops, ExecutionEngine, ExecutionMetrics};
pub use registry::AgentRegistry;
pub use watchdog::Watchdog;

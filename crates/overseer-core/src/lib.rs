//! # `overseer-core`
//!
//! Defines the structs, traits, and shared infrastructure that make up the overseer
//! orchestration engine: the task/project/agent/execution data model, the error and
//! event vocabulary, configuration, logging, and the security gate that mediates
//! every filesystem-touching operation.

#![deny(rustdoc::broken_intra_doc_links)]

#[macro_use]
extern crate serde;

#[macro_use]
extern crate log;

pub mod agent;
pub mod cancel;
pub mod checksum;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod execution;
pub mod gate;
pub mod identifier;
pub mod logging;
pub mod project;
pub mod task;

// Re-exports
pub use error::{OverseerError, Result};
pub use events::{EngineEvent, EventBus};
pub use gate::SecurityGate;

pub mod prelude {
    //! Provides the most commonly used types within overseer

    pub use crate::agent::{Agent, AgentStatus, ResourceBudget};
    pub use crate::cancel::CancellationToken;
    pub use crate::config::OverseerConfig;
    pub use crate::error::{ErrorKind, OverseerError, Result};
    pub use crate::events::{EngineEvent, EventBus};
    pub use crate::execution::{
        Execution, ExecutionResult, ExecutionStatus, ResourceRequirements,
    };
    pub use crate::gate::{AccessMode, LockMode, SecurityGate};
    pub use crate::identifier::{
        AgentId, BackupId, EdgeKey, EpicId, ExecutionId, LockId, ProjectId, TaskId,
    };
    pub use crate::project::{Epic, Project};
    pub use crate::task::{Task, TaskPriority, TaskStatus};

    pub use std::result::Result as StdResult;
}

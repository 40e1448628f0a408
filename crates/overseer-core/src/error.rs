//! Every public overseer operation returns a [`Result`] whose error carries one of the
//! engine's error kinds. Background loops never propagate these into the request path;
//! they log and continue.

use crate::identifier::InvalidId;
use std::io;
use thiserror::Error;

/// The error type shared by every overseer engine
#[derive(Debug, Error)]
pub enum OverseerError {
    /// Bad input, unknown id, or a violated data invariant. Never retried, no side effects.
    #[error("validation error: {0}")]
    Validation(String),
    /// Duplicate id, duplicate edge, or state that refuses the operation
    #[error("conflict: {0}")]
    Conflict(String),
    /// The mutation would make the dependency graph cyclic
    #[error("dependency cycle: {0}")]
    Cycle(String),
    /// The security gate denied a path or lock
    #[error("permission denied: {0}")]
    Permission(String),
    /// A cancellation token fired before the operation committed
    #[error("cancelled: {0}")]
    Cancelled(String),
    /// A deadline elapsed
    #[error("timed out: {0}")]
    Timeout(String),
    /// An execution lifecycle transition outside the state machine
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// the status the execution was in
        from: String,
        /// the status that was requested
        to: String,
    },
    /// An integrity check failed and recovery was not possible
    #[error("data corruption: {message}")]
    Corruption {
        /// summary of the failure
        message: String,
        /// the individual integrity diagnostics
        diagnostics: Vec<String>,
    },
    /// I/O or any other unexpected failure. The engine remains usable.
    #[error("system error: {0}")]
    System(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of an [`OverseerError`], used for audit severity and metrics
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "camelCase")]
pub enum ErrorKind {
    Validation,
    Conflict,
    Cycle,
    Permission,
    Cancelled,
    Timeout,
    InvalidTransition,
    Corruption,
    System,
}

impl OverseerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn cycle(msg: impl Into<String>) -> Self {
        Self::Cycle(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn system(msg: impl Into<String>) -> Self {
        Self::System(msg.into())
    }

    pub fn corruption(msg: impl Into<String>, diagnostics: Vec<String>) -> Self {
        Self::Corruption {
            message: msg.into(),
            diagnostics,
        }
    }

    /// The kind this error is tagged with
    pub fn kind(&self) -> ErrorKind {
        match self {
            OverseerError::Validation(_) => ErrorKind::Validation,
            OverseerError::Conflict(_) => ErrorKind::Conflict,
            OverseerError::Cycle(_) => ErrorKind::Cycle,
            OverseerError::Permission(_) => ErrorKind::Permission,
            OverseerError::Cancelled(_) => ErrorKind::Cancelled,
            OverseerError::Timeout(_) => ErrorKind::Timeout,
            OverseerError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            OverseerError::Corruption { .. } => ErrorKind::Corruption,
            OverseerError::System(_) | OverseerError::Io(_) | OverseerError::Json(_) => {
                ErrorKind::System
            }
        }
    }
}

impl From<InvalidId> for OverseerError {
    fn from(err: InvalidId) -> Self {
        OverseerError::Validation(err.to_string())
    }
}

pub type Result<T, E = OverseerError> = std::result::Result<T, E>;

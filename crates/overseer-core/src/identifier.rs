//! Identifiers are opaque strings used by tasks, projects, epics, agents, executions,
//! locks, and backups. They carry no internal structure beyond being non-empty; new
//! ones are minted from v4 uuids.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// An invalid identifier was given
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidId(pub String);

impl Display for InvalidId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid identifier: {:?}", self.0)
    }
}

impl Error for InvalidId {}

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from an existing string.
            ///
            /// # Error
            /// Errors if the string is empty or contains a NUL byte.
            pub fn new<S: Into<String>>(value: S) -> Result<Self, InvalidId> {
                let value = value.into();
                if value.is_empty() || value.contains('\0') {
                    return Err(InvalidId(value));
                }
                Ok(Self(value))
            }

            /// Mint a fresh identifier
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// The identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "\"{}\"", self.0)
            }
        }

        impl FromStr for $name {
            type Err = InvalidId;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }
    };
}

identifier! {
    /// Identifies a single task
    TaskId
}
identifier! {
    /// Identifies a project
    ProjectId
}
identifier! {
    /// Identifies an epic within a project
    EpicId
}
identifier! {
    /// Identifies a worker agent
    AgentId
}
identifier! {
    /// Identifies one attempt to run a task on an agent
    ExecutionId
}
identifier! {
    /// Identifies an advisory lock held through the security gate
    LockId
}
identifier! {
    /// Identifies a storage backup snapshot
    BackupId
}

/// The separator between the two halves of an [`EdgeKey`]
pub const EDGE_SEPARATOR: &str = "->";

/// Identifies a dependency edge as `"{dependent}->{dependency}"`.
///
/// The `from` side is the dependent task, the `to` side the dependency it waits on.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    from: TaskId,
    to: TaskId,
}

impl EdgeKey {
    /// Create an edge key from dependent to dependency
    pub fn new(from: TaskId, to: TaskId) -> Self {
        Self { from, to }
    }

    /// The dependent task
    pub fn from_id(&self) -> &TaskId {
        &self.from
    }

    /// The dependency task
    pub fn to_id(&self) -> &TaskId {
        &self.to
    }
}

impl Display for EdgeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.from, EDGE_SEPARATOR, self.to)
    }
}

impl Debug for EdgeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

impl FromStr for EdgeKey {
    type Err = InvalidId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (from, to) = s.split_once(EDGE_SEPARATOR).ok_or_else(|| InvalidId(s.to_string()))?;
        Ok(Self {
            from: TaskId::new(from)?,
            to: TaskId::new(to)?,
        })
    }
}

impl Serialize for EdgeKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EdgeKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

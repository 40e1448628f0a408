//! Incremental updates between graph snapshots. The delta is computed against a
//! previous checksum: identical fingerprints yield an empty delta, anything else a
//! full record. Applying a full delta rebuilds the graph — adjacency and reverse
//! index in lockstep with nodes and edges — and drops the memoised analyses.

use crate::graph::DependencyGraph;
use crate::serial::{GraphFormat, SerializedGraph};
use overseer_core::error::Result;

/// The difference between a previous snapshot and the current graph
#[derive(Debug, Clone)]
pub enum GraphDelta {
    /// Checksums match; nothing to transfer
    Empty,
    /// Anything changed: the full current record
    Full(Box<SerializedGraph>),
}

impl GraphDelta {
    pub fn is_empty(&self) -> bool {
        matches!(self, GraphDelta::Empty)
    }
}

impl DependencyGraph {
    /// Compute the delta against a previously observed checksum
    pub fn delta_since(&mut self, previous_checksum: &str, format: GraphFormat) -> Result<GraphDelta> {
        let record = self.serialize(format)?;
        if record.checksum == previous_checksum {
            Ok(GraphDelta::Empty)
        } else {
            Ok(GraphDelta::Full(Box::new(record)))
        }
    }

    /// Apply a delta in place. Returns whether the graph changed.
    pub fn apply_delta(&mut self, delta: GraphDelta) -> Result<bool> {
        match delta {
            GraphDelta::Empty => Ok(false),
            GraphDelta::Full(record) => {
                *self = DependencyGraph::from_serialized(&record)?;
                self.invalidate();
                Ok(true)
            }
        }
    }
}

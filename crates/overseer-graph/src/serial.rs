//! Graph serialisation. A [`SerializedGraph`] is the versioned wire/file form of a
//! dependency graph: nodes, edges, both index mappings as sorted arrays, the derived
//! analyses, and a deterministic checksum computed with the `checksum` and
//! `timestamp` fields excluded and all object keys sorted recursively.

use crate::analysis::{GraphMetrics, ParallelBatch};
use crate::edge::DependencyEdge;
use crate::graph::DependencyGraph;
use crate::node::TaskNode;
use overseer_core::checksum::{checksum32, SCHEMA_VERSION};
use overseer_core::clock;
use overseer_core::error::{OverseerError, Result};
use overseer_core::identifier::{ProjectId, TaskId};
use std::collections::{BTreeMap, BTreeSet};

/// Supported file renderings of a serialised graph
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GraphFormat {
    Json,
    Yaml,
}

impl GraphFormat {
    /// Pick a format from a file extension
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_lowercase().as_str() {
            "json" => Some(GraphFormat::Json),
            "yaml" | "yml" => Some(GraphFormat::Yaml),
            _ => None,
        }
    }
}

/// Analyses and summary numbers embedded in a serialised graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetadata {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub critical_path: Vec<TaskId>,
    pub topological_order: Vec<TaskId>,
    pub parallel_batches: Vec<ParallelBatch>,
    pub metrics: GraphMetrics,
}

/// The persisted form of a [`DependencyGraph`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedGraph {
    pub version: String,
    pub project_id: ProjectId,
    pub timestamp: String,
    pub format: String,
    pub checksum: String,
    pub nodes: BTreeMap<TaskId, TaskNode>,
    pub edges: BTreeMap<String, DependencyEdge>,
    /// dependency id → dependent ids, sorted
    pub adjacency_list: BTreeMap<TaskId, Vec<TaskId>>,
    /// dependent id → dependency ids, sorted
    pub reverse_index: BTreeMap<TaskId, Vec<TaskId>>,
    pub metadata: GraphMetadata,
}

impl SerializedGraph {
    /// Recompute the fingerprint of this record
    pub fn compute_checksum(&self) -> Result<String> {
        Ok(checksum32(&serde_json::to_value(self)?))
    }

    /// Render the record in the given format
    pub fn to_text(&self, format: GraphFormat) -> Result<String> {
        match format {
            GraphFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            GraphFormat::Yaml => {
                serde_yaml::to_string(self).map_err(|e| OverseerError::system(e.to_string()))
            }
        }
    }

    /// Parse a record from text in the given format
    pub fn from_text(text: &str, format: GraphFormat) -> Result<Self> {
        match format {
            GraphFormat::Json => Ok(serde_json::from_str(text)?),
            GraphFormat::Yaml => {
                serde_yaml::from_str(text).map_err(|e| OverseerError::system(e.to_string()))
            }
        }
    }

    /// Structural and fingerprint diagnostics. An empty list means the record is
    /// internally consistent.
    pub fn integrity_check(&self) -> Vec<String> {
        let mut diagnostics = vec![];

        if self.version.is_empty() {
            diagnostics.push("record has no schema version".to_string());
        } else if self.version != SCHEMA_VERSION {
            diagnostics.push(format!(
                "schema version {} does not match {}",
                self.version, SCHEMA_VERSION
            ));
        }

        match self.compute_checksum() {
            Ok(actual) if actual != self.checksum => diagnostics.push(format!(
                "checksum mismatch: recorded {}, computed {}",
                self.checksum, actual
            )),
            Err(e) => diagnostics.push(format!("checksum could not be computed: {}", e)),
            _ => {}
        }

        for (key, edge) in &self.edges {
            let expected = edge.key().to_string();
            if key != &expected {
                diagnostics.push(format!("edge keyed {} describes {}", key, expected));
            }
            for endpoint in [&edge.from, &edge.to] {
                if !self.nodes.contains_key(endpoint) {
                    diagnostics.push(format!("edge {} references missing node {}", key, endpoint));
                }
            }
        }

        let (expected_adjacency, expected_reverse) = derive_indexes(&self.nodes, &self.edges);
        if expected_adjacency != self.adjacency_list {
            diagnostics.push("adjacency list disagrees with the edge table".to_string());
        }
        if expected_reverse != self.reverse_index {
            diagnostics.push("reverse index disagrees with the edge table".to_string());
        }

        if self.metadata.total_nodes != self.nodes.len() {
            diagnostics.push(format!(
                "metadata claims {} nodes, record has {}",
                self.metadata.total_nodes,
                self.nodes.len()
            ));
        }
        if self.metadata.total_edges != self.edges.len() {
            diagnostics.push(format!(
                "metadata claims {} edges, record has {}",
                self.metadata.total_edges,
                self.edges.len()
            ));
        }

        diagnostics
    }
}

/// Rebuild both index mappings from an edge table
fn derive_indexes(
    nodes: &BTreeMap<TaskId, TaskNode>,
    edges: &BTreeMap<String, DependencyEdge>,
) -> (
    BTreeMap<TaskId, Vec<TaskId>>,
    BTreeMap<TaskId, Vec<TaskId>>,
) {
    let mut adjacency: BTreeMap<TaskId, BTreeSet<TaskId>> = nodes
        .keys()
        .map(|id| (id.clone(), BTreeSet::new()))
        .collect();
    let mut reverse: BTreeMap<TaskId, BTreeSet<TaskId>> = adjacency.clone();
    for edge in edges.values() {
        adjacency
            .entry(edge.to.clone())
            .or_default()
            .insert(edge.from.clone());
        reverse
            .entry(edge.from.clone())
            .or_default()
            .insert(edge.to.clone());
    }
    let collapse = |map: BTreeMap<TaskId, BTreeSet<TaskId>>| {
        map.into_iter()
            .map(|(id, set)| (id, set.into_iter().collect()))
            .collect()
    };
    (collapse(adjacency), collapse(reverse))
}

impl DependencyGraph {
    /// Produce the persisted form of this graph. Refreshes the analyses and the
    /// per-node critical-path flags first so the record is self-consistent.
    pub fn serialize(&mut self, format: GraphFormat) -> Result<SerializedGraph> {
        let critical = self.critical_path();
        let topological_order = self.topological_order();
        let parallel_batches = self.parallel_batches();
        let metrics = self.metrics();

        let (adjacency_list, reverse_index) = derive_indexes(&self.nodes, &self.edges);
        let mut record = SerializedGraph {
            version: SCHEMA_VERSION.to_string(),
            project_id: self.project_id.clone(),
            timestamp: clock::now_rfc3339(),
            format: format.to_string(),
            checksum: String::new(),
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            adjacency_list,
            reverse_index,
            metadata: GraphMetadata {
                total_nodes: self.node_count(),
                total_edges: self.edge_count(),
                critical_path: critical.tasks,
                topological_order,
                parallel_batches,
                metrics,
            },
        };
        record.checksum = record.compute_checksum()?;
        Ok(record)
    }

    /// Rebuild a graph from its persisted form. The adjacency and reverse-index
    /// arrays in the record are informational; the canonical relation is rebuilt
    /// from the edge table and the denormalised node caches follow it.
    pub fn from_serialized(record: &SerializedGraph) -> Result<Self> {
        let mut graph = DependencyGraph::new(record.project_id.clone());
        for (id, node) in &record.nodes {
            if id != &node.task.id {
                return Err(OverseerError::validation(format!(
                    "node keyed {} holds task {}",
                    id, node.task.id
                )));
            }
            let mut fresh = TaskNode::new(node.task.clone());
            fresh.critical_path = node.critical_path;
            graph.adjacency.entry(id.clone()).or_default();
            graph.reverse_index.entry(id.clone()).or_default();
            graph.nodes.insert(id.clone(), fresh);
        }
        for (key, edge) in &record.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !graph.nodes.contains_key(endpoint) {
                    return Err(OverseerError::validation(format!(
                        "edge {} references missing node {}",
                        key, endpoint
                    )));
                }
            }
            graph.edges.insert(key.clone(), edge.clone());
            graph
                .adjacency
                .entry(edge.to.clone())
                .or_default()
                .insert(edge.from.clone());
            graph
                .reverse_index
                .entry(edge.from.clone())
                .or_default()
                .insert(edge.to.clone());
            if let Some(node) = graph.nodes.get_mut(&edge.from) {
                node.add_dependency(edge.to.clone());
            }
            if let Some(node) = graph.nodes.get_mut(&edge.to) {
                node.add_dependent(edge.from.clone());
            }
        }
        let cycles = graph.detect_cycles();
        if !cycles.is_empty() {
            return Err(OverseerError::cycle(format!(
                "serialised graph contains {} cycle(s)",
                cycles.len()
            )));
        }
        Ok(graph)
    }
}

//! Graph persistence. The graph engine itself is pure; every graph that touches disk
//! does so here: atomic saves with a `.backup` sibling and rolling `.vN` versions,
//! and loads that run the integrity check and walk the recovery ladder when the
//! primary file is corrupt.

use crate::engine::StorageEngine;
use overseer_core::error::{OverseerError, Result};
use overseer_core::gate::AccessMode;
use overseer_core::identifier::ProjectId;
use overseer_graph::{DependencyGraph, GraphFormat, SerializedGraph};
use std::fs;
use std::path::{Path, PathBuf};

/// How many rolling `.vN` versions a save keeps
const MAX_VERSIONS: usize = 3;

/// Result of a successful save
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSaved {
    pub path: PathBuf,
    pub size: u64,
    pub checksum: String,
}

/// Result of a load, including whether recovery was needed
#[derive(Debug)]
pub struct GraphLoad {
    pub graph: DependencyGraph,
    pub recovered: bool,
    /// The fallback file that supplied the data, when recovery kicked in
    pub backup_used: Option<PathBuf>,
    /// Integrity diagnostics collected from the primary file
    pub diagnostics: Vec<String>,
}

impl StorageEngine {
    /// The canonical location of a project's graph file
    pub fn graph_path(&self, project_id: &ProjectId, format: GraphFormat) -> PathBuf {
        self.root()
            .join("graphs")
            .join(format!("{}.{}", project_id, format))
    }

    /// Save a graph to its canonical location
    pub fn save_graph(
        &self,
        graph: &mut DependencyGraph,
        format: GraphFormat,
        create_backup: bool,
    ) -> Result<GraphSaved> {
        let path = self.graph_path(graph.project_id(), format);
        self.save_graph_to(graph, &path, format, create_backup)
    }

    /// Save a graph to an explicit path. When the target already exists and
    /// `create_backup` is set, the old file is first copied to `<path>.backup` and
    /// rotated into the `.vN` chain.
    pub fn save_graph_to(
        &self,
        graph: &mut DependencyGraph,
        path: &Path,
        format: GraphFormat,
        create_backup: bool,
    ) -> Result<GraphSaved> {
        let path = self.gate().validate_path(path, AccessMode::Write)?;
        let record = graph.serialize(format)?;
        let text = record.to_text(format)?;

        if path.exists() && create_backup {
            fs::copy(&path, sibling(&path, "backup"))?;
            self.rotate_versions(&path)?;
        }
        self.write_text_atomic(&path, &text)?;
        debug!(
            "saved graph {} to {} ({} bytes)",
            graph.project_id(),
            path.display(),
            text.len()
        );
        Ok(GraphSaved {
            path,
            size: text.len() as u64,
            checksum: record.checksum,
        })
    }

    /// Load a project's graph from its canonical location
    pub fn load_graph(&self, project_id: &ProjectId, format: GraphFormat) -> Result<GraphLoad> {
        let path = self.graph_path(project_id, format);
        self.load_graph_from(&path)
    }

    /// Load a graph, picking the format from the file extension. When the primary
    /// file fails its integrity check, recovery tries `<path>.backup`, then the
    /// newest `.vN` version; only when every candidate fails does the load surface
    /// the `corruption` kind with the collected diagnostics.
    pub fn load_graph_from(&self, path: &Path) -> Result<GraphLoad> {
        let path = self.gate().validate_path(path, AccessMode::Read)?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(GraphFormat::from_extension)
            .unwrap_or(GraphFormat::Json);

        let primary_diagnostics = match self.try_load(&path, format) {
            Ok(graph) => {
                return Ok(GraphLoad {
                    graph,
                    recovered: false,
                    backup_used: None,
                    diagnostics: vec![],
                })
            }
            Err(diagnostics) => diagnostics,
        };
        warn!(
            "graph file {} failed its integrity check, attempting recovery",
            path.display()
        );

        for candidate in self.recovery_candidates(&path) {
            if !candidate.exists() {
                continue;
            }
            if let Ok(graph) = self.try_load(&candidate, format) {
                info!("recovered graph from {}", candidate.display());
                return Ok(GraphLoad {
                    graph,
                    recovered: true,
                    backup_used: Some(candidate),
                    diagnostics: primary_diagnostics,
                });
            }
        }

        Err(OverseerError::corruption(
            format!("graph file {} is corrupt and no backup was usable", path.display()),
            primary_diagnostics,
        ))
    }

    /// Parse and integrity-check one candidate file
    fn try_load(&self, path: &Path, format: GraphFormat) -> std::result::Result<DependencyGraph, Vec<String>> {
        let text = fs::read_to_string(path).map_err(|e| vec![e.to_string()])?;
        let record = SerializedGraph::from_text(&text, format).map_err(|e| vec![e.to_string()])?;
        let diagnostics = record.integrity_check();
        if !diagnostics.is_empty() {
            return Err(diagnostics);
        }
        DependencyGraph::from_serialized(&record).map_err(|e| vec![e.to_string()])
    }

    /// `<path>.backup` first, then versions newest first (`.v1` is the most
    /// recently rotated)
    fn recovery_candidates(&self, path: &Path) -> Vec<PathBuf> {
        let mut candidates = vec![sibling(path, "backup")];
        for n in 1..=MAX_VERSIONS {
            candidates.push(sibling(path, &format!("v{}", n)));
        }
        candidates
    }

    /// Shift `.v1 → .v2 → .v3`, dropping the oldest, then park the current file as
    /// `.v1`
    fn rotate_versions(&self, path: &Path) -> Result<()> {
        for n in (1..MAX_VERSIONS).rev() {
            let from = sibling(path, &format!("v{}", n));
            if from.exists() {
                fs::rename(&from, sibling(path, &format!("v{}", n + 1)))?;
            }
        }
        fs::copy(path, sibling(path, "v1"))?;
        Ok(())
    }
}

/// `graph.json` → `graph.json.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push('.');
    name.push_str(suffix);
    path.with_file_name(name)
}

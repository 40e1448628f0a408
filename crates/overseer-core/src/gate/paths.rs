//! Path validation. Every filesystem-touching operation resolves its path here first;
//! a path is only acceptable when it normalises to a descendant of an allowed root
//! for the requested access mode.

use crate::config::SecurityConfig;
use std::fmt::{Display, Formatter};
use std::path::{Component, Path, PathBuf};

/// What the caller intends to do with the path
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum AccessMode {
    Read,
    Write,
    Execute,
}

/// Why a path was rejected
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "camelCase")]
pub enum PathViolationKind {
    PathTraversal,
    OutsideBoundary,
    InvalidPath,
    InvalidExtension,
}

/// A rejected path together with the reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathViolation {
    pub kind: PathViolationKind,
    pub path: PathBuf,
    pub mode: AccessMode,
}

impl Display for PathViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} rejected for {}: {}",
            self.path.display(),
            self.mode,
            self.kind
        )
    }
}

/// The allowed-roots policy compiled from a [`SecurityConfig`]
#[derive(Debug, Clone)]
pub struct PathPolicy {
    read_roots: Vec<PathBuf>,
    write_roots: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl PathPolicy {
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            read_roots: config.allowed_read_paths.iter().map(|p| normalize(p)).collect(),
            write_roots: config.allowed_write_paths.iter().map(|p| normalize(p)).collect(),
            extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Validate a path for the given access mode, returning its normalised form.
    pub fn validate(&self, raw: &Path, mode: AccessMode) -> Result<PathBuf, PathViolation> {
        let violation = |kind| PathViolation {
            kind,
            path: raw.to_path_buf(),
            mode,
        };

        let text = raw.to_string_lossy();
        if text.is_empty() || text.contains('\0') {
            return Err(violation(PathViolationKind::InvalidPath));
        }
        for component in raw.components() {
            match component {
                Component::ParentDir => return Err(violation(PathViolationKind::PathTraversal)),
                Component::Normal(part) if part.to_string_lossy().starts_with('~') => {
                    return Err(violation(PathViolationKind::PathTraversal))
                }
                _ => {}
            }
        }

        let normalized = normalize(raw);
        if !normalized.is_absolute() {
            return Err(violation(PathViolationKind::InvalidPath));
        }

        // write roots also satisfy reads; writes and executes need a write root
        let in_bounds = match mode {
            AccessMode::Read => {
                self.descends(&normalized, &self.read_roots)
                    || self.descends(&normalized, &self.write_roots)
            }
            AccessMode::Write | AccessMode::Execute => {
                self.descends(&normalized, &self.write_roots)
            }
        };
        if !in_bounds {
            return Err(violation(PathViolationKind::OutsideBoundary));
        }

        if !self.extensions.is_empty() {
            if let Some(ext) = normalized.extension() {
                let ext = ext.to_string_lossy().to_lowercase();
                if !self.extensions.contains(&ext) {
                    return Err(violation(PathViolationKind::InvalidExtension));
                }
            }
        }

        Ok(normalized)
    }

    fn descends(&self, path: &Path, roots: &[PathBuf]) -> bool {
        roots.iter().any(|root| path.starts_with(root))
    }
}

/// Lexical normalisation: strips `.` components without touching the filesystem.
/// `..` never survives to this point; [`PathPolicy::validate`] rejects it outright.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PathPolicy {
        PathPolicy::from_config(&SecurityConfig {
            allowed_read_paths: vec![PathBuf::from("/data/readonly")],
            allowed_write_paths: vec![PathBuf::from("/data/store")],
            allowed_extensions: vec!["json".to_string(), "yaml".to_string()],
            ..SecurityConfig::default()
        })
    }

    #[test]
    fn rejects_traversal() {
        let err = policy()
            .validate(Path::new("/data/store/../etc/passwd"), AccessMode::Read)
            .unwrap_err();
        assert_eq!(err.kind, PathViolationKind::PathTraversal);

        let err = policy()
            .validate(Path::new("/data/store/~root/x.json"), AccessMode::Read)
            .unwrap_err();
        assert_eq!(err.kind, PathViolationKind::PathTraversal);
    }

    #[test]
    fn rejects_paths_outside_every_root() {
        let err = policy()
            .validate(Path::new("/tmp/elsewhere.json"), AccessMode::Write)
            .unwrap_err();
        assert_eq!(err.kind, PathViolationKind::OutsideBoundary);
    }

    #[test]
    fn read_roots_do_not_grant_writes() {
        let policy = policy();
        assert!(policy
            .validate(Path::new("/data/readonly/a.json"), AccessMode::Read)
            .is_ok());
        let err = policy
            .validate(Path::new("/data/readonly/a.json"), AccessMode::Write)
            .unwrap_err();
        assert_eq!(err.kind, PathViolationKind::OutsideBoundary);
    }

    #[test]
    fn write_roots_satisfy_reads() {
        assert!(policy()
            .validate(Path::new("/data/store/tasks/t.json"), AccessMode::Read)
            .is_ok());
    }

    #[test]
    fn enforces_extension_whitelist() {
        let policy = policy();
        assert!(policy
            .validate(Path::new("/data/store/graph.yaml"), AccessMode::Write)
            .is_ok());
        let err = policy
            .validate(Path::new("/data/store/run.sh"), AccessMode::Write)
            .unwrap_err();
        assert_eq!(err.kind, PathViolationKind::InvalidExtension);
        // directories carry no extension and pass
        assert!(policy
            .validate(Path::new("/data/store/tasks"), AccessMode::Write)
            .is_ok());
    }

    #[test]
    fn rejects_empty_and_relative_paths() {
        let policy = policy();
        assert_eq!(
            policy.validate(Path::new(""), AccessMode::Read).unwrap_err().kind,
            PathViolationKind::InvalidPath
        );
        assert_eq!(
            policy
                .validate(Path::new("tasks/t.json"), AccessMode::Read)
                .unwrap_err()
                .kind,
            PathViolationKind::InvalidPath
        );
    }
}

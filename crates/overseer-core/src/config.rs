//! Engine configuration. Every knob name and default here is contractual; configs
//! deserialise from TOML with per-field defaults so a partial file is always valid.

use crate::error::{OverseerError, Result};
use std::path::{Path, PathBuf};

/// Queue ordering used by the scheduler each tick
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
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum SchedulingAlgorithm {
    PriorityFirst,
    EarliestDeadline,
    ShortestJob,
    ResourceBalanced,
    HybridOptimal,
}

/// Engine-wide ceilings the scheduler keeps free
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceConstraints {
    pub max_memory_mb: u64,
    pub max_cpu_weight: f64,
    pub max_concurrent_tasks: u32,
    pub reserved_memory_mb: u64,
    pub reserved_cpu_weight: f64,
}

impl Default for ResourceConstraints {
    fn default() -> Self {
        Self {
            max_memory_mb: 8192,
            max_cpu_weight: 16.0,
            max_concurrent_tasks: 50,
            reserved_memory_mb: 1024,
            reserved_cpu_weight: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulingConfig {
    pub algorithm: SchedulingAlgorithm,
    /// Executions considered per scheduling tick
    pub batch_size: usize,
    pub scheduling_interval_ms: u64,
    pub resource_constraints: ResourceConstraints,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            algorithm: SchedulingAlgorithm::HybridOptimal,
            batch_size: 10,
            scheduling_interval_ms: 5000,
            resource_constraints: ResourceConstraints::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatchdogConfig {
    pub enabled: bool,
    pub default_timeout_minutes: f64,
    /// Minutes into a run after which a warning event fires once
    pub warning_threshold_minutes: f64,
    pub health_check_interval_ms: u64,
    pub max_retries: u32,
    /// Heartbeats older than this downgrade an agent to offline
    pub stale_heartbeat_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_timeout_minutes: 30.0,
            warning_threshold_minutes: 25.0,
            health_check_interval_ms: 60_000,
            max_retries: 3,
            stale_heartbeat_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionConfig {
    pub max_concurrent_executions: usize,
    pub execution_timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: 20,
            execution_timeout_ms: 3_600_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_size: usize,
    pub ttl_seconds: u64,
    pub cleanup_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 1000,
            ttl_seconds: 3600,
            cleanup_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackupConfig {
    pub enabled: bool,
    pub interval_minutes: u64,
    pub max_backups: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 60,
            max_backups: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditConfig {
    pub retention_days: u32,
    /// Ring capacity; the oldest events fall off first
    pub max_events: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            max_events: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecurityConfig {
    pub allowed_read_paths: Vec<PathBuf>,
    pub allowed_write_paths: Vec<PathBuf>,
    /// Extension whitelist; empty means unrestricted
    pub allowed_extensions: Vec<String>,
    pub max_string_length: usize,
    pub allow_html: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_read_paths: vec![],
            allowed_write_paths: vec![],
            allowed_extensions: vec![],
            max_string_length: 10_000,
            allow_html: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LockConfig {
    pub max_lock_duration_ms: u64,
    pub cleanup_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_lock_duration_ms: 300_000,
            cleanup_interval_ms: 60_000,
        }
    }
}

/// The full engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OverseerConfig {
    pub scheduling: SchedulingConfig,
    pub watchdog: WatchdogConfig,
    pub execution: ExecutionConfig,
    pub cache: CacheConfig,
    pub backup: BackupConfig,
    pub audit: AuditConfig,
    pub security: SecurityConfig,
    pub locks: LockConfig,
}

impl OverseerConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| OverseerError::validation(e.to_string()))
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_contract() {
        let config = OverseerConfig::default();
        assert_eq!(config.scheduling.algorithm, SchedulingAlgorithm::HybridOptimal);
        assert_eq!(config.scheduling.batch_size, 10);
        assert_eq!(config.scheduling.scheduling_interval_ms, 5000);
        assert_eq!(config.watchdog.max_retries, 3);
        assert_eq!(config.execution.max_concurrent_executions, 20);
        assert_eq!(config.cache.max_size, 1000);
        assert_eq!(config.backup.max_backups, 10);
        assert_eq!(config.audit.retention_days, 30);
        assert_eq!(config.security.max_string_length, 10_000);
        assert_eq!(config.locks.max_lock_duration_ms, 300_000);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = OverseerConfig::from_toml_str(
            r#"
            [scheduling]
            algorithm = "priorityFirst"
            batchSize = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduling.algorithm, SchedulingAlgorithm::PriorityFirst);
        assert_eq!(config.scheduling.batch_size, 2);
        assert_eq!(config.scheduling.scheduling_interval_ms, 5000);
        assert!(config.watchdog.enabled);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(OverseerConfig::from_toml_str("scheduling = 3").is_err());
    }
}

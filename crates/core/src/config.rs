//! TOML-based configuration for a reconciliation session.
//!
//! Every section has defaults, so an empty file is a valid configuration.
//! Call [`AppConfig::validate`] (or [`AppConfig::load_and_validate`]) before
//! starting a session.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Session-wide settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Where the local, remote, and baseline snapshots are read from.
    #[serde(default)]
    pub snapshots: SnapshotConfig,

    /// Payload comparison settings.
    #[serde(default)]
    pub compare: CompareConfig,

    /// Resolution behaviour.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Presentation settings for the tree projection.
    #[serde(default)]
    pub display: DisplayConfig,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Session-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory holding the resolution journal database.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from(".reconcile")
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Paths of the JSON snapshot files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_local")]
    pub local: PathBuf,

    #[serde(default = "default_remote")]
    pub remote: PathBuf,

    /// Last synchronized state. A missing file is treated as an empty
    /// baseline.
    #[serde(default = "default_baseline")]
    pub baseline: PathBuf,
}

fn default_local() -> PathBuf {
    PathBuf::from("local.json")
}
fn default_remote() -> PathBuf {
    PathBuf::from("remote.json")
}
fn default_baseline() -> PathBuf {
    PathBuf::from("baseline.json")
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            local: default_local(),
            remote: default_remote(),
            baseline: default_baseline(),
        }
    }
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// Payload comparison settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareConfig {
    /// Top-level payload fields excluded from change detection.
    #[serde(default = "default_ignored_fields")]
    pub ignored_fields: Vec<String>,

    /// Longest accepted dataset identifier.
    #[serde(default = "default_max_id_length")]
    pub max_id_length: usize,
}

fn default_ignored_fields() -> Vec<String> {
    vec!["lastChange".into(), "version".into()]
}
fn default_max_id_length() -> usize {
    255
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            ignored_fields: default_ignored_fields(),
            max_id_length: default_max_id_length(),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Which overwrite flag a merged payload sets when it equals neither side.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Local is authoritative: push the merged payload to the remote.
    #[default]
    OverwriteRemote,
    /// Pull the merged payload into the local repository.
    OverwriteLocal,
}

/// Resolution behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Flag choice for merged payloads that match neither side.
    #[serde(default)]
    pub merged_tie_break: TieBreak,

    /// Automatically keep the changed side of one-sided changes.
    #[serde(default = "default_true")]
    pub auto_resolve_one_sided: bool,

    /// Automatically resolve conflicts when a clean structural merge exists.
    #[serde(default = "default_true")]
    pub auto_merge_conflicts: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            merged_tie_break: TieBreak::default(),
            auto_resolve_one_sided: true,
            auto_merge_conflicts: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// Presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Order of the type groups in the tree projection. Types not listed
    /// follow in order of first appearance.
    #[serde(default = "default_type_order")]
    pub type_order: Vec<String>,
}

fn default_type_order() -> Vec<String> {
    [
        "project",
        "product_system",
        "process",
        "flow",
        "flow_property",
        "unit_group",
        "impact_method",
        "impact_category",
        "social_indicator",
        "parameter",
        "actor",
        "source",
        "location",
        "currency",
        "dq_system",
        "category",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            type_order: default_type_order(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Validate that all values are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, path) in [
            ("snapshots.local", &self.snapshots.local),
            ("snapshots.remote", &self.snapshots.remote),
            ("snapshots.baseline", &self.snapshots.baseline),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "snapshot path must not be empty".into(),
                });
            }
        }
        if self.compare.max_id_length == 0 {
            return Err(ConfigError::InvalidValue {
                field: "compare.max_id_length".into(),
                detail: "maximum identifier length must be > 0".into(),
            });
        }

        let mut seen = HashSet::new();
        for t in &self.display.type_order {
            if !seen.insert(t.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "display.type_order".into(),
                    detail: format!("type '{}' is listed more than once", t),
                });
            }
        }

        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Path of the SQLite resolution journal.
    pub fn journal_path(&self) -> PathBuf {
        self.session.data_dir.join("journal.db")
    }
}

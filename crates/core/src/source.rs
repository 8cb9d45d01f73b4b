//! Snapshot and baseline sources.
//!
//! The core never talks to repositories directly; it reads the local,
//! remote, and baseline states through these traits. [`JsonFileSource`]
//! reads a JSON array of [`DatasetSnapshot`]s from disk.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::SourceError;
use crate::model::DatasetSnapshot;

/// Supplies the state of one side (local or remote) at comparison time.
pub trait SnapshotSource {
    fn snapshots(&self) -> Result<Vec<DatasetSnapshot>, SourceError>;
}

/// Supplies the last-known-synchronized payload per dataset.
pub trait BaselineSource {
    fn baseline(&self) -> Result<Vec<DatasetSnapshot>, SourceError>;
}

impl SnapshotSource for Vec<DatasetSnapshot> {
    fn snapshots(&self) -> Result<Vec<DatasetSnapshot>, SourceError> {
        Ok(self.clone())
    }
}

impl BaselineSource for Vec<DatasetSnapshot> {
    fn baseline(&self) -> Result<Vec<DatasetSnapshot>, SourceError> {
        Ok(self.clone())
    }
}

/// Reads snapshots from a JSON file holding an array of
/// `{"id", "type", "name"?, "payload"?}` objects.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
    optional: bool,
}

impl JsonFileSource {
    /// A source whose file must exist.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            optional: false,
        }
    }

    /// A source that reads as empty when its file does not exist (e.g. the
    /// baseline before the first synchronization).
    pub fn optional<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            optional: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<DatasetSnapshot>, SourceError> {
        if !self.path.exists() {
            if self.optional {
                debug!(path = %self.path.display(), "optional snapshot file missing, using empty set");
                return Ok(Vec::new());
            }
            return Err(SourceError::FileNotFound(self.path.display().to_string()));
        }

        let contents = std::fs::read_to_string(&self.path)?;
        let snapshots: Vec<DatasetSnapshot> =
            serde_json::from_str(&contents).map_err(|e| SourceError::ParseError {
                path: self.path.display().to_string(),
                detail: e.to_string(),
            })?;

        info!(path = %self.path.display(), count = snapshots.len(), "loaded snapshots");
        Ok(snapshots)
    }
}

impl SnapshotSource for JsonFileSource {
    fn snapshots(&self) -> Result<Vec<DatasetSnapshot>, SourceError> {
        self.load()
    }
}

impl BaselineSource for JsonFileSource {
    fn baseline(&self) -> Result<Vec<DatasetSnapshot>, SourceError> {
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        std::fs::write(
            &path,
            r#"[
                {"id": "p1", "type": "process", "name": "Steel", "payload": {"v": 1}},
                {"id": "p2", "type": "process"}
            ]"#,
        )
        .unwrap();

        let snapshots = JsonFileSource::new(&path).snapshots().unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].name.as_deref(), Some("Steel"));
        assert_eq!(snapshots[0].payload, Some(json!({"v": 1})));
        assert!(snapshots[1].payload.is_none());
    }

    #[test]
    fn test_missing_required_file() {
        let result = JsonFileSource::new("/nonexistent/local.json").snapshots();
        assert!(matches!(result, Err(SourceError::FileNotFound(_))));
    }

    #[test]
    fn test_missing_optional_file_is_empty() {
        let baseline = JsonFileSource::optional("/nonexistent/baseline.json")
            .baseline()
            .unwrap();
        assert!(baseline.is_empty());
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remote.json");
        std::fs::write(&path, r#"{"id": "not-an-array"}"#).unwrap();
        let result = JsonFileSource::new(&path).snapshots();
        assert!(matches!(result, Err(SourceError::ParseError { .. })));
    }
}

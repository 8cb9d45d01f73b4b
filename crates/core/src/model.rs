//! Domain model types shared by the classifier, resolver, tree projection,
//! and the resolution sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// The state of one dataset on one side (local, remote, or baseline) at
/// comparison time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetSnapshot {
    /// Stable identifier, unique within one side.
    pub id: String,
    /// Category/type tag used for grouping (e.g. `process`, `flow`).
    #[serde(rename = "type")]
    pub dataset_type: String,
    /// Human-readable name, if the source provides one.
    #[serde(default)]
    pub name: Option<String>,
    /// Structured payload. `None` means the dataset does not exist on this side.
    #[serde(default)]
    pub payload: Option<Value>,
}

impl DatasetSnapshot {
    /// Create a snapshot that carries a payload.
    pub fn new(id: impl Into<String>, dataset_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            dataset_type: dataset_type.into(),
            name: None,
            payload: Some(payload),
        }
    }

    /// Create a tombstone snapshot (dataset known but absent on this side).
    pub fn absent(id: impl Into<String>, dataset_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dataset_type: dataset_type.into(),
            name: None,
            payload: None,
        }
    }

    /// Attach a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Relationship between the local and remote state of one dataset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    AddedLocal,
    AddedRemote,
    ModifiedLocal,
    ModifiedRemote,
    DeletedLocal,
    DeletedRemote,
    Conflict,
    Unchanged,
}

impl Classification {
    /// All classifications, in display order.
    pub const ALL: [Classification; 8] = [
        Self::AddedLocal,
        Self::AddedRemote,
        Self::ModifiedLocal,
        Self::ModifiedRemote,
        Self::DeletedLocal,
        Self::DeletedRemote,
        Self::Conflict,
        Self::Unchanged,
    ];

    /// True for changes made on the local side only.
    pub fn is_local_change(&self) -> bool {
        matches!(
            self,
            Self::AddedLocal | Self::ModifiedLocal | Self::DeletedLocal
        )
    }

    /// True for changes made on the remote side only.
    pub fn is_remote_change(&self) -> bool {
        matches!(
            self,
            Self::AddedRemote | Self::ModifiedRemote | Self::DeletedRemote
        )
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AddedLocal => write!(f, "added_local"),
            Self::AddedRemote => write!(f, "added_remote"),
            Self::ModifiedLocal => write!(f, "modified_local"),
            Self::ModifiedRemote => write!(f, "modified_remote"),
            Self::DeletedLocal => write!(f, "deleted_local"),
            Self::DeletedRemote => write!(f, "deleted_remote"),
            Self::Conflict => write!(f, "conflict"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

// ---------------------------------------------------------------------------
// Directive kind
// ---------------------------------------------------------------------------

/// Which directive produced the current resolution of an entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveKind {
    KeepLocal,
    KeepRemote,
    Merged,
    Defer,
}

impl DirectiveKind {
    /// Parse a stored directive name.
    pub fn from_str_val(s: &str) -> Option<Self> {
        match s {
            "keep_local" => Some(Self::KeepLocal),
            "keep_remote" => Some(Self::KeepRemote),
            "merged" => Some(Self::Merged),
            "defer" => Some(Self::Defer),
            _ => None,
        }
    }
}

impl std::fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeepLocal => write!(f, "keep_local"),
            Self::KeepRemote => write!(f, "keep_remote"),
            Self::Merged => write!(f, "merged"),
            Self::Defer => write!(f, "defer"),
        }
    }
}

// ---------------------------------------------------------------------------
// DiffEntry
// ---------------------------------------------------------------------------

/// One compared dataset together with its classification and resolution
/// state.
///
/// Entries are created by the classifier and mutated only by the resolver.
/// The fields are read-only from outside the crate, and entries can only be
/// built by classification (there is no `Deserialize`).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DiffEntry {
    pub(crate) dataset_id: String,
    pub(crate) dataset_type: String,
    pub(crate) display_name: Option<String>,
    pub(crate) classification: Classification,
    pub(crate) local_payload: Option<Value>,
    pub(crate) remote_payload: Option<Value>,
    pub(crate) baseline_payload: Option<Value>,
    pub(crate) merged_payload: Option<Value>,
    pub(crate) overwrite_local: bool,
    pub(crate) overwrite_remote: bool,
    pub(crate) resolution: Option<DirectiveKind>,
    pub(crate) resolved_at: Option<DateTime<Utc>>,
    pub(crate) finalized: bool,
}

impl DiffEntry {
    pub(crate) fn new(
        dataset_id: String,
        dataset_type: String,
        display_name: Option<String>,
        classification: Classification,
    ) -> Self {
        Self {
            dataset_id,
            dataset_type,
            display_name,
            classification,
            local_payload: None,
            remote_payload: None,
            baseline_payload: None,
            merged_payload: None,
            overwrite_local: false,
            overwrite_remote: false,
            resolution: None,
            resolved_at: None,
            finalized: false,
        }
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    pub fn dataset_type(&self) -> &str {
        &self.dataset_type
    }

    /// The dataset name if known, otherwise its identifier.
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.dataset_id)
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    pub fn local_payload(&self) -> Option<&Value> {
        self.local_payload.as_ref()
    }

    pub fn remote_payload(&self) -> Option<&Value> {
        self.remote_payload.as_ref()
    }

    pub fn baseline_payload(&self) -> Option<&Value> {
        self.baseline_payload.as_ref()
    }

    pub fn merged_payload(&self) -> Option<&Value> {
        self.merged_payload.as_ref()
    }

    pub fn overwrite_local(&self) -> bool {
        self.overwrite_local
    }

    pub fn overwrite_remote(&self) -> bool {
        self.overwrite_remote
    }

    /// The directive that produced the current resolution, if any.
    pub fn resolution(&self) -> Option<DirectiveKind> {
        self.resolution
    }

    /// When the current resolution was applied.
    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    /// Whether a resolution has been recorded.
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// Whether the resolution was already handed to a sink in this session.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Clear any recorded resolution, returning the entry to its freshly
    /// classified state.
    pub(crate) fn reset_resolution(&mut self) {
        self.merged_payload = None;
        self.overwrite_local = false;
        self.overwrite_remote = false;
        self.resolution = None;
        self.resolved_at = None;
    }

    /// Build the record handed to a resolution sink. `None` while unresolved.
    pub fn to_record(&self) -> Option<ResolutionRecord> {
        let directive = self.resolution?;
        let resolved_at = self.resolved_at?;
        Some(ResolutionRecord {
            dataset_id: self.dataset_id.clone(),
            dataset_type: self.dataset_type.clone(),
            directive,
            merged_payload: self.merged_payload.clone(),
            overwrite_local: self.overwrite_local,
            overwrite_remote: self.overwrite_remote,
            resolved_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Resolution record
// ---------------------------------------------------------------------------

/// What the resolution sink receives for each resolved entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolutionRecord {
    pub dataset_id: String,
    pub dataset_type: String,
    pub directive: DirectiveKind,
    pub merged_payload: Option<Value>,
    pub overwrite_local: bool,
    pub overwrite_remote: bool,
    pub resolved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_deserialize_type_field() {
        let snap: DatasetSnapshot =
            serde_json::from_value(json!({"id": "p1", "type": "process", "payload": {"a": 1}}))
                .unwrap();
        assert_eq!(snap.dataset_type, "process");
        assert_eq!(snap.payload, Some(json!({"a": 1})));
        assert!(snap.name.is_none());

        let tombstone: DatasetSnapshot =
            serde_json::from_value(json!({"id": "p2", "type": "flow"})).unwrap();
        assert!(tombstone.payload.is_none());
    }

    #[test]
    fn test_classification_display_matches_serde() {
        for c in Classification::ALL {
            let serialized = serde_json::to_value(c).unwrap();
            assert_eq!(serialized, json!(c.to_string()));
        }
    }

    #[test]
    fn test_side_predicates() {
        assert!(Classification::DeletedLocal.is_local_change());
        assert!(!Classification::DeletedLocal.is_remote_change());
        assert!(Classification::AddedRemote.is_remote_change());
        assert!(!Classification::Conflict.is_local_change());
        assert!(!Classification::Conflict.is_remote_change());
    }

    #[test]
    fn test_directive_kind_round_trip() {
        for kind in [
            DirectiveKind::KeepLocal,
            DirectiveKind::KeepRemote,
            DirectiveKind::Merged,
            DirectiveKind::Defer,
        ] {
            assert_eq!(DirectiveKind::from_str_val(&kind.to_string()), Some(kind));
        }
        assert_eq!(DirectiveKind::from_str_val("keep_both"), None);
    }

    #[test]
    fn test_entry_serializes_for_presentation() {
        let mut entry = DiffEntry::new("d".into(), "flow".into(), None, Classification::Conflict);
        entry.resolution = Some(DirectiveKind::KeepLocal);
        entry.overwrite_remote = true;
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["classification"], json!("conflict"));
        assert_eq!(value["overwrite_remote"], json!(true));
        assert_eq!(value["resolved_at"], Value::Null);
    }

    #[test]
    fn test_record_carries_resolution_time() {
        let mut entry = DiffEntry::new("d".into(), "flow".into(), None, Classification::Conflict);
        entry.resolution = Some(DirectiveKind::KeepRemote);
        entry.overwrite_local = true;
        let resolved_at = Utc::now() - chrono::Duration::minutes(5);
        entry.resolved_at = Some(resolved_at);
        assert_eq!(entry.to_record().unwrap().resolved_at, resolved_at);

        entry.reset_resolution();
        assert!(entry.resolved_at().is_none());
        assert!(entry.to_record().is_none());
    }

    #[test]
    fn test_unresolved_entry_has_no_record() {
        let entry = DiffEntry::new("d".into(), "flow".into(), None, Classification::Conflict);
        assert!(entry.to_record().is_none());
        assert_eq!(entry.display_name(), "d");
        assert!(!entry.overwrite_local() && !entry.overwrite_remote());
    }
}

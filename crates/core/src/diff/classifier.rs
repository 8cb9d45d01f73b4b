//! Classification of dataset differences.
//!
//! Given the local, remote, and baseline snapshot sets, the classifier
//! produces one [`DiffEntry`] per dataset identifier describing what changed
//! and on which side since the last synchronization.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::CompareConfig;
use crate::errors::ReconcileError;
use crate::model::{Classification, DatasetSnapshot, DiffEntry};

// ---------------------------------------------------------------------------
// Payload comparison
// ---------------------------------------------------------------------------

/// Compares payloads while ignoring bookkeeping fields.
#[derive(Debug, Clone, Default)]
pub struct PayloadComparer {
    ignored_fields: HashSet<String>,
}

impl PayloadComparer {
    pub fn new<I, S>(ignored_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored_fields: ignored_fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a top-level field is excluded from comparison.
    pub fn is_ignored(&self, field: &str) -> bool {
        self.ignored_fields.contains(field)
    }

    /// Compare two optional payloads. Two absent payloads are equal.
    pub fn same(&self, a: Option<&Value>, b: Option<&Value>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => self.same_value(a, b),
            _ => false,
        }
    }

    fn same_value(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Object(a), Value::Object(b)) if !self.ignored_fields.is_empty() => {
                self.relevant(a).count() == self.relevant(b).count()
                    && self
                        .relevant(a)
                        .all(|(k, v)| b.get(k).is_some_and(|other| other == v))
            }
            _ => a == b,
        }
    }

    fn relevant<'a>(&'a self, map: &'a Map<String, Value>) -> impl Iterator<Item = (&'a String, &'a Value)> {
        map.iter()
            .filter(move |(k, _)| !self.ignored_fields.contains(k.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Comparison result
// ---------------------------------------------------------------------------

/// The outcome of one classification pass.
#[derive(Debug, Clone, Default)]
pub struct Comparison {
    entries: Vec<DiffEntry>,
}

impl Comparison {
    /// All entries, including unchanged ones, in first-appearance order.
    pub fn entries(&self) -> &[DiffEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<DiffEntry> {
        self.entries
    }

    /// Entries that need attention (everything except `Unchanged`).
    pub fn changed(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries
            .iter()
            .filter(|e| e.classification() != Classification::Unchanged)
    }

    /// Number of entries with the given classification.
    pub fn count(&self, classification: Classification) -> usize {
        self.entries
            .iter()
            .filter(|e| e.classification() == classification)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Stateless (apart from settings) classifier over three snapshot sets.
#[derive(Debug, Clone)]
pub struct Classifier {
    comparer: PayloadComparer,
    max_id_length: usize,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&CompareConfig::default())
    }
}

impl Classifier {
    pub fn new(config: &CompareConfig) -> Self {
        Self {
            comparer: PayloadComparer::new(config.ignored_fields.iter().cloned()),
            max_id_length: config.max_id_length,
        }
    }

    pub fn comparer(&self) -> &PayloadComparer {
        &self.comparer
    }

    /// Classify every dataset present in any of the three sets.
    ///
    /// Fails with [`ReconcileError::InvalidSnapshot`] if an identifier is
    /// malformed, appears twice within one set, or carries different dataset
    /// types on different sides. No entries are produced in that case.
    pub fn classify(
        &self,
        local: &[DatasetSnapshot],
        remote: &[DatasetSnapshot],
        baseline: &[DatasetSnapshot],
    ) -> Result<Comparison, ReconcileError> {
        info!(
            local_count = local.len(),
            remote_count = remote.len(),
            baseline_count = baseline.len(),
            "classifying datasets"
        );

        let local_by_id = self.index_side("local", local)?;
        let remote_by_id = self.index_side("remote", remote)?;
        let baseline_by_id = self.index_side("baseline", baseline)?;

        let mut seen = HashSet::new();
        let ids: Vec<&str> = local
            .iter()
            .chain(remote)
            .chain(baseline)
            .map(|s| s.id.as_str())
            .filter(|id| seen.insert(*id))
            .collect();

        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            let l = local_by_id.get(id).copied();
            let r = remote_by_id.get(id).copied();
            let b = baseline_by_id.get(id).copied();

            let dataset_type = consistent_type(id, [l, r, b])?;
            let name = [l, r, b]
                .into_iter()
                .flatten()
                .find_map(|s| s.name.clone());

            let lp = l.and_then(|s| s.payload.as_ref());
            let rp = r.and_then(|s| s.payload.as_ref());
            let bp = b.and_then(|s| s.payload.as_ref());

            let classification = self.classify_payloads(lp, rp, bp);
            debug!(dataset_id = id, %classification, "dataset classified");

            let mut entry = DiffEntry::new(id.to_string(), dataset_type, name, classification);
            entry.local_payload = lp.cloned();
            entry.remote_payload = rp.cloned();
            entry.baseline_payload = bp.cloned();
            entries.push(entry);
        }

        let comparison = Comparison { entries };
        info!(
            total = comparison.entries.len(),
            changed = comparison.changed().count(),
            conflicts = comparison.count(Classification::Conflict),
            "classification complete"
        );
        Ok(comparison)
    }

    /// Decide the relationship between local and remote for one dataset.
    pub fn classify_payloads(
        &self,
        local: Option<&Value>,
        remote: Option<&Value>,
        baseline: Option<&Value>,
    ) -> Classification {
        let local_changed = !self.comparer.same(local, baseline);
        let remote_changed = !self.comparer.same(remote, baseline);

        match (local_changed, remote_changed) {
            (false, false) => Classification::Unchanged,
            (true, true) if self.comparer.same(local, remote) => Classification::Unchanged,
            (true, true) => Classification::Conflict,
            (true, false) => match (baseline, local) {
                (None, _) => Classification::AddedLocal,
                (Some(_), None) => Classification::DeletedLocal,
                (Some(_), Some(_)) => Classification::ModifiedLocal,
            },
            (false, true) => match (baseline, remote) {
                (None, _) => Classification::AddedRemote,
                (Some(_), None) => Classification::DeletedRemote,
                (Some(_), Some(_)) => Classification::ModifiedRemote,
            },
        }
    }

    fn index_side<'a>(
        &self,
        side: &str,
        snapshots: &'a [DatasetSnapshot],
    ) -> Result<HashMap<&'a str, &'a DatasetSnapshot>, ReconcileError> {
        let mut by_id = HashMap::with_capacity(snapshots.len());
        for snapshot in snapshots {
            self.validate_id(&snapshot.id)?;
            if by_id.insert(snapshot.id.as_str(), snapshot).is_some() {
                return Err(ReconcileError::InvalidSnapshot {
                    dataset_id: snapshot.id.clone(),
                    detail: format!("identifier appears more than once in the {} set", side),
                });
            }
        }
        Ok(by_id)
    }

    fn validate_id(&self, id: &str) -> Result<(), ReconcileError> {
        let detail = if id.is_empty() {
            Some("identifier is empty".to_string())
        } else if id.chars().count() > self.max_id_length {
            Some(format!(
                "identifier is longer than {} characters",
                self.max_id_length
            ))
        } else if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
            Some("identifier contains whitespace or control characters".to_string())
        } else {
            None
        };

        match detail {
            Some(detail) => Err(ReconcileError::InvalidSnapshot {
                dataset_id: id.to_string(),
                detail,
            }),
            None => Ok(()),
        }
    }
}

/// All snapshots of one dataset must agree on its type.
fn consistent_type(
    id: &str,
    sides: [Option<&DatasetSnapshot>; 3],
) -> Result<String, ReconcileError> {
    let mut types = sides.into_iter().flatten().map(|s| s.dataset_type.as_str());
    let first = types.next().unwrap_or_default();
    if let Some(other) = types.find(|t| *t != first) {
        return Err(ReconcileError::InvalidSnapshot {
            dataset_id: id.to_string(),
            detail: format!("dataset type differs between sides ('{}' vs '{}')", first, other),
        });
    }
    Ok(first.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snap(id: &str, payload: Value) -> DatasetSnapshot {
        DatasetSnapshot::new(id, "process", payload)
    }

    fn classify_one(
        local: Option<Value>,
        remote: Option<Value>,
        baseline: Option<Value>,
    ) -> Classification {
        Classifier::default().classify_payloads(local.as_ref(), remote.as_ref(), baseline.as_ref())
    }

    #[test]
    fn test_added_local_when_absent_remotely_and_in_baseline() {
        let c = Classifier::default();
        let result = c.classify(&[snap("D1", json!({"n": 1}))], &[], &[]).unwrap();
        assert_eq!(result.entries().len(), 1);
        let entry = &result.entries()[0];
        assert_eq!(entry.classification(), Classification::AddedLocal);
        assert_eq!(entry.local_payload(), Some(&json!({"n": 1})));
        assert!(entry.remote_payload().is_none());
        assert!(entry.merged_payload().is_none());
    }

    #[test]
    fn test_added_remote() {
        assert_eq!(
            classify_one(None, Some(json!(1)), None),
            Classification::AddedRemote
        );
    }

    #[test]
    fn test_identical_change_is_unchanged() {
        let c = Classifier::default();
        let base = [snap("D2", json!({"v": 1}))];
        let result = c
            .classify(
                &[snap("D2", json!({"v": 2}))],
                &[snap("D2", json!({"v": 2}))],
                &base,
            )
            .unwrap();
        assert_eq!(result.entries()[0].classification(), Classification::Unchanged);
        assert_eq!(result.changed().count(), 0);
    }

    #[test]
    fn test_one_sided_modifications_and_deletions() {
        let b = Some(json!({"v": 1}));
        let changed = Some(json!({"v": 2}));
        assert_eq!(
            classify_one(changed.clone(), b.clone(), b.clone()),
            Classification::ModifiedLocal
        );
        assert_eq!(
            classify_one(b.clone(), changed, b.clone()),
            Classification::ModifiedRemote
        );
        assert_eq!(
            classify_one(None, b.clone(), b.clone()),
            Classification::DeletedLocal
        );
        assert_eq!(
            classify_one(b.clone(), None, b),
            Classification::DeletedRemote
        );
    }

    #[test]
    fn test_conflict_iff_both_differ_from_baseline_and_each_other() {
        let b = json!({"v": 0});
        let cases = [
            (Some(json!({"v": 1})), Some(json!({"v": 2})), Some(b.clone())),
            (Some(json!({"v": 1})), None, Some(b.clone())),
            (None, Some(json!({"v": 2})), Some(b.clone())),
            (Some(json!({"v": 1})), Some(json!({"v": 2})), None),
            (Some(json!({"v": 1})), Some(json!({"v": 1})), Some(b.clone())),
            (Some(b.clone()), Some(json!({"v": 2})), Some(b.clone())),
            (None, None, Some(b.clone())),
        ];
        let comparer = PayloadComparer::default();
        for (l, r, base) in cases {
            let expected = !comparer.same(l.as_ref(), base.as_ref())
                && !comparer.same(r.as_ref(), base.as_ref())
                && !comparer.same(l.as_ref(), r.as_ref());
            let got = classify_one(l.clone(), r.clone(), base.clone());
            assert_eq!(
                got == Classification::Conflict,
                expected,
                "local={:?} remote={:?} base={:?} -> {}",
                l,
                r,
                base,
                got
            );
        }
    }

    #[test]
    fn test_ignored_fields_do_not_create_changes() {
        let c = Classifier::default();
        let result = c
            .classify(
                &[snap("P", json!({"name": "a", "lastChange": 2, "version": "1.1"}))],
                &[snap("P", json!({"name": "a", "lastChange": 1, "version": "1.0"}))],
                &[snap("P", json!({"name": "a", "lastChange": 1, "version": "1.0"}))],
            )
            .unwrap();
        assert_eq!(result.entries()[0].classification(), Classification::Unchanged);
    }

    #[test]
    fn test_ignored_fields_only_apply_at_top_level() {
        let comparer = PayloadComparer::new(["version"]);
        assert!(comparer.same(Some(&json!({"version": 1})), Some(&json!({"version": 2}))));
        assert!(!comparer.same(
            Some(&json!({"unit": {"version": 1}})),
            Some(&json!({"unit": {"version": 2}}))
        ));
        assert!(!comparer.same(Some(&json!({"a": 1})), Some(&json!({"a": 1, "b": 2}))));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let c = Classifier::default();
        let local = [snap("D1", json!(1)), snap("D1", json!(2))];
        let err = c.classify(&local, &[], &[]).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::InvalidSnapshot { ref dataset_id, .. } if dataset_id == "D1"
        ));
    }

    #[test]
    fn test_malformed_ids_rejected() {
        let c = Classifier::new(&CompareConfig {
            max_id_length: 8,
            ..CompareConfig::default()
        });
        for bad in ["", "has space", "tab\tid", "way-too-long-id"] {
            let err = c.classify(&[], &[snap(bad, json!(1))], &[]).unwrap_err();
            assert!(matches!(err, ReconcileError::InvalidSnapshot { .. }), "{bad:?}");
        }
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let c = Classifier::default();
        let err = c
            .classify(
                &[DatasetSnapshot::new("X", "flow", json!(1))],
                &[DatasetSnapshot::new("X", "process", json!(1))],
                &[],
            )
            .unwrap_err();
        assert!(err.to_string().contains("dataset type differs"));
    }

    #[test]
    fn test_first_appearance_order_and_names() {
        let c = Classifier::default();
        let result = c
            .classify(
                &[snap("b", json!(1)), snap("a", json!(1))],
                &[snap("c", json!(1)).with_name("Steel"), snap("a", json!(1))],
                &[snap("d", json!(1))],
            )
            .unwrap();
        let ids: Vec<&str> = result.entries().iter().map(|e| e.dataset_id()).collect();
        assert_eq!(ids, vec!["b", "a", "c", "d"]);
        assert_eq!(result.entries()[2].display_name(), "Steel");
        // "d" vanished on both sides: identical change.
        assert_eq!(result.entries()[3].classification(), Classification::Unchanged);
        assert_eq!(result.count(Classification::AddedLocal), 1);
        assert_eq!(result.count(Classification::AddedRemote), 1);
    }

    #[test]
    fn test_tombstone_equals_absence() {
        let c = Classifier::default();
        let result = c
            .classify(
                &[DatasetSnapshot::absent("T", "process")],
                &[snap("T", json!({"v": 1}))],
                &[snap("T", json!({"v": 1}))],
            )
            .unwrap();
        assert_eq!(result.entries()[0].classification(), Classification::DeletedLocal);
    }
}

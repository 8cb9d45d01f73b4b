//! Structural three-way merge of JSON payloads.
//!
//! Objects are merged key by key against the baseline; arrays and scalars are
//! atomic. A key changed differently on both sides is reported as a
//! conflicting path and makes the merge unclean. Payload diffs for display are
//! rendered with the `diffy` crate.

use serde_json::{Map, Value};
use tracing::{debug, info};

use super::classifier::PayloadComparer;

/// The result of a three-way merge attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    /// The merged payload. When `has_conflicts` is true, conflicting positions
    /// hold the local value and the payload must not be applied as-is.
    pub merged: Option<Value>,
    /// Whether any position changed differently on both sides.
    pub has_conflicts: bool,
    /// JSON-pointer paths of the conflicting positions (`""` is the root).
    pub conflicting_paths: Vec<String>,
}

impl MergeResult {
    fn clean(merged: Option<&Value>) -> Self {
        Self {
            merged: merged.cloned(),
            has_conflicts: false,
            conflicting_paths: Vec::new(),
        }
    }
}

/// Three-way merge engine for JSON payloads.
#[derive(Debug, Clone, Default)]
pub struct Merger {
    comparer: PayloadComparer,
}

impl Merger {
    pub fn new(comparer: PayloadComparer) -> Self {
        Self { comparer }
    }

    /// Attempt a three-way merge of `base`, `local`, and `remote`.
    ///
    /// `None` stands for "dataset absent". Ignored bookkeeping fields at the
    /// top level never conflict; the local value is kept for them.
    pub fn three_way_merge(
        &self,
        base: Option<&Value>,
        local: Option<&Value>,
        remote: Option<&Value>,
    ) -> MergeResult {
        info!("performing three-way payload merge");

        // Fast path: if either side is identical to base, the other side wins cleanly.
        if self.comparer.same(local, base) {
            debug!("local == base, remote wins cleanly");
            return MergeResult::clean(remote);
        }
        if self.comparer.same(remote, base) {
            debug!("remote == base, local wins cleanly");
            return MergeResult::clean(local);
        }

        // Fast path: if both sides made the same change, no conflict.
        if self.comparer.same(local, remote) {
            debug!("local == remote, identical changes");
            return MergeResult::clean(local);
        }

        let mut conflicts = Vec::new();
        let merged = match (local, remote) {
            (Some(Value::Object(l)), Some(Value::Object(r))) => {
                let empty = Map::new();
                let b = match base {
                    Some(Value::Object(b)) => b,
                    _ => &empty,
                };
                Some(Value::Object(self.merge_objects("", b, l, r, &mut conflicts, true)))
            }
            _ => {
                conflicts.push(String::new());
                local.cloned()
            }
        };

        if conflicts.is_empty() {
            debug!("clean structural merge");
        } else {
            debug!(count = conflicts.len(), "structural merge left conflicts");
        }

        MergeResult {
            merged,
            has_conflicts: !conflicts.is_empty(),
            conflicting_paths: conflicts,
        }
    }

    /// Quick check: can these three versions be merged without conflicts?
    pub fn can_auto_merge(
        &self,
        base: Option<&Value>,
        local: Option<&Value>,
        remote: Option<&Value>,
    ) -> bool {
        !self.three_way_merge(base, local, remote).has_conflicts
    }

    /// Render a unified diff between the pretty-printed local and remote
    /// payloads. An absent payload renders as an empty document.
    pub fn render_diff(local: Option<&Value>, remote: Option<&Value>) -> String {
        let local_text = pretty(local);
        let remote_text = pretty(remote);
        diffy::create_patch(&local_text, &remote_text).to_string()
    }

    fn merge_objects(
        &self,
        path: &str,
        base: &Map<String, Value>,
        local: &Map<String, Value>,
        remote: &Map<String, Value>,
        conflicts: &mut Vec<String>,
        top_level: bool,
    ) -> Map<String, Value> {
        let mut keys: Vec<&String> = Vec::new();
        for key in base.keys().chain(local.keys()).chain(remote.keys()) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        let mut merged = Map::new();
        for key in keys {
            let child_path = format!("{}/{}", path, escape_pointer(key));
            let value = if top_level && self.comparer.is_ignored(key) {
                local.get(key).or_else(|| remote.get(key)).cloned()
            } else {
                self.merge_value(
                    &child_path,
                    base.get(key),
                    local.get(key),
                    remote.get(key),
                    conflicts,
                )
            };
            if let Some(v) = value {
                merged.insert(key.clone(), v);
            }
        }
        merged
    }

    fn merge_value(
        &self,
        path: &str,
        base: Option<&Value>,
        local: Option<&Value>,
        remote: Option<&Value>,
        conflicts: &mut Vec<String>,
    ) -> Option<Value> {
        if local == base {
            return remote.cloned();
        }
        if remote == base || local == remote {
            return local.cloned();
        }

        if let (Some(Value::Object(l)), Some(Value::Object(r))) = (local, remote) {
            let empty = Map::new();
            let b = match base {
                Some(Value::Object(b)) => b,
                _ => &empty,
            };
            return Some(Value::Object(self.merge_objects(path, b, l, r, conflicts, false)));
        }

        debug!(path, "conflicting change");
        conflicts.push(path.to_string());
        local.cloned()
    }
}

fn pretty(value: Option<&Value>) -> String {
    match value {
        Some(v) => {
            let mut text = serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string());
            text.push('\n');
            text
        }
        None => String::new(),
    }
}

/// Escape a key for use in a JSON pointer (RFC 6901).
fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

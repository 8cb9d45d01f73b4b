//! Resolution of classified entries.
//!
//! The [`Resolver`] applies one [`ResolutionRequest`] at a time to a
//! [`DiffEntry`], recording the merged payload and which side must be
//! overwritten. It can also propose automatic directives for entries that do
//! not need a human decision.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::classifier::PayloadComparer;
use super::merger::Merger;
use crate::config::{CompareConfig, ResolverConfig, TieBreak};
use crate::errors::ReconcileError;
use crate::model::{Classification, DiffEntry, DirectiveKind};

// ---------------------------------------------------------------------------
// Directives
// ---------------------------------------------------------------------------

/// A caller-supplied instruction resolving one entry.
///
/// Serialized as `{"directive": "keep_local"}` or
/// `{"directive": "merged", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum Directive {
    /// Keep the local state and push it to the remote.
    KeepLocal,
    /// Keep the remote state and pull it into the local repository.
    KeepRemote,
    /// Use a hand-merged payload.
    Merged { payload: Value },
    /// Leave the entry unresolved for a later session.
    Defer,
}

impl Directive {
    pub fn kind(&self) -> DirectiveKind {
        match self {
            Self::KeepLocal => DirectiveKind::KeepLocal,
            Self::KeepRemote => DirectiveKind::KeepRemote,
            Self::Merged { .. } => DirectiveKind::Merged,
            Self::Defer => DirectiveKind::Defer,
        }
    }
}

/// One resolution request: the directive plus whether it may replace a
/// resolution that was already finalized in this session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRequest {
    #[serde(flatten)]
    pub directive: Directive,
    #[serde(default, rename = "override")]
    pub override_finalized: bool,
}

impl ResolutionRequest {
    pub fn new(directive: Directive) -> Self {
        Self {
            directive,
            override_finalized: false,
        }
    }

    /// Mark the request as an explicit re-resolution of a finalized entry.
    pub fn overriding(mut self) -> Self {
        self.override_finalized = true;
        self
    }
}

impl From<Directive> for ResolutionRequest {
    fn from(directive: Directive) -> Self {
        Self::new(directive)
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Local,
    Remote,
}

/// Applies directives to entries.
#[derive(Debug, Clone)]
pub struct Resolver {
    comparer: PayloadComparer,
    merger: Merger,
    tie_break: TieBreak,
    auto_resolve_one_sided: bool,
    auto_merge_conflicts: bool,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(&ResolverConfig::default(), &CompareConfig::default())
    }
}

impl Resolver {
    pub fn new(config: &ResolverConfig, compare: &CompareConfig) -> Self {
        let comparer = PayloadComparer::new(compare.ignored_fields.iter().cloned());
        Self {
            merger: Merger::new(comparer.clone()),
            comparer,
            tie_break: config.merged_tie_break,
            auto_resolve_one_sided: config.auto_resolve_one_sided,
            auto_merge_conflicts: config.auto_merge_conflicts,
        }
    }

    pub fn merger(&self) -> &Merger {
        &self.merger
    }

    /// Apply a resolution request to `entry`.
    ///
    /// On error the entry is left exactly as it was. A successful request
    /// replaces any earlier resolution of the same entry.
    pub fn resolve(
        &self,
        entry: &mut DiffEntry,
        request: &ResolutionRequest,
    ) -> Result<(), ReconcileError> {
        let kind = request.directive.kind();
        info!(
            dataset_id = %entry.dataset_id,
            classification = %entry.classification,
            directive = %kind,
            "resolving entry"
        );

        let (merged, side) = match &request.directive {
            Directive::Defer => {
                debug!(dataset_id = %entry.dataset_id, "entry deferred");
                return Ok(());
            }
            Directive::KeepLocal => (entry.local_payload.clone(), Side::Remote),
            Directive::KeepRemote => (entry.remote_payload.clone(), Side::Local),
            Directive::Merged { payload } => {
                // A null payload means "absent": merging to nothing deletes.
                let merged = Some(payload).filter(|p| !p.is_null()).cloned();
                let side = self.merged_target(entry, merged.as_ref());
                (merged, side)
            }
        };

        if let Err(e) = self.check(entry, request) {
            warn!(dataset_id = %entry.dataset_id, error = %e, "directive rejected");
            return Err(e);
        }

        entry.reset_resolution();
        entry.merged_payload = merged;
        match side {
            Side::Local => entry.overwrite_local = true,
            Side::Remote => entry.overwrite_remote = true,
        }
        entry.resolution = Some(kind);
        entry.resolved_at = Some(Utc::now());
        entry.finalized = false;

        debug!(
            dataset_id = %entry.dataset_id,
            overwrite_local = entry.overwrite_local,
            overwrite_remote = entry.overwrite_remote,
            "entry resolved"
        );
        Ok(())
    }

    /// Propose a directive that needs no human decision, if there is one.
    ///
    /// One-sided changes keep the side that changed; conflicts are resolved
    /// only when a clean structural merge against the baseline exists.
    pub fn auto_directive(&self, entry: &DiffEntry) -> Option<Directive> {
        let classification = entry.classification;
        if classification.is_local_change() {
            return self.auto_resolve_one_sided.then_some(Directive::KeepLocal);
        }
        if classification.is_remote_change() {
            return self.auto_resolve_one_sided.then_some(Directive::KeepRemote);
        }
        if classification != Classification::Conflict || !self.auto_merge_conflicts {
            return None;
        }

        let result = self.merger.three_way_merge(
            entry.baseline_payload.as_ref(),
            entry.local_payload.as_ref(),
            entry.remote_payload.as_ref(),
        );
        if result.has_conflicts {
            debug!(
                dataset_id = %entry.dataset_id,
                paths = ?result.conflicting_paths,
                "conflict needs a manual decision"
            );
            return None;
        }
        result.merged.map(|payload| Directive::Merged { payload })
    }

    /// Which side a merged payload overwrites.
    fn merged_target(&self, entry: &DiffEntry, payload: Option<&Value>) -> Side {
        if self.comparer.same(payload, entry.remote_payload.as_ref()) {
            return Side::Local;
        }
        if self.comparer.same(payload, entry.local_payload.as_ref()) {
            return Side::Remote;
        }
        debug!(
            dataset_id = %entry.dataset_id,
            tie_break = ?self.tie_break,
            "merged payload matches neither side"
        );
        match self.tie_break {
            TieBreak::OverwriteRemote => Side::Remote,
            TieBreak::OverwriteLocal => Side::Local,
        }
    }

    fn check(&self, entry: &DiffEntry, request: &ResolutionRequest) -> Result<(), ReconcileError> {
        let illegal = |detail: &str| ReconcileError::IllegalDirective {
            dataset_id: entry.dataset_id.clone(),
            directive: request.directive.kind().to_string(),
            classification: entry.classification.to_string(),
            detail: detail.to_string(),
        };

        if entry.classification == Classification::Unchanged {
            return Err(illegal("dataset is unchanged on both sides"));
        }
        if entry.finalized && !request.override_finalized {
            return Err(ReconcileError::ResolutionConflict(entry.dataset_id.clone()));
        }

        match request.directive {
            Directive::KeepLocal if !side_exists(entry, Side::Local) => {
                Err(illegal("local side never held this dataset"))
            }
            Directive::KeepRemote if !side_exists(entry, Side::Remote) => {
                Err(illegal("remote side never held this dataset"))
            }
            _ => Ok(()),
        }
    }
}

/// A side "exists" for a dataset if it holds it now or held it at the
/// baseline (keeping such a side may propagate a deletion).
fn side_exists(entry: &DiffEntry, side: Side) -> bool {
    let payload = match side {
        Side::Local => entry.local_payload.as_ref(),
        Side::Remote => entry.remote_payload.as_ref(),
    };
    payload.is_some() || entry.baseline_payload.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::Classifier;
    use crate::model::DatasetSnapshot;
    use serde_json::json;

    fn entry(
        local: Option<Value>,
        remote: Option<Value>,
        baseline: Option<Value>,
    ) -> DiffEntry {
        let side = |p: Option<Value>| -> Vec<DatasetSnapshot> {
            p.map(|p| vec![DatasetSnapshot::new("D", "process", p)])
                .unwrap_or_default()
        };
        let mut entries = Classifier::default()
            .classify(&side(local), &side(remote), &side(baseline))
            .unwrap()
            .into_entries();
        entries.remove(0)
    }

    fn conflict() -> DiffEntry {
        entry(
            Some(json!({"v": "local"})),
            Some(json!({"v": "remote"})),
            Some(json!({"v": "base"})),
        )
    }

    #[test]
    fn test_keep_local_on_added_local() {
        let resolver = Resolver::default();
        let mut e = entry(Some(json!({"n": 1})), None, None);
        assert_eq!(e.classification(), Classification::AddedLocal);
        resolver.resolve(&mut e, &Directive::KeepLocal.into()).unwrap();
        assert!(e.overwrite_remote());
        assert!(!e.overwrite_local());
        assert_eq!(e.merged_payload(), Some(&json!({"n": 1})));
        assert_eq!(e.resolution(), Some(DirectiveKind::KeepLocal));
    }

    #[test]
    fn test_keep_remote_on_added_local_is_illegal() {
        let resolver = Resolver::default();
        let mut e = entry(Some(json!({"n": 1})), None, None);
        let before = e.clone();
        let err = resolver
            .resolve(&mut e, &Directive::KeepRemote.into())
            .unwrap_err();
        assert!(matches!(err, ReconcileError::IllegalDirective { .. }));
        assert_eq!(e, before);
    }

    #[test]
    fn test_keep_local_on_added_remote_is_illegal() {
        let resolver = Resolver::default();
        let mut e = entry(None, Some(json!(1)), None);
        assert!(resolver.resolve(&mut e, &Directive::KeepLocal.into()).is_err());
        assert!(!e.is_resolved());
    }

    #[test]
    fn test_keep_remote_on_conflict() {
        let resolver = Resolver::default();
        let mut e = conflict();
        resolver.resolve(&mut e, &Directive::KeepRemote.into()).unwrap();
        assert!(e.overwrite_local());
        assert!(!e.overwrite_remote());
        assert_eq!(e.merged_payload(), Some(&json!({"v": "remote"})));
    }

    #[test]
    fn test_deletion_propagates_with_null_merged_payload() {
        let resolver = Resolver::default();
        let mut e = entry(None, Some(json!({"v": 1})), Some(json!({"v": 1})));
        assert_eq!(e.classification(), Classification::DeletedLocal);
        resolver.resolve(&mut e, &Directive::KeepLocal.into()).unwrap();
        assert!(e.is_resolved());
        assert!(e.merged_payload().is_none());
        assert!(e.overwrite_remote());
    }

    #[test]
    fn test_merged_equal_to_remote_overwrites_local() {
        let resolver = Resolver::default();
        let mut e = conflict();
        let request = Directive::Merged {
            payload: json!({"v": "remote"}),
        }
        .into();
        resolver.resolve(&mut e, &request).unwrap();
        assert!(e.overwrite_local());
        assert!(!e.overwrite_remote());
    }

    #[test]
    fn test_merged_equal_to_local_overwrites_remote() {
        let resolver = Resolver::default();
        let mut e = conflict();
        let request = Directive::Merged {
            payload: json!({"v": "local"}),
        }
        .into();
        resolver.resolve(&mut e, &request).unwrap();
        assert!(e.overwrite_remote());
        assert!(!e.overwrite_local());
    }

    #[test]
    fn test_merged_equal_to_neither_uses_tie_break() {
        let payload = json!({"v": "both"});
        let mut e = conflict();
        Resolver::default()
            .resolve(&mut e, &Directive::Merged { payload: payload.clone() }.into())
            .unwrap();
        assert!(e.overwrite_remote() && !e.overwrite_local());
        assert_eq!(e.merged_payload(), Some(&payload));

        let config = ResolverConfig {
            merged_tie_break: TieBreak::OverwriteLocal,
            ..ResolverConfig::default()
        };
        let resolver = Resolver::new(&config, &CompareConfig::default());
        let mut e = conflict();
        resolver
            .resolve(&mut e, &Directive::Merged { payload }.into())
            .unwrap();
        assert!(e.overwrite_local() && !e.overwrite_remote());
    }

    #[test]
    fn test_re_resolution_replaces_flags() {
        let resolver = Resolver::default();
        let mut e = conflict();
        resolver.resolve(&mut e, &Directive::KeepLocal.into()).unwrap();
        resolver.resolve(&mut e, &Directive::KeepRemote.into()).unwrap();
        assert!(e.overwrite_local());
        assert!(!e.overwrite_remote());
        assert_eq!(e.resolution(), Some(DirectiveKind::KeepRemote));
    }

    #[test]
    fn test_resolving_twice_is_idempotent() {
        let resolver = Resolver::default();
        let request: ResolutionRequest = Directive::Merged {
            payload: json!({"v": "x"}),
        }
        .into();
        let mut once = conflict();
        resolver.resolve(&mut once, &request).unwrap();
        let mut twice = conflict();
        resolver.resolve(&mut twice, &request).unwrap();
        resolver.resolve(&mut twice, &request).unwrap();
        once.resolved_at = None;
        twice.resolved_at = None;
        assert_eq!(once, twice);
    }

    #[test]
    fn test_null_merged_payload_propagates_deletion() {
        let resolver = Resolver::default();
        let mut e = entry(None, Some(json!({"v": 1})), Some(json!({"v": 1})));
        assert_eq!(e.classification(), Classification::DeletedLocal);
        let request = Directive::Merged {
            payload: Value::Null,
        }
        .into();
        resolver.resolve(&mut e, &request).unwrap();
        assert!(e.merged_payload().is_none());
        assert!(e.overwrite_remote() && !e.overwrite_local());
        let record = e.to_record().unwrap();
        assert!(record.merged_payload.is_none());
        assert_eq!(record.directive, DirectiveKind::Merged);
    }

    #[test]
    fn test_resolution_time_is_taken_when_resolved() {
        let resolver = Resolver::default();
        let mut e = conflict();
        assert!(e.resolved_at().is_none());
        let before = Utc::now();
        resolver.resolve(&mut e, &Directive::KeepLocal.into()).unwrap();
        let resolved_at = e.resolved_at().unwrap();
        assert!(resolved_at >= before);
        assert_eq!(e.to_record().unwrap().resolved_at, resolved_at);
    }

    #[test]
    fn test_every_resolution_sets_exactly_one_flag() {
        let resolver = Resolver::default();
        let cases = vec![
            entry(Some(json!({"v": 1})), None, None),
            entry(None, Some(json!({"v": 1})), None),
            entry(Some(json!({"v": 2})), Some(json!({"v": 1})), Some(json!({"v": 1}))),
            entry(Some(json!({"v": 1})), Some(json!({"v": 2})), Some(json!({"v": 1}))),
            entry(None, Some(json!({"v": 1})), Some(json!({"v": 1}))),
            entry(Some(json!({"v": 1})), None, Some(json!({"v": 1}))),
            conflict(),
            entry(Some(json!({"v": 2})), None, Some(json!({"v": 1}))),
        ];
        let mut covered: Vec<Classification> = cases.iter().map(|e| e.classification()).collect();
        covered.dedup();
        assert_eq!(covered.len(), Classification::ALL.len() - 1);
        assert!(!covered.contains(&Classification::Unchanged));

        let directives = vec![
            Directive::KeepLocal,
            Directive::KeepRemote,
            Directive::Merged {
                payload: json!({"v": "merged"}),
            },
            Directive::Merged {
                payload: json!({"v": 1}),
            },
            Directive::Merged {
                payload: Value::Null,
            },
        ];

        let mut rejected = Vec::new();
        for case in &cases {
            for directive in &directives {
                let mut e = case.clone();
                match resolver.resolve(&mut e, &directive.clone().into()) {
                    Ok(()) => {
                        assert!(
                            e.overwrite_local() ^ e.overwrite_remote(),
                            "{} with {:?}",
                            case.classification(),
                            directive
                        );
                        assert!(e.is_resolved());
                        assert!(e.to_record().is_some());
                    }
                    Err(_) => {
                        assert_eq!(&e, case);
                        rejected.push((case.classification(), directive.kind()));
                    }
                }
            }
        }
        assert_eq!(
            rejected,
            vec![
                (Classification::AddedLocal, DirectiveKind::KeepRemote),
                (Classification::AddedRemote, DirectiveKind::KeepLocal),
            ]
        );
    }

    #[test]
    fn test_defer_does_not_mutate() {
        let resolver = Resolver::default();
        let mut e = conflict();
        resolver.resolve(&mut e, &Directive::KeepLocal.into()).unwrap();
        let before = e.clone();
        resolver.resolve(&mut e, &Directive::Defer.into()).unwrap();
        assert_eq!(e, before);

        let mut fresh = conflict();
        resolver.resolve(&mut fresh, &Directive::Defer.into()).unwrap();
        assert!(!fresh.is_resolved());
        assert!(!fresh.overwrite_local() && !fresh.overwrite_remote());
    }

    #[test]
    fn test_unchanged_entry_rejects_directives() {
        let resolver = Resolver::default();
        let mut e = entry(Some(json!(1)), Some(json!(1)), Some(json!(1)));
        let err = resolver
            .resolve(&mut e, &Directive::KeepLocal.into())
            .unwrap_err();
        assert!(matches!(err, ReconcileError::IllegalDirective { .. }));
    }

    #[test]
    fn test_finalized_entry_requires_override() {
        let resolver = Resolver::default();
        let mut e = conflict();
        resolver.resolve(&mut e, &Directive::KeepLocal.into()).unwrap();
        e.finalized = true;

        let err = resolver
            .resolve(&mut e, &Directive::KeepRemote.into())
            .unwrap_err();
        assert!(matches!(err, ReconcileError::ResolutionConflict(_)));
        assert!(e.overwrite_remote());

        resolver
            .resolve(
                &mut e,
                &ResolutionRequest::new(Directive::KeepRemote).overriding(),
            )
            .unwrap();
        assert!(e.overwrite_local());
        assert!(!e.is_finalized());
    }

    #[test]
    fn test_auto_directive_one_sided() {
        let resolver = Resolver::default();
        let local_mod = entry(Some(json!(2)), Some(json!(1)), Some(json!(1)));
        assert_eq!(resolver.auto_directive(&local_mod), Some(Directive::KeepLocal));
        let remote_del = entry(Some(json!(1)), None, Some(json!(1)));
        assert_eq!(resolver.auto_directive(&remote_del), Some(Directive::KeepRemote));

        let config = ResolverConfig {
            auto_resolve_one_sided: false,
            ..ResolverConfig::default()
        };
        let manual = Resolver::new(&config, &CompareConfig::default());
        assert_eq!(manual.auto_directive(&local_mod), None);
    }

    #[test]
    fn test_auto_directive_conflicts() {
        let resolver = Resolver::default();
        let mergeable = entry(
            Some(json!({"a": 1, "b": 0})),
            Some(json!({"a": 0, "b": 1})),
            Some(json!({"a": 0, "b": 0})),
        );
        assert_eq!(
            resolver.auto_directive(&mergeable),
            Some(Directive::Merged {
                payload: json!({"a": 1, "b": 1})
            })
        );
        assert_eq!(resolver.auto_directive(&conflict()), None);
    }

    #[test]
    fn test_request_serde_shape() {
        let request: ResolutionRequest = serde_json::from_value(json!({
            "directive": "merged",
            "payload": {"v": 1},
            "override": true
        }))
        .unwrap();
        assert_eq!(
            request.directive,
            Directive::Merged {
                payload: json!({"v": 1})
            }
        );
        assert!(request.override_finalized);

        let keep: ResolutionRequest =
            serde_json::from_value(json!({"directive": "keep_local"})).unwrap();
        assert_eq!(keep, ResolutionRequest::new(Directive::KeepLocal));
    }
}

//! Reconciliation session controller.
//!
//! A [`ReconcileSession`] owns the entry sequence produced by one comparison
//! pass. It is the only writer: every resolution goes through
//! [`ReconcileSession::resolve`], one entry at a time. Presentation reads the
//! entries and [`DiffTree`] projections without mutating them.

use std::collections::HashMap;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::diff::{Classifier, Comparison, ResolutionRequest, Resolver};
use crate::errors::{CoreError, ReconcileError, SinkError};
use crate::model::{Classification, DiffEntry};
use crate::sink::ResolutionSink;
use crate::source::{BaselineSource, JsonFileSource, SnapshotSource};
use crate::tree::DiffTree;

/// Outcome of [`ReconcileSession::auto_resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoResolveSummary {
    /// Entries resolved without a human decision.
    pub resolved: usize,
    /// Changed entries still waiting for a directive.
    pub remaining: usize,
}

/// Outcome of [`ReconcileSession::commit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Records handed to the sink.
    pub committed: usize,
    /// Changed entries left unresolved (deferred to a later session).
    pub unresolved: usize,
}

/// One reconciliation session over a fixed comparison.
#[derive(Debug)]
pub struct ReconcileSession {
    id: Uuid,
    entries: Vec<DiffEntry>,
    index: HashMap<String, usize>,
    resolver: Resolver,
}

impl ReconcileSession {
    /// Start a session from a finished comparison.
    pub fn new(comparison: Comparison, resolver: Resolver) -> Self {
        let entries = comparison.into_entries();
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.dataset_id().to_string(), i))
            .collect();
        let id = Uuid::new_v4();
        info!(session_id = %id, entries = entries.len(), "reconciliation session started");
        Self {
            id,
            entries,
            index,
            resolver,
        }
    }

    /// Load the three snapshot sets from their sources and classify them.
    pub fn compare(
        classifier: &Classifier,
        resolver: Resolver,
        local: &dyn SnapshotSource,
        remote: &dyn SnapshotSource,
        baseline: &dyn BaselineSource,
    ) -> Result<Self, CoreError> {
        let local = local.snapshots()?;
        let remote = remote.snapshots()?;
        let baseline = baseline.baseline()?;
        let comparison = classifier.classify(&local, &remote, &baseline)?;
        Ok(Self::new(comparison, resolver))
    }

    /// Build a session from the snapshot files named in `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, CoreError> {
        let classifier = Classifier::new(&config.compare);
        let resolver = Resolver::new(&config.resolver, &config.compare);
        Self::compare(
            &classifier,
            resolver,
            &JsonFileSource::new(&config.snapshots.local),
            &JsonFileSource::new(&config.snapshots.remote),
            &JsonFileSource::optional(&config.snapshots.baseline),
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// All entries, including unchanged ones.
    pub fn entries(&self) -> &[DiffEntry] {
        &self.entries
    }

    /// Entries that need attention (everything except `Unchanged`).
    pub fn changed_entries(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries
            .iter()
            .filter(|e| e.classification() != Classification::Unchanged)
    }

    /// Changed entries without a recorded resolution.
    pub fn unresolved(&self) -> impl Iterator<Item = &DiffEntry> {
        self.changed_entries().filter(|e| !e.is_resolved())
    }

    pub fn entry(&self, dataset_id: &str) -> Option<&DiffEntry> {
        self.index.get(dataset_id).map(|&i| &self.entries[i])
    }

    /// Apply one directive to one entry.
    pub fn resolve(
        &mut self,
        dataset_id: &str,
        request: impl Into<ResolutionRequest>,
    ) -> Result<(), ReconcileError> {
        let i = *self
            .index
            .get(dataset_id)
            .ok_or_else(|| ReconcileError::NotFound(dataset_id.to_string()))?;
        self.resolver.resolve(&mut self.entries[i], &request.into())
    }

    /// Resolve every unresolved entry for which the resolver has an automatic
    /// directive.
    pub fn auto_resolve(&mut self) -> AutoResolveSummary {
        let mut summary = AutoResolveSummary::default();
        for entry in self.entries.iter_mut() {
            if entry.classification() == Classification::Unchanged || entry.is_resolved() {
                continue;
            }
            let applied = match self.resolver.auto_directive(entry) {
                Some(directive) => match self.resolver.resolve(entry, &directive.into()) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(dataset_id = %entry.dataset_id(), error = %e, "automatic directive rejected");
                        false
                    }
                },
                None => false,
            };
            if applied {
                summary.resolved += 1;
            } else {
                summary.remaining += 1;
            }
        }
        info!(
            session_id = %self.id,
            resolved = summary.resolved,
            remaining = summary.remaining,
            "automatic resolution complete"
        );
        summary
    }

    /// Project the current entries into a tree grouped by dataset type.
    pub fn project(&self, type_order: &[String]) -> DiffTree {
        DiffTree::project(&self.entries, type_order)
    }

    /// Hand every resolved, not yet finalized entry to `sink` and mark it
    /// finalized. Stops at the first sink error; entries delivered before the
    /// error stay finalized.
    pub fn commit(&mut self, sink: &mut dyn ResolutionSink) -> Result<CommitSummary, SinkError> {
        let mut summary = CommitSummary::default();
        for entry in self.entries.iter_mut() {
            if entry.is_finalized() {
                continue;
            }
            let Some(record) = entry.to_record() else {
                if entry.classification() != Classification::Unchanged {
                    summary.unresolved += 1;
                }
                continue;
            };
            sink.apply(&record)?;
            entry.finalized = true;
            summary.committed += 1;
        }
        info!(
            session_id = %self.id,
            committed = summary.committed,
            unresolved = summary.unresolved,
            "session committed"
        );
        Ok(summary)
    }
}

//! Dataset reconciliation core library.
//!
//! This crate compares the local and remote states of a set of datasets
//! against their last synchronized baseline, classifies every difference,
//! records how each one is resolved, and projects the differences into a
//! tree grouped by dataset type for presentation. Writing the merged
//! results back to the repositories is left to a resolution sink.

pub mod config;
pub mod db;
pub mod diff;
pub mod errors;
pub mod model;
pub mod session;
pub mod sink;
pub mod source;
pub mod tree;

// Re-exports for convenience.
pub use config::AppConfig;
pub use db::Database;
pub use diff::{Classifier, Directive, ResolutionRequest, Resolver};
pub use model::{Classification, DatasetSnapshot, DiffEntry, ResolutionRecord};
pub use session::ReconcileSession;
pub use tree::DiffTree;

//! Difference classification, structural merging, and resolution.
//!
//! The diff subsystem is responsible for:
//! 1. **Classification** -- comparing local and remote snapshots against the
//!    baseline to find what changed where.
//! 2. **Merging** -- attempting automatic three-way merges of JSON payloads.
//! 3. **Resolution** -- applying user or automatic directives to entries.

pub mod classifier;
pub mod merger;
pub mod resolver;

pub use classifier::{Classifier, Comparison, PayloadComparer};
pub use merger::{MergeResult, Merger};
pub use resolver::{Directive, ResolutionRequest, Resolver};

//! Entity canonicalization.
//!
//! - `clusterer`: pairwise merge decisions and merge groups
//! - `merger`: collapses a group into one canonical entity
//! - `canonicalizer`: the per-batch entry point
//! - `stats`: before/after statistics

mod canonicalizer;
mod clusterer;
mod merger;
mod stats;

pub use canonicalizer::Canonicalizer;
pub use clusterer::{EntityClusterer, MergeDecision, MergeGroup, MergeReason};
pub use merger::{EntityMerger, MergeOutcome};
pub use stats::{cross_document_entities, CrossDocumentStats, MergeStatistics, TypeMergeStats};

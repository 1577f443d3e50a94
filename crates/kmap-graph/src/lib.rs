//! kmap-graph - Entity reconciliation for kmap.
//!
//! This crate reconciles entities extracted from many independently processed
//! documents before they reach the graph and vector stores.
//!
//! # Components
//!
//! - `similarity`: cosine, acronym, alias and lexical matching
//! - `entity`: clustering, merging and the per-batch canonicalizer
//! - `conflict`: cross-document disagreement detection and `compares_with` edges
//! - `search`: an in-memory `SimilaritySearch` for tests and local runs
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use kmap_core::ReconcileConfig;
//! use kmap_graph::{Canonicalizer, ConflictDetector, InMemorySimilaritySearch};
//!
//! let config = ReconcileConfig::default();
//! let index = Arc::new(InMemorySimilaritySearch::new());
//! let canonicalizer = Canonicalizer::new(config.canonicalization.clone(), Some(index))?;
//!
//! let canonical = canonicalizer.canonicalize(batch.entities.clone()).await;
//! let stats = canonicalizer.merge_statistics(&batch.entities, &canonical);
//!
//! let detector = ConflictDetector::new(config.conflict)?;
//! let (comparisons, analysis) = detector.detect_and_create_comparisons(&canonical);
//! ```

pub mod conflict;
pub mod entity;
pub mod search;
pub mod similarity;

pub use conflict::{
    CompareDecision, Conflict, ConflictDetector, ConflictPair, ConflictedEntity,
    CrossDocumentAnalysis,
};
pub use entity::{
    Canonicalizer, CrossDocumentStats, EntityClusterer, EntityMerger, MergeDecision, MergeGroup,
    MergeOutcome, MergeReason, MergeStatistics, TypeMergeStats,
};
pub use search::InMemorySimilaritySearch;

// Re-export core types
pub use kmap_core::{
    Entity, EntityType, KmapError, KmapResult, ReconcileConfig, Relationship, SimilarEntity,
    SimilaritySearch,
};

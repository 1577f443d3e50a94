//! kmap-core - Core library for kmap.
//!
//! This crate provides the entity model, the similarity-search collaborator
//! trait, error types, and configuration shared by the kmap reconciliation
//! engine.
//!
//! # Example
//!
//! ```ignore
//! use kmap_core::{Entity, EntityType, SourceSpan};
//!
//! let entity = Entity::new("Machine Learning", EntityType::Concept)
//!     .with_alias("ML")
//!     .with_salience(0.9)
//!     .with_span(SourceSpan::new("doc-1", 0, 16));
//!
//! assert_eq!(entity.id, Entity::generate_id("Machine Learning", EntityType::Concept));
//! ```

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{
    CanonicalizationConfig, ClusteringMode, ConflictConfig, ReconcileConfig,
    ReconcileConfigBuilder,
};
pub use error::{ErrorCode, KmapError, KmapResult};
pub use traits::{SimilarEntity, SimilaritySearch};
pub use types::{
    Entity, EntityType, Evidence, ExtractionBatch, RelationType, Relationship, SourceSpan,
};

//! Similarity search trait and related types.
//!
//! The vector index that stores previously canonicalized entities lives
//! outside this workspace. Reconciliation only needs one query from it, so
//! the trait is kept to that single method.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::KmapResult;
use crate::types::{Entity, EntityType};

/// An entity returned from a similarity query, with its score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarEntity {
    /// The stored entity.
    pub entity: Entity,
    /// Cosine similarity reported by the index.
    pub score: f32,
}

impl SimilarEntity {
    /// Create a new result.
    pub fn new(entity: Entity, score: f32) -> Self {
        Self { entity, score }
    }
}

/// Vector similarity lookup over stored entities.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Find stored entities similar to `vector`.
    ///
    /// Results are ordered by descending score, limited to `top_k`, and only
    /// include scores at or above `score_threshold`. `type_filter` restricts
    /// results to one entity type.
    async fn find_similar(
        &self,
        vector: &[f32],
        type_filter: Option<EntityType>,
        top_k: usize,
        score_threshold: f32,
    ) -> KmapResult<Vec<SimilarEntity>>;
}

//! In-memory similarity index.
//!
//! Brute-force cosine scan over stored canonical entities. Used by the CLI to
//! seed prior entities and by tests standing in for a vector database.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use kmap_core::{Entity, EntityType, KmapResult, SimilarEntity, SimilaritySearch};

use crate::similarity::cosine_similarity;

/// Similarity index held in memory, keyed by entity id.
#[derive(Default)]
pub struct InMemorySimilaritySearch {
    entities: RwLock<HashMap<String, Entity>>,
}

impl InMemorySimilaritySearch {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index holding `entities`.
    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        Self {
            entities: RwLock::new(entities.into_iter().map(|e| (e.id.clone(), e)).collect()),
        }
    }

    /// Insert or replace an entity by id.
    pub async fn upsert(&self, entity: Entity) {
        let mut entities = self.entities.write().await;
        entities.insert(entity.id.clone(), entity);
    }

    /// Insert or replace several entities.
    pub async fn upsert_many(&self, batch: impl IntoIterator<Item = Entity>) {
        let mut entities = self.entities.write().await;
        for entity in batch {
            entities.insert(entity.id.clone(), entity);
        }
    }

    /// Number of stored entities.
    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    /// Whether the index is empty.
    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }
}

#[async_trait]
impl SimilaritySearch for InMemorySimilaritySearch {
    async fn find_similar(
        &self,
        vector: &[f32],
        type_filter: Option<EntityType>,
        top_k: usize,
        score_threshold: f32,
    ) -> KmapResult<Vec<SimilarEntity>> {
        let entities = self.entities.read().await;

        let mut results: Vec<SimilarEntity> = entities
            .values()
            .filter(|e| type_filter.map_or(true, |t| e.entity_type == t))
            .filter_map(|e| {
                let embedding = e.embedding.as_deref()?;
                let score = cosine_similarity(vector, embedding);
                (score >= score_threshold).then(|| SimilarEntity::new(e.clone(), score))
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entity.id.cmp(&b.entity.id))
        });
        results.truncate(top_k);

        debug!(
            "In-memory search returned {} of {} stored entities",
            results.len(),
            entities.len()
        );
        Ok(results)
    }
}

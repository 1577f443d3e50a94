//! Per-batch entity canonicalization.
//!
//! Partitions a batch by entity type, clusters each bucket, and merges each
//! cluster into one canonical entity. Output keeps the input order of each
//! group's seed.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use kmap_core::{
    CanonicalizationConfig, Entity, EntityType, KmapError, KmapResult, SimilaritySearch,
};

use super::clusterer::EntityClusterer;
use super::merger::EntityMerger;
use super::stats::{self, MergeStatistics};

/// Canonicalizes extraction batches.
pub struct Canonicalizer {
    clusterer: EntityClusterer,
    merger: EntityMerger,
}

impl Canonicalizer {
    /// Create a canonicalizer.
    ///
    /// `search` is the index of previously canonicalized entities. Pass
    /// `None` to match within the batch only.
    pub fn new(
        config: CanonicalizationConfig,
        search: Option<Arc<dyn SimilaritySearch>>,
    ) -> KmapResult<Self> {
        config.validate()?;
        let merger = EntityMerger::new(&config);
        Ok(Self {
            clusterer: EntityClusterer::new(config, search),
            merger,
        })
    }

    /// Get the config.
    pub fn config(&self) -> &CanonicalizationConfig {
        self.clusterer.config()
    }

    /// Get the clusterer.
    pub fn clusterer(&self) -> &EntityClusterer {
        &self.clusterer
    }

    /// Canonicalize a batch.
    ///
    /// Never returns more entities than it was given. If canonicalization
    /// fails the input is returned as-is.
    pub async fn canonicalize(&self, entities: Vec<Entity>) -> Vec<Entity> {
        match self.try_canonicalize(&entities).await {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!(
                    "Canonicalization failed, keeping {} original entities: {}",
                    entities.len(),
                    e
                );
                entities
            }
        }
    }

    /// Canonicalize a batch, surfacing unexpected failures.
    ///
    /// Invalid entities pass through unmerged. A group that fails to merge
    /// keeps its batch members unmerged.
    pub async fn try_canonicalize(&self, entities: &[Entity]) -> KmapResult<Vec<Entity>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        info!("Starting canonicalization of {} entities", entities.len());

        let mut output: Vec<(usize, Entity)> = Vec::with_capacity(entities.len());
        let mut buckets: BTreeMap<EntityType, (Vec<usize>, Vec<Entity>)> = BTreeMap::new();

        for (index, entity) in entities.iter().enumerate() {
            if let Err(e) = entity.validate() {
                warn!("Skipping invalid entity '{}' ({}): {}", entity.name, entity.id, e);
                output.push((index, entity.clone()));
                continue;
            }
            let (indices, bucket) = buckets.entry(entity.entity_type).or_default();
            indices.push(index);
            bucket.push(entity.clone());
        }

        for (entity_type, (indices, bucket)) in &buckets {
            debug!("Processing {} entities of type {}", bucket.len(), entity_type);

            for group in self.clusterer.cluster(bucket).await {
                let seed_position = indices[group.seed_index];

                if group.is_singleton() {
                    output.push((seed_position, bucket[group.seed_index].clone()));
                    continue;
                }

                match self.merger.merge_with_outcome(&group.members(bucket)) {
                    Ok(outcome) => {
                        debug!(
                            "Absorbed {:?} into '{}'",
                            outcome.absorbed_ids, outcome.entity.name
                        );
                        output.push((seed_position, outcome.entity));
                    }
                    Err(e) => {
                        warn!(
                            "Failed to merge group seeded by '{}', keeping members unmerged: {}",
                            bucket[group.seed_index].name, e
                        );
                        output.extend(
                            group
                                .member_indices
                                .iter()
                                .map(|&i| (indices[i], bucket[i].clone())),
                        );
                    }
                }
            }
        }

        if output.len() > entities.len() {
            return Err(KmapError::Internal(format!(
                "Canonicalization produced {} entities from {} inputs",
                output.len(),
                entities.len()
            )));
        }

        output.sort_by_key(|(index, _)| *index);
        let canonical: Vec<Entity> = output.into_iter().map(|(_, e)| e).collect();

        info!(
            "Canonicalization complete: {} entities -> {} canonical entities ({} merges)",
            entities.len(),
            canonical.len(),
            entities.len() - canonical.len()
        );

        Ok(canonical)
    }

    /// Canonicalize one entity against the similarity index.
    ///
    /// Returns the entity unchanged when nothing matches or anything fails.
    pub async fn canonicalize_entity(&self, entity: Entity) -> Entity {
        if let Err(e) = entity.validate() {
            warn!("Not canonicalizing invalid entity '{}': {}", entity.name, e);
            return entity;
        }

        let bucket = std::slice::from_ref(&entity);
        let Some(group) = self.clusterer.cluster(bucket).await.into_iter().next() else {
            return entity;
        };

        if group.external.is_empty() {
            debug!("No similar entities found for '{}'", entity.name);
            return entity;
        }

        let matched: Vec<String> = group
            .external
            .iter()
            .zip(&group.reasons)
            .map(|(similar, reason)| format!("{} ({})", similar.entity.name, reason))
            .collect();
        info!(
            "Canonicalizing '{}' with {} similar entities: {}",
            entity.name,
            matched.len(),
            matched.join(", ")
        );

        match self.merger.merge(&group.members(bucket)) {
            Ok(merged) => merged,
            Err(e) => {
                warn!("Error canonicalizing entity {}: {}", entity.id, e);
                entity
            }
        }
    }

    /// Statistics comparing a batch with its canonical form.
    pub fn merge_statistics(&self, original: &[Entity], canonical: &[Entity]) -> MergeStatistics {
        MergeStatistics::compute(original, canonical)
    }

    /// Entities that appear in more than one document.
    pub fn cross_document_entities<'a>(&self, entities: &'a [Entity]) -> Vec<&'a Entity> {
        stats::cross_document_entities(entities)
    }
}

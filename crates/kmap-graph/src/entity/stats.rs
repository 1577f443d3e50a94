//! Canonicalization statistics.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use kmap_core::{Entity, EntityType};

/// Before/after counts for one entity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeMergeStats {
    pub original: usize,
    pub canonical: usize,
    pub merged: usize,
    pub merge_rate: f64,
}

/// Provenance spread of the canonical entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossDocumentStats {
    /// Canonical entities seen in more than one document.
    pub entities_spanning_multiple_docs: usize,
    /// Every document id referenced, sorted.
    pub document_sources: Vec<String>,
    pub total_unique_documents: usize,
    pub average_docs_per_entity: f64,
    pub max_docs_per_entity: usize,
}

/// Summary of one canonicalization pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeStatistics {
    pub original_count: usize,
    pub canonical_count: usize,
    pub merged_count: usize,
    pub merge_rate: f64,
    pub by_type: BTreeMap<EntityType, TypeMergeStats>,
    pub cross_document: CrossDocumentStats,
}

impl MergeStatistics {
    /// Compare an input batch with its canonicalized form.
    pub fn compute(original: &[Entity], canonical: &[Entity]) -> Self {
        let merged_count = original.len().saturating_sub(canonical.len());

        let mut by_type: BTreeMap<EntityType, TypeMergeStats> = BTreeMap::new();
        for entity in original {
            by_type.entry(entity.entity_type).or_default().original += 1;
        }
        for entity in canonical {
            by_type.entry(entity.entity_type).or_default().canonical += 1;
        }
        for stats in by_type.values_mut() {
            stats.merged = stats.original.saturating_sub(stats.canonical);
            stats.merge_rate = rate(stats.merged, stats.original);
        }

        Self {
            original_count: original.len(),
            canonical_count: canonical.len(),
            merged_count,
            merge_rate: rate(merged_count, original.len()),
            by_type,
            cross_document: CrossDocumentStats::compute(canonical),
        }
    }
}

impl CrossDocumentStats {
    fn compute(entities: &[Entity]) -> Self {
        let mut sources: BTreeSet<&str> = BTreeSet::new();
        let mut spanning = 0;
        let mut total_docs = 0;
        let mut max_docs = 0;

        for entity in entities {
            let docs = entity.document_ids();
            let count = docs.len();
            total_docs += count;
            max_docs = max_docs.max(count);
            if count > 1 {
                spanning += 1;
            }
            sources.extend(docs);
        }

        let average = if entities.is_empty() {
            0.0
        } else {
            total_docs as f64 / entities.len() as f64
        };

        Self {
            entities_spanning_multiple_docs: spanning,
            total_unique_documents: sources.len(),
            document_sources: sources.into_iter().map(String::from).collect(),
            average_docs_per_entity: average,
            max_docs_per_entity: max_docs,
        }
    }
}

/// Entities whose provenance covers more than one document.
pub fn cross_document_entities(entities: &[Entity]) -> Vec<&Entity> {
    entities.iter().filter(|e| e.is_cross_document()).collect()
}

fn rate(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

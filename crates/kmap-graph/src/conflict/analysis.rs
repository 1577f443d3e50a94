//! Cross-document pattern analysis over comparison edges.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use kmap_core::{Entity, EntityType, Relationship};

/// An entity ranked by incident comparison edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictedEntity {
    pub entity_id: String,
    pub entity_name: String,
    pub entity_type: EntityType,
    pub conflict_count: usize,
}

/// Report produced alongside comparison relationships.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossDocumentAnalysis {
    pub total_entities: usize,
    /// Entities whose own provenance spans more than one document.
    pub cross_document_entities: usize,
    pub comparison_relationships: usize,
    /// Document pairs linked by a comparison, each pair sorted.
    pub document_pairs: Vec<(String, String)>,
    pub total_document_pairs: usize,
    /// Comparison edges per type of their source entity.
    pub conflicts_by_type: BTreeMap<EntityType, usize>,
    /// Highest comparison counts first; ties keep first appearance.
    pub most_conflicted: Vec<ConflictedEntity>,
}

pub(crate) fn analyze(
    entities: &[Entity],
    relationships: &[Relationship],
    top_n: usize,
) -> CrossDocumentAnalysis {
    let mut by_id: HashMap<&str, &Entity> = HashMap::new();
    for entity in entities {
        by_id.entry(entity.id.as_str()).or_insert(entity);
    }

    let mut document_pairs: BTreeSet<(String, String)> = BTreeSet::new();
    let mut conflicts_by_type: BTreeMap<EntityType, usize> = BTreeMap::new();
    let mut counts: Vec<(&str, usize)> = Vec::new();
    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut comparison_relationships = 0;

    for rel in relationships.iter().filter(|r| r.is_comparison()) {
        comparison_relationships += 1;

        for id in [rel.from_entity.as_str(), rel.to_entity.as_str()] {
            let slot = *position.entry(id).or_insert_with(|| {
                counts.push((id, 0));
                counts.len() - 1
            });
            counts[slot].1 += 1;
        }

        let (Some(from), Some(to)) = (
            by_id.get(rel.from_entity.as_str()),
            by_id.get(rel.to_entity.as_str()),
        ) else {
            continue;
        };

        for from_doc in from.document_ids() {
            for to_doc in to.document_ids() {
                if from_doc != to_doc {
                    let pair = if from_doc < to_doc {
                        (from_doc.to_string(), to_doc.to_string())
                    } else {
                        (to_doc.to_string(), from_doc.to_string())
                    };
                    document_pairs.insert(pair);
                }
            }
        }

        *conflicts_by_type.entry(from.entity_type).or_insert(0) += 1;
    }

    // Stable sort keeps first appearance among equal counts
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    let most_conflicted = counts
        .into_iter()
        .filter_map(|(id, count)| {
            by_id.get(id).map(|entity| ConflictedEntity {
                entity_id: id.to_string(),
                entity_name: entity.name.clone(),
                entity_type: entity.entity_type,
                conflict_count: count,
            })
        })
        .take(top_n)
        .collect();

    CrossDocumentAnalysis {
        total_entities: entities.len(),
        cross_document_entities: entities.iter().filter(|e| e.is_cross_document()).count(),
        comparison_relationships,
        total_document_pairs: document_pairs.len(),
        document_pairs: document_pairs.into_iter().collect(),
        conflicts_by_type,
        most_conflicted,
    }
}

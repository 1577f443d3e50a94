//! Entity merging.
//!
//! Collapses a merge group into one canonical entity. The highest-salience
//! member wins identity; aliases and provenance from every member are kept,
//! and salience is recomputed from all members.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use tracing::info;

use kmap_core::{CanonicalizationConfig, Entity, KmapError, KmapResult};

static DOCUMENT_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\(appears in \d+ documents\)$").unwrap());

/// Result of merging one group.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The canonical entity.
    pub entity: Entity,
    /// Ids of members absorbed into the canonical entity (excluding its own).
    pub absorbed_ids: Vec<String>,
    /// Distinct documents across all merged spans.
    pub document_count: usize,
}

/// Entity merger.
pub struct EntityMerger {
    bonus_step: f32,
    bonus_cap: f32,
}

impl Default for EntityMerger {
    fn default() -> Self {
        Self::new(&CanonicalizationConfig::default())
    }
}

impl EntityMerger {
    /// Create a merger using the cross-document bonus settings of `config`.
    pub fn new(config: &CanonicalizationConfig) -> Self {
        Self {
            bonus_step: config.cross_doc_bonus_step,
            bonus_cap: config.cross_doc_bonus_cap,
        }
    }

    /// Merge a group into one canonical entity.
    ///
    /// A single-member group is returned unchanged. An empty group is a
    /// caller error.
    pub fn merge(&self, group: &[Entity]) -> KmapResult<Entity> {
        self.merge_with_outcome(group).map(|outcome| outcome.entity)
    }

    /// Merge a group, also reporting which ids were absorbed.
    pub fn merge_with_outcome(&self, group: &[Entity]) -> KmapResult<MergeOutcome> {
        let Some(first) = group.first() else {
            return Err(KmapError::EmptyMergeGroup);
        };

        if group.len() == 1 {
            return Ok(MergeOutcome {
                entity: first.clone(),
                absorbed_ids: Vec::new(),
                document_count: first.document_count(),
            });
        }

        if let Some(other) = group.iter().find(|e| e.entity_type != first.entity_type) {
            return Err(KmapError::merge(format!(
                "Cannot merge '{}' ({}) with '{}' ({})",
                first.name, first.entity_type, other.name, other.entity_type
            )));
        }

        let primary_index = primary_index(group);
        let primary = &group[primary_index];
        let others = group
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != primary_index)
            .map(|(_, e)| e);

        let aliases = merge_aliases(primary, group, primary_index);

        let source_spans: Vec<_> = primary
            .source_spans
            .iter()
            .chain(others.clone().flat_map(|e| e.source_spans.iter()))
            .cloned()
            .collect();

        let document_count = source_spans
            .iter()
            .map(|s| s.doc_id.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        let salience = self.merged_salience(group, document_count)?;

        let summary = if document_count > 1 {
            let base = DOCUMENT_SUFFIX.replace(&primary.summary, "");
            format!("{} (appears in {} documents)", base, document_count)
                .trim_start()
                .to_string()
        } else {
            primary.summary.clone()
        };

        let created_at = group
            .iter()
            .map(|e| e.created_at)
            .min()
            .unwrap_or(primary.created_at);

        let absorbed_ids: Vec<String> = others
            .filter(|e| e.id != primary.id)
            .map(|e| e.id.clone())
            .collect();

        let entity = Entity {
            id: primary.id.clone(),
            name: primary.name.clone(),
            entity_type: primary.entity_type,
            aliases,
            embedding: primary.embedding.clone(),
            salience,
            source_spans,
            summary,
            created_at,
            updated_at: Utc::now(),
        };

        info!(
            "Merged {} entities into '{}' (salience: {:.3}, aliases: {}, documents: {}, spans: {})",
            group.len(),
            entity.name,
            entity.salience,
            entity.aliases.len(),
            document_count,
            entity.source_spans.len()
        );

        Ok(MergeOutcome {
            entity,
            absorbed_ids,
            document_count,
        })
    }

    /// Span-weighted mean salience plus the cross-document bonus, in [0, 1].
    fn merged_salience(&self, group: &[Entity], document_count: usize) -> KmapResult<f32> {
        let (weighted, total_weight) = group.iter().fold((0.0f64, 0.0f64), |(w, t), e| {
            let weight = e.source_spans.len().max(1) as f64;
            (w + weight * e.salience as f64, t + weight)
        });
        let base = (weighted / total_weight) as f32;

        let bonus = (document_count.saturating_sub(1) as f32 * self.bonus_step).min(self.bonus_cap);
        let salience = base + bonus.max(0.0);

        if !salience.is_finite() {
            return Err(KmapError::merge(format!(
                "Merged salience for '{}' is not finite",
                group[0].name
            )));
        }
        Ok(salience.clamp(0.0, 1.0))
    }
}

/// Highest salience wins; ties go to the earliest member.
fn primary_index(group: &[Entity]) -> usize {
    let mut best = 0;
    for (i, entity) in group.iter().enumerate().skip(1) {
        if entity.salience > group[best].salience {
            best = i;
        }
    }
    best
}

fn merge_aliases(primary: &Entity, group: &[Entity], primary_index: usize) -> Vec<String> {
    let primary_key = primary.name.to_lowercase();
    let mut seen: HashSet<String> = HashSet::new();
    let mut aliases: Vec<String> = Vec::new();

    let candidates = primary.aliases.iter().chain(
        group
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != primary_index)
            .flat_map(|(_, e)| std::iter::once(&e.name).chain(e.aliases.iter())),
    );

    for alias in candidates {
        let alias = alias.trim();
        let key = alias.to_lowercase();
        if alias.is_empty() || key == primary_key || !seen.insert(key) {
            continue;
        }
        aliases.push(alias.to_string());
    }

    aliases.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));
    aliases
}

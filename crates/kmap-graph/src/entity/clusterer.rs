//! Merge-candidate clustering.
//!
//! Groups one type bucket of entities into merge groups. By default each
//! group is built around a seed: candidates join when they match the seed,
//! never because they match another member. This is intentionally not a
//! transitive closure; `ClusteringMode::TransitiveClosure` is the opt-in
//! alternative.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use kmap_core::{
    CanonicalizationConfig, ClusteringMode, Entity, SimilarEntity, SimilaritySearch,
};

use crate::similarity::{cosine_similarity, is_alias_match_with_threshold};

/// Why two entities were (or were not) judged mergeable.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeReason {
    /// Embeddings are at least as similar as the threshold.
    VectorSimilarity(f32),
    /// Names, aliases or acronyms match.
    AliasMatch,
    /// Joined through another member (transitive mode only).
    Transitive,
    /// Types differ; never merged.
    DifferentTypes,
    /// No signal fired.
    NoMatch,
}

impl fmt::Display for MergeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VectorSimilarity(score) => write!(f, "vector similarity: {:.3}", score),
            Self::AliasMatch => write!(f, "alias/acronym match"),
            Self::Transitive => write!(f, "transitive match"),
            Self::DifferentTypes => write!(f, "different entity types"),
            Self::NoMatch => write!(f, "no match criteria met"),
        }
    }
}

/// Outcome of a pairwise merge check.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeDecision {
    /// Whether the pair should merge.
    pub merge: bool,
    /// The signal that decided it.
    pub reason: MergeReason,
}

impl MergeDecision {
    fn accept(reason: MergeReason) -> Self {
        Self {
            merge: true,
            reason,
        }
    }

    fn reject(reason: MergeReason) -> Self {
        Self {
            merge: false,
            reason,
        }
    }
}

/// A cluster of entities to be merged into one.
///
/// Indices refer to the bucket slice passed to [`EntityClusterer::cluster`].
/// `external` holds stored entities from the similarity index that matched
/// the seed.
#[derive(Debug, Clone)]
pub struct MergeGroup {
    /// Bucket index of the seed.
    pub seed_index: usize,
    /// Bucket indices of all batch members, seed first.
    pub member_indices: Vec<usize>,
    /// Matching entities found in the similarity index.
    pub external: Vec<SimilarEntity>,
    /// Reason each non-seed member joined, in member order (batch, then external).
    pub reasons: Vec<MergeReason>,
}

impl MergeGroup {
    fn seeded(seed_index: usize) -> Self {
        Self {
            seed_index,
            member_indices: vec![seed_index],
            external: Vec::new(),
            reasons: Vec::new(),
        }
    }

    /// Total members, batch and external.
    pub fn len(&self) -> usize {
        self.member_indices.len() + self.external.len()
    }

    /// Always false: a group holds at least its seed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the group is just its seed.
    pub fn is_singleton(&self) -> bool {
        self.len() == 1
    }

    /// Clone the members out of `bucket`, batch members first.
    pub fn members(&self, bucket: &[Entity]) -> Vec<Entity> {
        self.member_indices
            .iter()
            .map(|&i| bucket[i].clone())
            .chain(self.external.iter().map(|s| s.entity.clone()))
            .collect()
    }
}

/// Builds merge groups for a bucket of same-typed entities.
pub struct EntityClusterer {
    config: CanonicalizationConfig,
    search: Option<Arc<dyn SimilaritySearch>>,
}

impl EntityClusterer {
    /// Create a new clusterer. Without a search collaborator only in-batch
    /// matching is performed.
    pub fn new(
        config: CanonicalizationConfig,
        search: Option<Arc<dyn SimilaritySearch>>,
    ) -> Self {
        Self { config, search }
    }

    /// Get the config.
    pub fn config(&self) -> &CanonicalizationConfig {
        &self.config
    }

    /// Decide whether two entities should merge.
    pub fn should_merge(&self, e1: &Entity, e2: &Entity) -> MergeDecision {
        if e1.entity_type != e2.entity_type {
            return MergeDecision::reject(MergeReason::DifferentTypes);
        }

        if e1.has_embedding() && e2.has_embedding() {
            let similarity = cosine_similarity(
                e1.embedding.as_deref().unwrap_or_default(),
                e2.embedding.as_deref().unwrap_or_default(),
            );
            if similarity >= self.config.similarity_threshold {
                return MergeDecision::accept(MergeReason::VectorSimilarity(similarity));
            }
        }

        if is_alias_match_with_threshold(
            &e1.name,
            &e1.aliases,
            &e2.name,
            &e2.aliases,
            self.config.lexical_match_threshold,
        ) {
            return MergeDecision::accept(MergeReason::AliasMatch);
        }

        MergeDecision::reject(MergeReason::NoMatch)
    }

    /// Cluster one bucket of same-typed entities, preserving input order.
    ///
    /// Similarity index lookups run for every seed with an embedding, at most
    /// `lookup_concurrency` at a time. Results come back in seed order, so the
    /// grouping is the same as with sequential lookups.
    pub async fn cluster(&self, bucket: &[Entity]) -> Vec<MergeGroup> {
        let mut groups = match self.config.clustering_mode {
            ClusteringMode::SeedOnly => self.group_by_seed(bucket),
            ClusteringMode::TransitiveClosure => self.group_transitively(bucket),
        };

        if self.search.is_some() {
            let candidates: Vec<Vec<SimilarEntity>> = stream::iter(
                groups.iter().map(|g| self.lookup(&bucket[g.seed_index])),
            )
            .buffered(self.config.lookup_concurrency.max(1))
            .collect()
            .await;

            self.attach_external(bucket, &mut groups, candidates);
        }

        groups
    }

    fn group_by_seed(&self, bucket: &[Entity]) -> Vec<MergeGroup> {
        let mut grouped = vec![false; bucket.len()];
        let mut groups = Vec::new();

        for (i, seed) in bucket.iter().enumerate() {
            if grouped[i] {
                continue;
            }
            grouped[i] = true;
            let mut group = MergeGroup::seeded(i);

            for (j, candidate) in bucket.iter().enumerate().skip(i + 1) {
                if grouped[j] {
                    continue;
                }
                let decision = self.should_merge(seed, candidate);
                if decision.merge {
                    debug!(
                        "Grouping '{}' with '{}': {}",
                        seed.name, candidate.name, decision.reason
                    );
                    grouped[j] = true;
                    group.member_indices.push(j);
                    group.reasons.push(decision.reason);
                }
            }

            groups.push(group);
        }

        groups
    }

    fn group_transitively(&self, bucket: &[Entity]) -> Vec<MergeGroup> {
        let mut parent: Vec<usize> = (0..bucket.len()).collect();

        for i in 0..bucket.len() {
            for j in (i + 1)..bucket.len() {
                if self.should_merge(&bucket[i], &bucket[j]).merge {
                    union(&mut parent, i, j);
                }
            }
        }

        let mut groups: Vec<MergeGroup> = Vec::new();
        let mut group_of_root: Vec<Option<usize>> = vec![None; bucket.len()];

        for i in 0..bucket.len() {
            let root = find(&mut parent, i);
            match group_of_root[root] {
                Some(g) => {
                    let group = &mut groups[g];
                    let decision = self.should_merge(&bucket[group.seed_index], &bucket[i]);
                    let reason = if decision.merge {
                        decision.reason
                    } else {
                        MergeReason::Transitive
                    };
                    debug!(
                        "Grouping '{}' with '{}': {}",
                        bucket[group.seed_index].name, bucket[i].name, reason
                    );
                    group.member_indices.push(i);
                    group.reasons.push(reason);
                }
                None => {
                    group_of_root[root] = Some(groups.len());
                    groups.push(MergeGroup::seeded(i));
                }
            }
        }

        groups
    }

    async fn lookup(&self, entity: &Entity) -> Vec<SimilarEntity> {
        if !entity.has_embedding() {
            return Vec::new();
        }
        let (Some(search), Some(embedding)) = (&self.search, &entity.embedding) else {
            return Vec::new();
        };

        match search
            .find_similar(
                embedding,
                Some(entity.entity_type),
                self.config.search_top_k,
                self.config.search_score_threshold,
            )
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!(
                    "Similarity search failed for '{}' ({}), using alias matching only: {}",
                    entity.name, entity.id, e
                );
                Vec::new()
            }
        }
    }

    fn attach_external(
        &self,
        bucket: &[Entity],
        groups: &mut [MergeGroup],
        candidates: Vec<Vec<SimilarEntity>>,
    ) {
        let batch_ids: HashSet<&str> = bucket.iter().map(|e| e.id.as_str()).collect();
        let mut absorbed: HashSet<String> = HashSet::new();

        for (group, results) in groups.iter_mut().zip(candidates) {
            let seed = &bucket[group.seed_index];
            for candidate in results {
                let id = candidate.entity.id.as_str();
                if batch_ids.contains(id) || absorbed.contains(id) {
                    continue;
                }
                let decision = self.should_merge(seed, &candidate.entity);
                if decision.merge {
                    debug!(
                        "Grouping '{}' with stored '{}' (score {:.3}): {}",
                        seed.name, candidate.entity.name, candidate.score, decision.reason
                    );
                    absorbed.insert(candidate.entity.id.clone());
                    group.reasons.push(decision.reason);
                    group.external.push(candidate);
                }
            }
        }
    }
}

fn find(parent: &mut [usize], i: usize) -> usize {
    let mut root = i;
    while parent[root] != root {
        root = parent[root];
    }
    let mut node = i;
    while parent[node] != root {
        let next = parent[node];
        parent[node] = root;
        node = next;
    }
    root
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        // Lower index stays root so components are seeded by first appearance
        let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[child] = root;
    }
}

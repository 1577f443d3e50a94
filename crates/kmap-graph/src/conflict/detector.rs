//! Conflict detector.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info, warn};

use kmap_core::types::truncate_chars;
use kmap_core::{ConflictConfig, Entity, EntityType, Evidence, KmapResult, Relationship};

use super::analysis::{self, CrossDocumentAnalysis};
use crate::similarity::lexical_similarity;

/// A disagreement between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conflict {
    /// Names differ but are lexically close.
    NameVariation { name1: String, name2: String },
    /// Saliences are far apart.
    SalienceDifference { salience1: f32, salience2: f32 },
    /// Both have substantial summaries that say different things.
    SummaryDifference,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameVariation { name1, name2 } => {
                write!(f, "Name variation: '{}' vs '{}'", name1, name2)
            }
            Self::SalienceDifference {
                salience1,
                salience2,
            } => write!(f, "Salience difference: {:.2} vs {:.2}", salience1, salience2),
            Self::SummaryDifference => write!(f, "Summary difference: different descriptions"),
        }
    }
}

/// Outcome of a pairwise comparison check.
#[derive(Debug, Clone, PartialEq)]
pub struct CompareDecision {
    pub compare: bool,
    pub reason: String,
    pub conflicts: Vec<Conflict>,
}

impl CompareDecision {
    fn reject(reason: impl Into<String>, conflicts: Vec<Conflict>) -> Self {
        Self {
            compare: false,
            reason: reason.into(),
            conflicts,
        }
    }
}

/// Two entities judged worth comparing.
#[derive(Debug, Clone)]
pub struct ConflictPair {
    pub first: Entity,
    pub second: Entity,
    pub reason: String,
    pub conflicts: Vec<Conflict>,
}

/// Detects conflicting cross-document entities.
#[derive(Default)]
pub struct ConflictDetector {
    config: ConflictConfig,
}

impl ConflictDetector {
    /// Create a detector with validated thresholds.
    pub fn new(config: ConflictConfig) -> KmapResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the config.
    pub fn config(&self) -> &ConflictConfig {
        &self.config
    }

    /// List the ways two entities disagree.
    pub fn extract_conflicts(&self, e1: &Entity, e2: &Entity) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        let name1 = e1.name.to_lowercase();
        let name2 = e2.name.to_lowercase();
        if name1 != name2
            && lexical_similarity(&name1, &name2) > self.config.name_similarity_threshold
        {
            conflicts.push(Conflict::NameVariation {
                name1: e1.name.clone(),
                name2: e2.name.clone(),
            });
        }

        if (e1.salience - e2.salience).abs() > self.config.salience_gap {
            conflicts.push(Conflict::SalienceDifference {
                salience1: e1.salience,
                salience2: e2.salience,
            });
        }

        let min_len = self.config.min_summary_len;
        if e1.summary.chars().count() > min_len
            && e2.summary.chars().count() > min_len
            && lexical_similarity(&e1.summary.to_lowercase(), &e2.summary.to_lowercase())
                < self.config.summary_similarity
        {
            conflicts.push(Conflict::SummaryDifference);
        }

        conflicts
    }

    /// Decide whether two entities deserve a comparison edge.
    ///
    /// Only entities from disjoint, non-empty document sets are compared.
    /// Sharing any document means they are the same cross-document entity.
    pub fn should_compare(&self, e1: &Entity, e2: &Entity) -> CompareDecision {
        if e1.entity_type != e2.entity_type {
            return CompareDecision::reject("Different entity types", Vec::new());
        }

        let docs1 = e1.document_ids();
        let docs2 = e2.document_ids();
        if docs1.is_empty() || docs2.is_empty() {
            return CompareDecision::reject("Missing document provenance", Vec::new());
        }
        if !docs1.is_disjoint(&docs2) {
            return CompareDecision::reject("Overlapping document sources", Vec::new());
        }

        let conflicts = self.extract_conflicts(e1, e2);
        if conflicts.is_empty() {
            return CompareDecision::reject("No conflicting attributes found", conflicts);
        }

        let similarity = lexical_similarity(&e1.name.to_lowercase(), &e2.name.to_lowercase());

        if similarity >= self.config.strong_name_similarity {
            return CompareDecision {
                compare: true,
                reason: format!("Similar names with conflicts (similarity: {:.2})", similarity),
                conflicts,
            };
        }
        if similarity > self.config.weak_name_similarity && conflicts.len() >= 2 {
            return CompareDecision {
                compare: true,
                reason: format!(
                    "Multiple conflicts with name overlap (similarity: {:.2})",
                    similarity
                ),
                conflicts,
            };
        }

        CompareDecision::reject("Insufficient similarity for comparison", conflicts)
    }

    /// Scan each type bucket pairwise for conflicting entities.
    pub fn detect_conflicts(&self, entities: &[Entity]) -> Vec<ConflictPair> {
        let mut by_type: BTreeMap<EntityType, Vec<&Entity>> = BTreeMap::new();
        for entity in entities {
            if let Err(e) = entity.validate() {
                warn!(
                    "Skipping invalid entity '{}' in conflict detection: {}",
                    entity.name, e
                );
                continue;
            }
            by_type.entry(entity.entity_type).or_default().push(entity);
        }

        let mut pairs = Vec::new();
        for (entity_type, bucket) in &by_type {
            debug!(
                "Analyzing conflicts for {} entities of type {}",
                bucket.len(),
                entity_type
            );

            for (i, first) in bucket.iter().enumerate() {
                for second in &bucket[i + 1..] {
                    if first.id == second.id {
                        warn!(
                            "Skipping comparison of '{}' with itself (duplicate id {})",
                            first.name, first.id
                        );
                        continue;
                    }

                    let decision = self.should_compare(first, second);
                    if decision.compare {
                        info!(
                            "Detected conflict: '{}' vs '{}' - {}",
                            first.name, second.name, decision.reason
                        );
                        pairs.push(ConflictPair {
                            first: (*first).clone(),
                            second: (*second).clone(),
                            reason: decision.reason,
                            conflicts: decision.conflicts,
                        });
                    }
                }
            }
        }

        pairs
    }

    /// Build two symmetric `compares_with` relationships per pair.
    pub fn create_comparison_relationships(&self, pairs: &[ConflictPair]) -> Vec<Relationship> {
        let mut relationships = Vec::with_capacity(pairs.len() * 2);

        for pair in pairs {
            let evidence: Vec<Evidence> = [(&pair.first, "Entity 1"), (&pair.second, "Entity 2")]
                .into_iter()
                .filter_map(|(entity, label)| self.evidence_for(entity, label))
                .collect();

            let confidence = self.config.comparison_confidence;
            let edges = Relationship::comparison(
                pair.first.id.as_str(),
                pair.second.id.as_str(),
                confidence,
                evidence.clone(),
            )
            .and_then(|forward| {
                Relationship::comparison(
                    pair.second.id.as_str(),
                    pair.first.id.as_str(),
                    confidence,
                    evidence,
                )
                .map(|backward| [forward, backward])
            });

            match edges {
                Ok(edges) => {
                    let summary: Vec<String> =
                        pair.conflicts.iter().take(2).map(|c| c.to_string()).collect();
                    info!(
                        "Created comparison relationship: '{}' <-> '{}' ({} conflicts: {})",
                        pair.first.name,
                        pair.second.name,
                        pair.conflicts.len(),
                        summary.join(", ")
                    );
                    relationships.extend(edges);
                }
                Err(e) => warn!(
                    "Skipping comparison '{}' <-> '{}': {}",
                    pair.first.name, pair.second.name, e
                ),
            }
        }

        relationships
    }

    fn evidence_for(&self, entity: &Entity, label: &str) -> Option<Evidence> {
        let span = entity.source_spans.first()?;
        let quote = format!("{}: {} - {}", label, entity.name, entity.summary);
        Some(Evidence::new(
            span.doc_id.as_str(),
            truncate_chars(&quote, self.config.evidence_quote_len),
            span.start,
        ))
    }

    /// Summarize cross-document structure and comparison edges.
    pub fn analyze_cross_document_patterns(
        &self,
        entities: &[Entity],
        relationships: &[Relationship],
    ) -> CrossDocumentAnalysis {
        analysis::analyze(entities, relationships, self.config.top_conflicted)
    }

    /// Detect conflicts, build comparison edges, and analyze them.
    pub fn detect_and_create_comparisons(
        &self,
        entities: &[Entity],
    ) -> (Vec<Relationship>, CrossDocumentAnalysis) {
        let pairs = self.detect_conflicts(entities);
        let relationships = self.create_comparison_relationships(&pairs);
        let analysis = self.analyze_cross_document_patterns(entities, &relationships);

        let documents: BTreeSet<&str> = entities.iter().flat_map(|e| e.document_ids()).collect();
        info!(
            "Conflict detection complete: {} pairs, {} comparison relationships across {} documents",
            pairs.len(),
            relationships.len(),
            documents.len()
        );

        (relationships, analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kmap_core::{RelationType, SourceSpan};

    fn entity(name: &str, salience: f32, doc: &str) -> Entity {
        Entity::new(name, EntityType::Library)
            .with_salience(salience)
            .with_span(SourceSpan::new(doc, 12, 12 + name.len()))
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        assert!(ConflictDetector::new(ConflictConfig::with_threshold(-0.1)).is_err());
    }

    #[test]
    fn test_conflict_display() {
        let name = Conflict::NameVariation {
            name1: "PyTorch".into(),
            name2: "Py Torch".into(),
        };
        assert_eq!(name.to_string(), "Name variation: 'PyTorch' vs 'Py Torch'");
        let salience = Conflict::SalienceDifference {
            salience1: 0.9,
            salience2: 0.5,
        };
        assert_eq!(salience.to_string(), "Salience difference: 0.90 vs 0.50");
        assert_eq!(
            Conflict::SummaryDifference.to_string(),
            "Summary difference: different descriptions"
        );
    }

    #[test]
    fn test_case_variants_compare_on_salience() {
        let detector = ConflictDetector::default();
        let a = entity("TensorFlow", 0.9, "doc-a");
        let b = entity("Tensorflow", 0.5, "doc-b");

        let decision = detector.should_compare(&a, &b);
        assert!(decision.compare);
        assert_eq!(decision.reason, "Similar names with conflicts (similarity: 1.00)");
        assert_eq!(
            decision.conflicts,
            vec![Conflict::SalienceDifference {
                salience1: 0.9,
                salience2: 0.5
            }]
        );
    }

    #[test]
    fn test_identical_entities_have_no_conflicts() {
        let detector = ConflictDetector::default();
        let a = entity("Kubernetes", 0.6, "d1").with_summary("Container orchestration");
        let b = entity("Kubernetes", 0.6, "d2").with_summary("Container orchestration");

        assert!(detector.extract_conflicts(&a, &b).is_empty());
        let decision = detector.should_compare(&a, &b);
        assert!(!decision.compare);
        assert_eq!(decision.reason, "No conflicting attributes found");
    }

    #[test]
    fn test_shared_document_is_not_a_conflict() {
        let detector = ConflictDetector::default();
        let a = entity("Pandas", 0.9, "d1").with_span(SourceSpan::new("d2", 0, 6));
        let b = entity("pandas", 0.1, "d2");
        let decision = detector.should_compare(&a, &b);
        assert!(!decision.compare);
        assert_eq!(decision.reason, "Overlapping document sources");
    }

    #[test]
    fn test_requires_provenance_and_same_type() {
        let detector = ConflictDetector::default();
        let a = entity("Spark", 0.9, "d1");
        let no_spans = Entity::new("Spark", EntityType::Library).with_salience(0.1);
        assert!(!detector.should_compare(&a, &no_spans).compare);

        let other_type = Entity::new("Spark", EntityType::System)
            .with_salience(0.1)
            .with_span(SourceSpan::new("d2", 0, 5));
        let decision = detector.should_compare(&a, &other_type);
        assert!(!decision.compare);
        assert_eq!(decision.reason, "Different entity types");
    }

    #[test]
    fn test_name_variation() {
        let detector = ConflictDetector::default();
        let a = entity("Scikit-learn", 0.5, "d1");
        let b = entity("Scikit learn", 0.5, "d2");
        let conflicts = detector.extract_conflicts(&a, &b);
        assert_eq!(
            conflicts,
            vec![Conflict::NameVariation {
                name1: "Scikit-learn".into(),
                name2: "Scikit learn".into()
            }]
        );
        assert!(detector.should_compare(&a, &b).compare);
    }

    #[test]
    fn test_summary_difference_needs_substantial_summaries() {
        let detector = ConflictDetector::default();
        let a = entity("Redis", 0.5, "d1").with_summary("In-memory key-value store");
        let b = entity("Redis", 0.5, "d2").with_summary("Horizontal sharding across many nodes");
        assert_eq!(
            detector.extract_conflicts(&a, &b),
            vec![Conflict::SummaryDifference]
        );

        let short = entity("Redis", 0.5, "d2").with_summary("A cache");
        assert!(detector.extract_conflicts(&a, &short).is_empty());
    }

    #[test]
    fn test_name_variation_within_longer_name() {
        let detector = ConflictDetector::default();
        let a = Entity::new("BERT", EntityType::Concept).with_span(SourceSpan::new("d1", 0, 4));
        let b = Entity::new("RoBERTa", EntityType::Concept).with_span(SourceSpan::new("d2", 0, 7));

        assert_eq!(
            detector.extract_conflicts(&a, &b),
            vec![Conflict::NameVariation {
                name1: "BERT".into(),
                name2: "RoBERTa".into()
            }]
        );
        let decision = detector.should_compare(&a, &b);
        assert!(decision.compare);
        assert_eq!(decision.reason, "Similar names with conflicts (similarity: 0.73)");
    }

    #[test]
    fn test_prefix_name_reaches_strong_tier() {
        let detector = ConflictDetector::default();
        let a = entity("Redis", 0.9, "d1").with_summary("In-memory key-value store");
        let b = entity("Redis Cluster", 0.4, "d2").with_summary("In-memory key-value store");

        let decision = detector.should_compare(&a, &b);
        assert!(decision.compare);
        assert_eq!(decision.reason, "Similar names with conflicts (similarity: 0.56)");
        assert_eq!(
            decision.conflicts,
            vec![Conflict::SalienceDifference {
                salience1: 0.9,
                salience2: 0.4
            }]
        );
    }

    #[test]
    fn test_weak_name_tier_needs_two_conflicts() {
        let detector = ConflictDetector::default();
        let a = entity("Redis", 0.9, "d1").with_summary("In-memory key-value store");
        let b = entity("Redis Enterprise", 0.4, "d2")
            .with_summary("Horizontal sharding across many nodes");

        let decision = detector.should_compare(&a, &b);
        assert!(decision.compare);
        assert_eq!(decision.conflicts.len(), 2);
        assert_eq!(
            decision.reason,
            "Multiple conflicts with name overlap (similarity: 0.48)"
        );

        let c = entity("Redis Enterprise", 0.4, "d2").with_summary("In-memory key-value store");
        let decision = detector.should_compare(&a, &c);
        assert!(!decision.compare);
        assert_eq!(decision.reason, "Insufficient similarity for comparison");
        assert_eq!(decision.conflicts.len(), 1);
    }

    #[test]
    fn test_comparison_relationships_are_symmetric() {
        let detector = ConflictDetector::default();
        let a = entity("TensorFlow", 0.9, "doc-a").with_summary("Deep learning framework");
        let b = entity("Tensorflow", 0.5, "doc-b");

        let pairs = detector.detect_conflicts(&[a.clone(), b.clone()]);
        assert_eq!(pairs.len(), 1);

        let rels = detector.create_comparison_relationships(&pairs);
        assert_eq!(rels.len(), 2);
        assert_eq!(
            (rels[0].from_entity.as_str(), rels[0].to_entity.as_str()),
            (a.id.as_str(), b.id.as_str())
        );
        assert_eq!(
            (rels[1].from_entity.as_str(), rels[1].to_entity.as_str()),
            (b.id.as_str(), a.id.as_str())
        );
        for rel in &rels {
            assert_eq!(rel.predicate, RelationType::ComparesWith);
            assert!((rel.confidence - 0.8).abs() < 1e-6);
            assert!(!rel.directional);
            assert_eq!(rel.evidence.len(), 2);
        }

        let evidence = &rels[0].evidence;
        assert_eq!(evidence[0].doc_id, "doc-a");
        assert_eq!(evidence[0].offset, 12);
        assert_eq!(evidence[0].quote, "Entity 1: TensorFlow - Deep learning framework");
        assert_eq!(evidence[1].quote, "Entity 2: Tensorflow - ");
    }

    #[test]
    fn test_evidence_quote_is_truncated() {
        let detector = ConflictDetector::default();
        let a = entity("Spark", 0.9, "d1").with_summary("x".repeat(250));
        let b = entity("spark", 0.1, "d2");
        let rels = detector.create_comparison_relationships(&detector.detect_conflicts(&[a, b]));
        assert_eq!(rels[0].evidence[0].quote.chars().count(), 100);
    }

    #[test]
    fn test_detect_skips_duplicate_ids_and_invalid_entities() {
        let detector = ConflictDetector::default();
        let a = entity("Spark", 0.9, "d1");
        let dup = entity("Spark", 0.1, "d2");
        let mut broken = entity("spark", 0.1, "d3");
        broken.name = "  ".into();

        assert!(detector.detect_conflicts(&[a, dup, broken]).is_empty());
    }
}

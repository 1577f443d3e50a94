//! Integration tests for batch reconciliation.
//!
//! Exercises canonicalization and conflict detection together, with and
//! without a similarity index.

use async_trait::async_trait;
use mockall::mock;
use std::collections::HashSet;
use std::sync::Arc;

use kmap_core::{CanonicalizationConfig, ClusteringMode, KmapResult, RelationType, SourceSpan};
use kmap_graph::{
    Canonicalizer, ConflictDetector, Entity, EntityType, InMemorySimilaritySearch, KmapError,
    MergeReason, SimilarEntity, SimilaritySearch,
};

mock! {
    pub Search {}

    #[async_trait]
    impl SimilaritySearch for Search {
        async fn find_similar(
            &self,
            vector: &[f32],
            type_filter: Option<EntityType>,
            top_k: usize,
            score_threshold: f32,
        ) -> KmapResult<Vec<SimilarEntity>>;
    }
}

fn mention(name: &str, entity_type: EntityType, salience: f32, doc: &str) -> Entity {
    Entity::new(name, entity_type)
        .with_salience(salience)
        .with_span(SourceSpan::new(doc, 0, name.len()))
}

fn canonicalizer() -> Canonicalizer {
    Canonicalizer::new(CanonicalizationConfig::default(), None).unwrap()
}

/// A batch without mergeable pairs comes back unchanged and in order.
#[tokio::test]
async fn test_canonicalize_is_identity_without_duplicates() {
    let batch = vec![
        mention("PyTorch", EntityType::Library, 0.8, "d1"),
        mention("Geoffrey Hinton", EntityType::Person, 0.7, "d1"),
        mention("Kubernetes", EntityType::System, 0.5, "d2"),
        mention("ImageNet", EntityType::Paper, 0.6, "d2"),
        mention("Backpropagation", EntityType::Concept, 0.9, "d3"),
        mention("Top-1 Accuracy", EntityType::Metric, 0.4, "d3"),
    ];

    let canonical = canonicalizer().canonicalize(batch.clone()).await;
    assert_eq!(canonical, batch);

    // Running again on the output changes nothing either
    let again = canonicalizer().canonicalize(canonical.clone()).await;
    assert_eq!(again, canonical);
}

/// Output length equals input length minus (size - 1) for every merged group.
#[tokio::test]
async fn test_merge_count_invariant() {
    let batch = vec![
        mention("Natural Language Processing", EntityType::Concept, 0.9, "d1"),
        mention("NLP", EntityType::Concept, 0.6, "d2"),
        mention("Natural language processing", EntityType::Concept, 0.5, "d3"),
        mention("Reinforcement Learning", EntityType::Concept, 0.7, "d1"),
        mention("RL", EntityType::Concept, 0.3, "d2"),
        mention("Hugging Face", EntityType::Organization, 0.8, "d1"),
    ];

    let c = canonicalizer();
    let canonical = c.canonicalize(batch.clone()).await;

    // groups: {NLP x3}, {RL x2}, {Hugging Face}
    assert_eq!(canonical.len(), batch.len() - (3 - 1) - (2 - 1));

    let stats = c.merge_statistics(&batch, &canonical);
    assert_eq!(stats.merged_count, 3);
    assert_eq!(stats.by_type[&EntityType::Concept].merged, 3);
    assert_eq!(stats.cross_document.entities_spanning_multiple_docs, 2);
    assert_eq!(stats.cross_document.max_docs_per_entity, 3);
}

/// Merged aliases keep every member's aliases and every non-primary name.
#[tokio::test]
async fn test_merged_aliases_are_a_superset() {
    let batch = vec![
        mention("Convolutional Neural Network", EntityType::Concept, 0.9, "d1")
            .with_aliases(["ConvNet"]),
        mention("CNN", EntityType::Concept, 0.5, "d2").with_aliases(["Conv Net", "CNNs"]),
    ];

    let canonical = canonicalizer().canonicalize(batch).await;
    assert_eq!(canonical.len(), 1);

    let merged = &canonical[0];
    assert_eq!(merged.name, "Convolutional Neural Network");
    let aliases: HashSet<&str> = merged.aliases.iter().map(String::as_str).collect();
    for expected in ["ConvNet", "CNN", "Conv Net", "CNNs"] {
        assert!(aliases.contains(expected), "missing alias {expected}");
    }
}

/// Salience stays in [0, 1] whatever the member saliences and spread.
#[tokio::test]
async fn test_merged_salience_is_bounded() {
    for (s1, s2) in [(0.0, 0.0), (1.0, 1.0), (0.95, 1.0), (0.1, 0.99)] {
        let e1 = mention("Attention Mechanism", EntityType::Concept, s1, "d1")
            .with_span(SourceSpan::new("d4", 3, 9));
        let e2 = mention("attention mechanism", EntityType::Concept, s2, "d2")
            .with_span(SourceSpan::new("d3", 1, 2));

        let canonical = canonicalizer().canonicalize(vec![e1, e2]).await;
        assert_eq!(canonical.len(), 1);
        let salience = canonical[0].salience;
        assert!((0.0..=1.0).contains(&salience), "salience {salience} out of range");
    }
}

/// An alias-declared abbreviation merges into the full name.
#[tokio::test]
async fn test_abbreviation_merges_into_full_name() {
    let batch = vec![
        mention("Machine Learning", EntityType::Concept, 0.9, "doc-a").with_alias("ML"),
        mention("ML", EntityType::Concept, 0.7, "doc-b"),
    ];

    let canonical = canonicalizer().canonicalize(batch).await;
    assert_eq!(canonical.len(), 1);

    let merged = &canonical[0];
    assert_eq!(merged.name, "Machine Learning");
    assert!(merged.aliases.iter().any(|a| a == "ML"));
    assert!(merged.salience > 0.7 && merged.salience < 0.9 + 0.1);
    assert_eq!(merged.summary, "(appears in 2 documents)");
}

/// Seed-only grouping leaves the end of a similarity chain on its own.
#[tokio::test]
async fn test_chain_is_split_unless_transitive() {
    let chain = vec![
        mention("Alpha", EntityType::Concept, 0.5, "d1").with_embedding(vec![1.0, 0.0]),
        mention("Beta", EntityType::Concept, 0.5, "d2").with_embedding(vec![0.9, 0.435_889_9]),
        mention("Gamma", EntityType::Concept, 0.5, "d3").with_embedding(vec![0.62, 0.784_602]),
    ];

    let seed_only = canonicalizer().canonicalize(chain.clone()).await;
    assert_eq!(seed_only.len(), 2);
    assert_eq!(seed_only[1].name, "Gamma");

    let config = CanonicalizationConfig {
        clustering_mode: ClusteringMode::TransitiveClosure,
        ..Default::default()
    };
    let transitive = Canonicalizer::new(config, None)
        .unwrap()
        .canonicalize(chain)
        .await;
    assert_eq!(transitive.len(), 1);
    assert_eq!(transitive[0].document_count(), 3);
}

/// A failing index degrades to in-batch matching.
#[tokio::test]
async fn test_search_failure_falls_back_to_alias_matching() {
    let mut search = MockSearch::new();
    search
        .expect_find_similar()
        .times(2)
        .returning(|_, _, _, _| Err(KmapError::similarity_search("index offline")));

    let batch = vec![
        mention("Machine Learning", EntityType::Concept, 0.9, "d1")
            .with_alias("ML")
            .with_embedding(vec![1.0, 0.0]),
        mention("ML", EntityType::Concept, 0.7, "d2").with_embedding(vec![0.0, 1.0]),
        mention("Rust", EntityType::Concept, 0.4, "d2"),
        mention("Go", EntityType::Concept, 0.4, "d3").with_embedding(vec![0.5, 0.5]),
    ];

    let canonicalizer =
        Canonicalizer::new(CanonicalizationConfig::default(), Some(Arc::new(search))).unwrap();
    let canonical = canonicalizer.canonicalize(batch).await;

    let names: Vec<&str> = canonical.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Machine Learning", "Rust", "Go"]);
}

/// The index is queried with the seed's vector, type and configured limits.
#[tokio::test]
async fn test_search_receives_configured_query() {
    let mut search = MockSearch::new();
    search
        .expect_find_similar()
        .withf(|vector, type_filter, top_k, threshold| {
            vector.to_vec() == vec![0.6f32, 0.8]
                && *type_filter == Some(EntityType::Library)
                && *top_k == 20
                && (*threshold - 0.7).abs() < 1e-6
        })
        .times(1)
        .returning(|_, _, _, _| Ok(Vec::new()));

    let canonicalizer =
        Canonicalizer::new(CanonicalizationConfig::default(), Some(Arc::new(search))).unwrap();
    let entity = mention("JAX", EntityType::Library, 0.5, "d1").with_embedding(vec![0.6, 0.8]);
    let out = canonicalizer.canonicalize_entity(entity.clone()).await;
    assert_eq!(out, entity);
}

/// Entities canonicalized in an earlier batch absorb later mentions.
#[tokio::test]
async fn test_cross_batch_merge_through_index() {
    let index = Arc::new(InMemorySimilaritySearch::new());
    let canonicalizer =
        Canonicalizer::new(CanonicalizationConfig::default(), Some(index.clone())).unwrap();

    let first = canonicalizer
        .canonicalize(vec![mention(
            "Generative Pre-trained Transformer",
            EntityType::System,
            0.9,
            "d1",
        )
        .with_embedding(vec![0.9, 0.1, 0.0])
        .with_summary("Autoregressive language model")])
        .await;
    index.upsert_many(first.clone()).await;

    let second = canonicalizer
        .canonicalize(vec![
            mention("OpenAI GPT", EntityType::System, 0.6, "d2")
                .with_embedding(vec![0.88, 0.12, 0.0]),
            mention("Unrelated", EntityType::System, 0.6, "d2")
                .with_embedding(vec![0.0, 0.0, 1.0]),
        ])
        .await;

    assert_eq!(second.len(), 2);
    let merged = &second[0];
    assert_eq!(merged.id, first[0].id);
    assert_eq!(merged.name, "Generative Pre-trained Transformer");
    assert_eq!(merged.aliases, vec!["OpenAI GPT"]);
    assert_eq!(
        merged.summary,
        "Autoregressive language model (appears in 2 documents)"
    );
    assert_eq!(second[1].name, "Unrelated");

    let single = canonicalizer
        .canonicalize_entity(
            mention("GPT family", EntityType::System, 0.3, "d3")
                .with_embedding(vec![0.9, 0.11, 0.0]),
        )
        .await;
    assert_eq!(single.id, first[0].id);
    assert_eq!(single.document_count(), 2);
}

/// A batch entity already present in the index is not merged with itself.
#[tokio::test]
async fn test_index_self_match_is_skipped() {
    let stored = mention("Vector Database", EntityType::System, 0.8, "d1")
        .with_embedding(vec![0.0, 1.0]);
    let index = Arc::new(InMemorySimilaritySearch::with_entities([stored.clone()]));
    let canonicalizer =
        Canonicalizer::new(CanonicalizationConfig::default(), Some(index)).unwrap();

    let canonical = canonicalizer.canonicalize(vec![stored.clone()]).await;
    assert_eq!(canonical, vec![stored]);
}

/// Lookup concurrency does not change the outcome.
#[tokio::test]
async fn test_lookup_concurrency_is_deterministic() {
    let stored: Vec<Entity> = (0..6)
        .map(|i| {
            let angle = i as f32 * 0.25;
            mention(&format!("Stored {i}"), EntityType::Concept, 0.9, "prior")
                .with_embedding(vec![angle.cos(), angle.sin()])
        })
        .collect();
    let batch: Vec<Entity> = (0..6)
        .map(|i| {
            let angle = i as f32 * 0.25 + 0.01;
            mention(&format!("Mention {i}"), EntityType::Concept, 0.4, "new")
                .with_embedding(vec![angle.cos(), angle.sin()])
        })
        .collect();

    let mut outputs = Vec::new();
    for concurrency in [1, 8] {
        let index = Arc::new(InMemorySimilaritySearch::with_entities(stored.clone()));
        let config = CanonicalizationConfig {
            lookup_concurrency: concurrency,
            ..Default::default()
        };
        let canonical = Canonicalizer::new(config, Some(index))
            .unwrap()
            .canonicalize(batch.clone())
            .await;
        outputs.push(
            canonical
                .iter()
                .map(|e| (e.id.clone(), e.aliases.clone()))
                .collect::<Vec<_>>(),
        );
    }

    assert_eq!(outputs[0], outputs[1]);
}

/// Names equal after lowercasing are aliases, so case variants collapse.
#[tokio::test]
async fn test_case_variants_merge_during_canonicalization() {
    let a = mention("TensorFlow", EntityType::Library, 0.9, "doc-a");
    let b = mention("Tensorflow", EntityType::Library, 0.5, "doc-b");

    let c = canonicalizer();
    let decision = c.clusterer().should_merge(&a, &b);
    assert!(decision.merge);
    assert_eq!(decision.reason, MergeReason::AliasMatch);

    let canonical = c.canonicalize(vec![a.clone(), b]).await;
    assert_eq!(canonical.len(), 1);
    assert_eq!(canonical[0].id, a.id);
    assert_eq!(canonical[0].name, "TensorFlow");
    assert_eq!(canonical[0].document_ids().len(), 2);
    assert!(canonical[0].summary.ends_with("(appears in 2 documents)"));
}

/// Case variants from disjoint documents are compared when salience disagrees.
#[test]
fn test_case_variants_produce_one_comparison_pair() {
    let detector = ConflictDetector::default();
    let a = mention("TensorFlow", EntityType::Library, 0.9, "doc-a");
    let b = mention("Tensorflow", EntityType::Library, 0.5, "doc-b");

    assert!(detector.should_compare(&a, &b).compare);

    let (relationships, analysis) = detector.detect_and_create_comparisons(&[a.clone(), b.clone()]);
    assert_eq!(relationships.len(), 2);
    assert!(relationships
        .iter()
        .all(|r| (r.confidence - 0.8).abs() < 1e-6 && !r.directional));
    assert_eq!(analysis.comparison_relationships, 2);
    assert_eq!(
        analysis.document_pairs,
        vec![("doc-a".to_string(), "doc-b".to_string())]
    );
}

/// Every accepted pair yields a forward and a backward edge with equal confidence.
#[test]
fn test_comparison_edges_are_symmetric() {
    let detector = ConflictDetector::default();
    let entities = vec![
        mention("Scikit-learn", EntityType::Library, 0.9, "d1"),
        mention("Scikit learn", EntityType::Library, 0.4, "d2"),
        mention("scikit-learn", EntityType::Library, 0.2, "d3"),
        mention("Stanford", EntityType::Organization, 0.9, "d1"),
        mention("Stanford University", EntityType::Organization, 0.3, "d2"),
    ];

    let (relationships, analysis) = detector.detect_and_create_comparisons(&entities);
    assert!(!relationships.is_empty());
    assert_eq!(relationships.len() % 2, 0);

    for pair in relationships.chunks(2) {
        let (forward, backward) = (&pair[0], &pair[1]);
        assert_eq!(forward.from_entity, backward.to_entity);
        assert_eq!(forward.to_entity, backward.from_entity);
        assert_eq!(forward.confidence, backward.confidence);
        assert_eq!(forward.predicate, RelationType::ComparesWith);
        assert!(!forward.directional && !backward.directional);
    }
    assert_eq!(analysis.comparison_relationships, relationships.len());
}

/// Identical entities in disjoint documents are not conflicts.
#[test]
fn test_identical_entities_produce_no_comparisons() {
    let detector = ConflictDetector::default();
    let a = mention("Transformer", EntityType::Concept, 0.7, "d1")
        .with_summary("Attention-based sequence model");
    let b = mention("Transformer", EntityType::Concept, 0.7, "d2")
        .with_summary("Attention-based sequence model");

    assert!(detector.extract_conflicts(&a, &b).is_empty());
    let (relationships, analysis) = detector.detect_and_create_comparisons(&[a, b]);
    assert!(relationships.is_empty());
    assert_eq!(analysis.total_entities, 2);
    assert!(analysis.most_conflicted.is_empty());
}

/// Canonicalization then conflict detection over a multi-document batch.
#[tokio::test]
async fn test_reconcile_pipeline() {
    let batch = vec![
        mention("Machine Learning", EntityType::Concept, 0.9, "paper-1").with_alias("ML"),
        mention("ML", EntityType::Concept, 0.6, "paper-2"),
        mention("PyTorch", EntityType::Library, 0.9, "paper-1")
            .with_summary("Deep learning framework from Meta"),
        mention("Pytorch Lightning", EntityType::Library, 0.3, "paper-3")
            .with_summary("High level training loop wrapper"),
    ];

    let c = canonicalizer();
    let canonical = c.canonicalize(batch.clone()).await;
    assert_eq!(canonical.len(), 3);
    assert_eq!(c.cross_document_entities(&canonical).len(), 1);

    let detector = ConflictDetector::default();
    let (relationships, analysis) = detector.detect_and_create_comparisons(&canonical);

    assert_eq!(analysis.total_entities, 3);
    assert_eq!(analysis.cross_document_entities, 1);
    assert_eq!(relationships.len(), 2);
    assert_eq!(analysis.conflicts_by_type[&EntityType::Library], 2);
    assert_eq!(analysis.most_conflicted.len(), 2);
    assert_eq!(analysis.most_conflicted[0].entity_name, "PyTorch");
}

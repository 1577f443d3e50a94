//! Configuration system for kmap.
//!
//! Every threshold the reconciliation passes use is a named value here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{KmapError, KmapResult};

/// How merge groups are formed within a type bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClusteringMode {
    /// Candidates are tested against the group's seed only. Not transitive:
    /// A~B and B~C does not put C with A unless A~C.
    #[default]
    SeedOnly,
    /// Connected components of the pairwise merge relation (union-find).
    /// Changes grouping relative to `SeedOnly` and must be opted into.
    TransitiveClosure,
}

/// Thresholds for canonicalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalizationConfig {
    /// Minimum embedding cosine similarity for a merge.
    /// Default: 0.86
    pub similarity_threshold: f32,
    /// Minimum lexical similarity between normalized names/aliases for an
    /// alias match. Default: 0.9
    pub lexical_match_threshold: f32,
    /// Candidates requested from the similarity index per seed. Default: 20
    pub search_top_k: usize,
    /// Minimum score for index candidates before merge checks. Default: 0.7
    pub search_score_threshold: f32,
    /// Maximum in-flight similarity index lookups. Default: 4
    pub lookup_concurrency: usize,
    /// Salience bonus per additional source document. Default: 0.05
    pub cross_doc_bonus_step: f32,
    /// Upper bound on the cross-document salience bonus. Default: 0.1
    pub cross_doc_bonus_cap: f32,
    /// Grouping policy. Default: seed-only.
    pub clustering_mode: ClusteringMode,
}

impl Default for CanonicalizationConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.86,
            lexical_match_threshold: 0.9,
            search_top_k: 20,
            search_score_threshold: 0.7,
            lookup_concurrency: 4,
            cross_doc_bonus_step: 0.05,
            cross_doc_bonus_cap: 0.1,
            clustering_mode: ClusteringMode::SeedOnly,
        }
    }
}

impl CanonicalizationConfig {
    /// Create a config with a custom vector similarity threshold.
    pub fn with_threshold(similarity_threshold: f32) -> Self {
        Self {
            similarity_threshold,
            ..Default::default()
        }
    }

    /// Validate configuration values are in valid ranges.
    pub fn validate(&self) -> KmapResult<()> {
        check_unit("similarity_threshold", self.similarity_threshold)?;
        check_unit("lexical_match_threshold", self.lexical_match_threshold)?;
        check_unit("search_score_threshold", self.search_score_threshold)?;
        check_unit("cross_doc_bonus_step", self.cross_doc_bonus_step)?;
        check_unit("cross_doc_bonus_cap", self.cross_doc_bonus_cap)?;
        if self.lookup_concurrency == 0 {
            return Err(KmapError::configuration(
                "lookup_concurrency must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Thresholds for conflict detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictConfig {
    /// Name similarity above which differing names count as a variation.
    /// Default: 0.7
    pub name_similarity_threshold: f32,
    /// Salience gap above which saliences disagree. Default: 0.3
    pub salience_gap: f32,
    /// Summary similarity below which summaries disagree. Default: 0.5
    pub summary_similarity: f32,
    /// Summaries must be longer than this (chars) to be compared. Default: 10
    pub min_summary_len: usize,
    /// Name similarity needed with one conflict. Default: 0.5 (inclusive)
    pub strong_name_similarity: f32,
    /// Name similarity needed with two or more conflicts. Default: 0.3 (exclusive)
    pub weak_name_similarity: f32,
    /// Confidence assigned to synthesized comparison edges. Default: 0.8
    pub comparison_confidence: f32,
    /// Maximum evidence quote length on comparison edges. Default: 100
    pub evidence_quote_len: usize,
    /// Number of entities listed as most conflicted. Default: 5
    pub top_conflicted: usize,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            name_similarity_threshold: 0.7,
            salience_gap: 0.3,
            summary_similarity: 0.5,
            min_summary_len: 10,
            strong_name_similarity: 0.5,
            weak_name_similarity: 0.3,
            comparison_confidence: 0.8,
            evidence_quote_len: 100,
            top_conflicted: 5,
        }
    }
}

impl ConflictConfig {
    /// Create a config with a custom name similarity threshold.
    pub fn with_threshold(name_similarity_threshold: f32) -> Self {
        Self {
            name_similarity_threshold,
            ..Default::default()
        }
    }

    /// Validate configuration values are in valid ranges.
    pub fn validate(&self) -> KmapResult<()> {
        check_unit("name_similarity_threshold", self.name_similarity_threshold)?;
        check_unit("salience_gap", self.salience_gap)?;
        check_unit("summary_similarity", self.summary_similarity)?;
        check_unit("strong_name_similarity", self.strong_name_similarity)?;
        check_unit("weak_name_similarity", self.weak_name_similarity)?;
        check_unit("comparison_confidence", self.comparison_confidence)?;
        Ok(())
    }
}

/// Top-level reconciliation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Canonicalization thresholds.
    pub canonicalization: CanonicalizationConfig,
    /// Conflict detection thresholds.
    pub conflict: ConflictConfig,
}

impl ReconcileConfig {
    /// Default config file location (`~/.kmap/config.toml`).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".kmap"))
            .unwrap_or_else(|| PathBuf::from(".kmap"))
            .join("config.toml")
    }

    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> KmapResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| KmapError::Configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| KmapError::Configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| KmapError::Configuration(e.to_string()))?,
            _ => {
                return Err(KmapError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables on top of the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse("KMAP_SIMILARITY_THRESHOLD") {
            config.canonicalization.similarity_threshold = v;
        }
        if let Some(v) = env_parse("KMAP_LEXICAL_MATCH_THRESHOLD") {
            config.canonicalization.lexical_match_threshold = v;
        }
        if let Some(v) = env_parse("KMAP_SEARCH_TOP_K") {
            config.canonicalization.search_top_k = v;
        }
        if let Some(v) = env_parse("KMAP_SEARCH_SCORE_THRESHOLD") {
            config.canonicalization.search_score_threshold = v;
        }
        if let Some(v) = env_parse("KMAP_LOOKUP_CONCURRENCY") {
            config.canonicalization.lookup_concurrency = v;
        }
        if let Ok(mode) = std::env::var("KMAP_CLUSTERING_MODE") {
            config.canonicalization.clustering_mode = match mode.to_lowercase().as_str() {
                "transitive" | "transitive_closure" => ClusteringMode::TransitiveClosure,
                _ => ClusteringMode::SeedOnly,
            };
        }
        if let Some(v) = env_parse("KMAP_CONFLICT_NAME_THRESHOLD") {
            config.conflict.name_similarity_threshold = v;
        }
        if let Some(v) = env_parse("KMAP_COMPARISON_CONFIDENCE") {
            config.conflict.comparison_confidence = v;
        }

        config
    }

    /// Validate both sections.
    pub fn validate(&self) -> KmapResult<()> {
        self.canonicalization.validate()?;
        self.conflict.validate()
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> ReconcileConfigBuilder {
        ReconcileConfigBuilder::default()
    }
}

/// Builder for ReconcileConfig.
#[derive(Default)]
pub struct ReconcileConfigBuilder {
    config: ReconcileConfig,
}

impl ReconcileConfigBuilder {
    /// Set canonicalization configuration.
    pub fn canonicalization(mut self, config: CanonicalizationConfig) -> Self {
        self.config.canonicalization = config;
        self
    }

    /// Set conflict detection configuration.
    pub fn conflict(mut self, config: ConflictConfig) -> Self {
        self.config.conflict = config;
        self
    }

    /// Set the vector similarity threshold.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.canonicalization.similarity_threshold = threshold;
        self
    }

    /// Set the clustering mode.
    pub fn clustering_mode(mut self, mode: ClusteringMode) -> Self {
        self.config.canonicalization.clustering_mode = mode;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> KmapResult<ReconcileConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn check_unit(name: &str, value: f32) -> KmapResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(KmapError::Configuration(format!(
            "{} must be between 0.0 and 1.0, got {}",
            name, value
        )))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring unparsable value for {}: {:?}", key, raw);
            None
        }
    }
}

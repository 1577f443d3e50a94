//! Entity type definitions.
//!
//! - `EntityType`: the fixed set of categories an extracted entity can take
//! - `SourceSpan`: provenance of a single mention
//! - `Entity`: a typed, possibly embedded mention with provenance

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::str::FromStr;
use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};

use super::truncate_chars;
use crate::error::{ErrorCode, KmapError, KmapResult};

/// Maximum number of characters kept in an entity summary.
pub const SUMMARY_MAX_CHARS: usize = 300;

/// Entity types produced by extraction.
///
/// Serialized with their capitalized names (`"Library"`), matching the
/// extraction prompt vocabulary.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    IntoStaticStr,
)]
pub enum EntityType {
    /// Abstract ideas, theories, methodologies, algorithms.
    Concept,
    /// Software libraries, frameworks, tools.
    Library,
    /// Individual people (authors, researchers, etc.).
    Person,
    /// Companies, institutions, research groups.
    Organization,
    /// Research papers, publications, documents.
    Paper,
    /// Software systems, platforms, architectures.
    System,
    /// Measurements, benchmarks, performance indicators.
    Metric,
}

impl EntityType {
    /// Parse entity type from string with flexible matching.
    ///
    /// Handles variations in LLM output like "LIBRARY", "library", "lib",
    /// "framework", etc.
    pub fn from_str_flexible(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase();

        match normalized.as_str() {
            "concept" | "idea" | "theory" | "method" | "methodology" | "algorithm"
            | "technique" | "topic" => Some(Self::Concept),

            "library" | "lib" | "framework" | "package" | "tool" | "toolkit" | "sdk" => {
                Some(Self::Library)
            }

            "person" | "per" | "people" | "individual" | "author" | "researcher" => {
                Some(Self::Person)
            }

            "organization" | "org" | "organisation" | "company" | "institution"
            | "lab" | "research_group" => Some(Self::Organization),

            "paper" | "publication" | "article" | "document" | "preprint" => Some(Self::Paper),

            "system" | "platform" | "architecture" | "service" | "application" => {
                Some(Self::System)
            }

            "metric" | "measure" | "measurement" | "benchmark" | "score" | "kpi" => {
                Some(Self::Metric)
            }

            _ => None,
        }
    }

    /// Get all entity type variants.
    pub fn all() -> Vec<EntityType> {
        Self::iter().collect()
    }

    /// Convert to string for display and storage.
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl FromStr for EntityType {
    type Err = KmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_flexible(s)
            .ok_or_else(|| KmapError::parse(format!("Unknown entity type: {}", s)))
    }
}

/// Where a mention was found: a document and a character range within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpan {
    /// Source document identifier.
    pub doc_id: String,
    /// Start character offset.
    pub start: usize,
    /// End character offset.
    pub end: usize,
}

impl SourceSpan {
    /// Create a new source span.
    pub fn new(doc_id: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            doc_id: doc_id.into(),
            start,
            end,
        }
    }

    /// Validate the span.
    pub fn validate(&self) -> KmapResult<()> {
        if self.doc_id.trim().is_empty() {
            return Err(KmapError::validation_with_code(
                "Source span doc_id cannot be empty",
                ErrorCode::ValMissingField,
            ));
        }
        if self.start > self.end {
            return Err(KmapError::validation_with_code(
                format!(
                    "Source span start ({}) must not exceed end ({})",
                    self.start, self.end
                ),
                ErrorCode::ValOutOfRange,
            ));
        }
        Ok(())
    }
}

/// An extracted entity.
///
/// The `id` is derived from `name` and `entity_type`, so two mentions with
/// the same name and type always collide. Downstream stores rely on this for
/// idempotent upserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Deterministic identifier (`sha256("{name}|{type}")`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Entity type.
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Alternative names.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Optional embedding vector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Importance score in [0, 1].
    #[serde(default)]
    pub salience: f32,
    /// Provenance records.
    #[serde(default)]
    pub source_spans: Vec<SourceSpan>,
    /// Short description.
    #[serde(default)]
    pub summary: String,
    /// Creation time.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last update time.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Create a new entity with a derived id.
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: Self::generate_id(&name, entity_type),
            name,
            entity_type,
            aliases: Vec::new(),
            embedding: None,
            salience: 0.0,
            source_spans: Vec::new(),
            summary: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Derive the deterministic id for a name/type pair.
    pub fn generate_id(name: &str, entity_type: EntityType) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}|{}", name, entity_type.as_str()).as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Rename the entity. The id follows the new name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.id = Self::generate_id(&self.name, self.entity_type);
        self
    }

    /// Add a single alias (case-insensitive dedup, blanks ignored).
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.push_alias(alias.into());
        self
    }

    /// Add several aliases.
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for alias in aliases {
            self.push_alias(alias.into());
        }
        self
    }

    /// Attach an embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Set salience, clamped to [0, 1].
    pub fn with_salience(mut self, salience: f32) -> Self {
        self.salience = if salience.is_finite() {
            salience.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Set the summary, truncated to `SUMMARY_MAX_CHARS`.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = truncate_chars(&summary.into(), SUMMARY_MAX_CHARS);
        self
    }

    /// Append a provenance span.
    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.source_spans.push(span);
        self
    }

    /// Set both timestamps.
    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self.updated_at = at;
        self
    }

    fn push_alias(&mut self, alias: String) {
        let trimmed = alias.trim();
        if trimmed.is_empty() {
            return;
        }
        let lower = trimmed.to_lowercase();
        if !self.aliases.iter().any(|a| a.to_lowercase() == lower) {
            self.aliases.push(trimmed.to_string());
        }
    }

    /// Distinct document ids this entity was seen in.
    pub fn document_ids(&self) -> BTreeSet<&str> {
        self.source_spans.iter().map(|s| s.doc_id.as_str()).collect()
    }

    /// Number of distinct documents.
    pub fn document_count(&self) -> usize {
        self.document_ids().len()
    }

    /// Whether the entity's provenance touches more than one document.
    pub fn is_cross_document(&self) -> bool {
        self.document_count() > 1
    }

    /// Whether the entity has an embedding with at least one dimension.
    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Validate the entity.
    pub fn validate(&self) -> KmapResult<()> {
        if self.name.trim().is_empty() {
            return Err(KmapError::validation_with_code(
                "Entity name cannot be empty",
                ErrorCode::ValMissingField,
            ));
        }
        if !self.salience.is_finite() || !(0.0..=1.0).contains(&self.salience) {
            return Err(KmapError::validation_with_code(
                format!(
                    "Salience {} of '{}' is out of range [0.0, 1.0]",
                    self.salience, self.name
                ),
                ErrorCode::ValOutOfRange,
            ));
        }
        if let Some(embedding) = &self.embedding {
            if embedding.iter().any(|v| !v.is_finite()) {
                return Err(KmapError::validation(format!(
                    "Embedding of '{}' contains non-finite values",
                    self.name
                )));
            }
        }
        for span in &self.source_spans {
            span.validate()?;
        }
        Ok(())
    }
}

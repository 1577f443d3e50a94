//! Relationship type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};

use super::truncate_chars;
use crate::error::{ErrorCode, KmapError, KmapResult};

/// Maximum number of characters kept in an evidence quote.
pub const EVIDENCE_QUOTE_MAX_CHARS: usize = 200;

/// Relationship predicates between entities.
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
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    /// Entity A uses entity B.
    Uses,
    /// Entity A implements entity B.
    Implements,
    /// Entity A extends entity B.
    Extends,
    /// Entity A contains entity B.
    Contains,
    /// General relationship.
    RelatesTo,
    /// Work authored by a person.
    AuthoredBy,
    /// Work published by an organization.
    PublishedBy,
    /// Two entities disagree across documents. Only synthesized by conflict detection.
    ComparesWith,
    /// Entity A depends on entity B.
    DependsOn,
    /// Entity A influences entity B.
    Influences,
}

impl RelationType {
    /// Parse a predicate with flexible matching ("relates-to", "Related To", ...).
    pub fn from_str_flexible(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");

        match normalized.as_str() {
            "uses" | "use" | "utilizes" | "built_with" => Some(Self::Uses),
            "implements" | "implement" | "realizes" => Some(Self::Implements),
            "extends" | "extend" | "builds_on" | "inherits_from" => Some(Self::Extends),
            "contains" | "contain" | "includes" | "has_part" => Some(Self::Contains),
            "relates_to" | "related_to" | "associated_with" => Some(Self::RelatesTo),
            "authored_by" | "written_by" | "by" => Some(Self::AuthoredBy),
            "published_by" | "released_by" => Some(Self::PublishedBy),
            "compares_with" | "compared_with" | "compares_to" | "versus" => {
                Some(Self::ComparesWith)
            }
            "depends_on" | "requires" | "relies_on" => Some(Self::DependsOn),
            "influences" | "influenced" | "inspires" => Some(Self::Influences),
            _ => None,
        }
    }

    /// Get all predicates.
    pub fn all() -> Vec<RelationType> {
        Self::iter().collect()
    }

    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl FromStr for RelationType {
    type Err = KmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_flexible(s)
            .ok_or_else(|| KmapError::parse(format!("Unknown relationship type: {}", s)))
    }
}

/// A quote supporting a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Source document.
    pub doc_id: String,
    /// Verbatim (or synthesized) supporting text.
    pub quote: String,
    /// Character offset of the quote in the document.
    pub offset: usize,
}

impl Evidence {
    /// Create evidence; the quote is truncated to `EVIDENCE_QUOTE_MAX_CHARS`.
    pub fn new(doc_id: impl Into<String>, quote: impl Into<String>, offset: usize) -> Self {
        Self {
            doc_id: doc_id.into(),
            quote: truncate_chars(&quote.into(), EVIDENCE_QUOTE_MAX_CHARS),
            offset,
        }
    }
}

/// A typed edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Source entity id.
    #[serde(rename = "from")]
    pub from_entity: String,
    /// Target entity id.
    #[serde(rename = "to")]
    pub to_entity: String,
    /// Predicate.
    pub predicate: RelationType,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// Supporting evidence.
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    /// Whether the edge has a direction.
    #[serde(default = "default_directional")]
    pub directional: bool,
    /// Creation time.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_directional() -> bool {
    true
}

impl Relationship {
    /// Create a directional relationship.
    ///
    /// Fails if `from_entity == to_entity`.
    pub fn new(
        from_entity: impl Into<String>,
        to_entity: impl Into<String>,
        predicate: RelationType,
        confidence: f32,
    ) -> KmapResult<Self> {
        let from_entity = from_entity.into();
        let to_entity = to_entity.into();
        if from_entity == to_entity {
            return Err(KmapError::validation_with_code(
                format!("Relationship cannot link entity '{}' to itself", from_entity),
                ErrorCode::ValSelfReference,
            ));
        }

        Ok(Self {
            from_entity,
            to_entity,
            predicate,
            confidence: clamp_unit(confidence),
            evidence: Vec::new(),
            directional: true,
            created_at: Utc::now(),
        })
    }

    /// Create a non-directional `compares_with` relationship.
    pub fn comparison(
        from_entity: impl Into<String>,
        to_entity: impl Into<String>,
        confidence: f32,
        evidence: Vec<Evidence>,
    ) -> KmapResult<Self> {
        let mut relationship =
            Self::new(from_entity, to_entity, RelationType::ComparesWith, confidence)?;
        relationship.directional = false;
        relationship.evidence = evidence;
        Ok(relationship)
    }

    /// Whether this is a synthesized comparison edge.
    pub fn is_comparison(&self) -> bool {
        self.predicate == RelationType::ComparesWith
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

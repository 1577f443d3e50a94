//! Error types for kmap operations.
//!
//! This module provides the error hierarchy for reconciliation with structured
//! error codes and suggestions for resolution.

use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for kmap operations.
pub type KmapResult<T> = Result<T, KmapError>;

/// Main error type for all kmap operations.
#[derive(Error, Debug)]
pub enum KmapError {
    /// Input validation failed.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        details: HashMap<String, String>,
        suggestion: Option<String>,
    },

    /// The similarity-search collaborator failed.
    #[error("Similarity search error: {message}")]
    SimilaritySearch {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A merge was requested for a group with no members.
    #[error("Cannot merge empty entity group")]
    EmptyMergeGroup,

    /// Merge arithmetic could not produce a canonical entity.
    #[error("Merge error: {message}")]
    Merge { message: String, code: ErrorCode },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Parse error.
    #[error("Parse error: {message}")]
    Parse { message: String, code: ErrorCode },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation (VAL_xxx)
    ValInvalidInput,
    ValMissingField,
    ValOutOfRange,
    ValSelfReference,

    // Similarity search (SRCH_xxx)
    SrchUnavailable,
    SrchQueryFailed,

    // Merge (MERGE_xxx)
    MergeEmptyGroup,
    MergeTypeMismatch,

    // Configuration (CFG_xxx)
    CfgInvalid,

    // Parse (PARSE_xxx)
    ParseInvalidJson,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValMissingField => "VAL_002",
            ErrorCode::ValOutOfRange => "VAL_003",
            ErrorCode::ValSelfReference => "VAL_004",
            ErrorCode::SrchUnavailable => "SRCH_001",
            ErrorCode::SrchQueryFailed => "SRCH_002",
            ErrorCode::MergeEmptyGroup => "MERGE_001",
            ErrorCode::MergeTypeMismatch => "MERGE_002",
            ErrorCode::CfgInvalid => "CFG_001",
            ErrorCode::ParseInvalidJson => "PARSE_001",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl KmapError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            details: HashMap::new(),
            suggestion: None,
        }
    }

    /// Create a validation error with a specific code.
    pub fn validation_with_code(message: impl Into<String>, code: ErrorCode) -> Self {
        Self::Validation {
            message: message.into(),
            code,
            details: HashMap::new(),
            suggestion: None,
        }
    }

    /// Create a similarity search error.
    pub fn similarity_search(message: impl Into<String>) -> Self {
        Self::SimilaritySearch {
            message: message.into(),
            code: ErrorCode::SrchQueryFailed,
            source: None,
        }
    }

    /// Create a similarity search error wrapping an underlying cause.
    pub fn similarity_search_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::SimilaritySearch {
            message: message.into(),
            code: ErrorCode::SrchUnavailable,
            source: Some(Box::new(source)),
        }
    }

    /// Create a merge error.
    pub fn merge(message: impl Into<String>) -> Self {
        Self::Merge {
            message: message.into(),
            code: ErrorCode::MergeTypeMismatch,
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            code: ErrorCode::ParseInvalidJson,
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code, .. } => *code,
            Self::SimilaritySearch { code, .. } => *code,
            Self::EmptyMergeGroup => ErrorCode::MergeEmptyGroup,
            Self::Merge { code, .. } => *code,
            Self::Configuration(_) => ErrorCode::CfgInvalid,
            Self::Parse { code, .. } => *code,
            Self::Serialization(_) => ErrorCode::ParseInvalidJson,
            _ => ErrorCode::Internal,
        }
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Validation { suggestion, .. } => suggestion.as_deref(),
            Self::SimilaritySearch { .. } => {
                Some("Please check the similarity index connection; matching falls back to aliases")
            }
            Self::EmptyMergeGroup => Some("Merge groups must contain at least one entity"),
            Self::Configuration(_) => Some("Thresholds must be finite and within [0.0, 1.0]"),
            _ => None,
        }
    }

    /// Whether this error should be contained to the item that caused it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::SimilaritySearch { .. } | Self::Merge { .. }
        )
    }
}

//! Cross-document conflict detection.
//!
//! Finds same-typed entities from disjoint document sets that look alike but
//! disagree, and links each such pair with two non-directional
//! `compares_with` relationships.

mod analysis;
mod detector;

pub use analysis::{ConflictedEntity, CrossDocumentAnalysis};
pub use detector::{CompareDecision, Conflict, ConflictDetector, ConflictPair};

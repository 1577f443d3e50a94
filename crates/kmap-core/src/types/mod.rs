//! Core types for kmap.

mod entity;
mod relationship;

pub use entity::*;
pub use relationship::*;

use serde::{Deserialize, Serialize};

/// Output of one extraction pass (a document or a chunk of one).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionBatch {
    /// Extracted entities.
    #[serde(default)]
    pub entities: Vec<Entity>,
    /// Extracted relationships.
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl ExtractionBatch {
    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }

    /// Concatenate several batches, preserving order.
    pub fn concat(batches: impl IntoIterator<Item = ExtractionBatch>) -> Self {
        batches
            .into_iter()
            .fold(Self::default(), |mut acc, mut batch| {
                acc.entities.append(&mut batch.entities);
                acc.relationships.append(&mut batch.relationships);
                acc
            })
    }
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

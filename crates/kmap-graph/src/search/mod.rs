//! `SimilaritySearch` implementations.

mod memory;

pub use memory::InMemorySimilaritySearch;

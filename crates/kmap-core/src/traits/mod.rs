//! Collaborator traits for kmap.

mod similarity_search;

pub use similarity_search::*;

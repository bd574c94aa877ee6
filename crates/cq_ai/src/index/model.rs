use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryMetadata {
    pub unit_id: String,
    pub title: String,
    pub position_in_unit: u32,
    /// Chunk text, kept so prompts can be assembled from a loaded snapshot alone.
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub metadata: EntryMetadata,
}

/// One ranked hit of a search. `rank` is 1-based; `score` is `1 / (1 + distance)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub score: f64,
    pub distance: f64,
    pub rank: u32,
    pub unit_id: String,
    pub title: String,
}

use std::cmp::Ordering;
use std::collections::BTreeMap;

use cq_core::domain::Chunk;
use cq_core::error::{codes, AppError};

mod model;
mod shared;
pub mod similarity;
mod store;

pub use model::{EntryMetadata, IndexEntry, RetrievalResult};
pub use shared::SharedIndex;
pub use store::{IndexStatus, IndexStore, SNAPSHOT_FORMAT_VERSION};

/// Exact nearest-neighbour index over chunk vectors.
///
/// Notes:
/// - The dimension is fixed by the first inserted vector and enforced afterwards.
/// - Entries are append-only; once handed to a `SharedIndex` the index is read-only.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    dims: Option<usize>,
    entries: Vec<IndexEntry>,
    by_id: BTreeMap<String, usize>,
}

impl VectorIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Batch build; fails on the first vector whose length differs from the first one.
    pub fn build(items: Vec<(Chunk, Vec<f32>)>) -> Result<Self, AppError> {
        let mut index = Self::empty();
        for (chunk, vector) in items {
            index.insert(IndexEntry {
                chunk_id: chunk.chunk_id,
                vector,
                metadata: EntryMetadata {
                    unit_id: chunk.unit_id,
                    title: chunk.unit_title,
                    position_in_unit: chunk.position_in_unit,
                    text: chunk.text,
                },
            })?;
        }
        tracing::info!(
            entries = index.len(),
            dims = index.dims().unwrap_or(0),
            "vector index built"
        );
        Ok(index)
    }

    pub fn insert(&mut self, entry: IndexEntry) -> Result<(), AppError> {
        if entry.vector.is_empty() {
            return Err(AppError::new(
                codes::DIMENSION_MISMATCH,
                "Embedding vectors must not be empty",
            )
            .with_details(format!("chunk_id={}", entry.chunk_id)));
        }
        if let Some(dims) = self.dims {
            if entry.vector.len() != dims {
                return Err(AppError::new(
                    codes::DIMENSION_MISMATCH,
                    "Embedding sizes disagree across the index",
                )
                .with_details(format!(
                    "chunk_id={}; expected={dims}; got={}",
                    entry.chunk_id,
                    entry.vector.len()
                )));
            }
        }
        if let Some(bad) = first_non_finite(&entry.vector) {
            return Err(AppError::new(
                codes::INVALID_VECTOR,
                "Embedding vectors must contain finite numbers only",
            )
            .with_details(format!("chunk_id={}; component={bad}", entry.chunk_id)));
        }
        if self.by_id.contains_key(&entry.chunk_id) {
            return Err(
                AppError::new(codes::DUPLICATE_CHUNK, "Chunk ids must be unique in the index")
                    .with_details(format!("chunk_id={}", entry.chunk_id)),
            );
        }

        self.dims = Some(entry.vector.len());
        self.by_id.insert(entry.chunk_id.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dims(&self) -> Option<usize> {
        self.dims
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn entry(&self, chunk_id: &str) -> Option<&IndexEntry> {
        self.by_id.get(chunk_id).map(|&i| &self.entries[i])
    }

    /// Top `k` entries by ascending squared L2 distance; ties go to the lower chunk id.
    ///
    /// `k` larger than the index returns every entry. `k == 0` returns nothing.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalResult>, AppError> {
        let dims = match self.dims {
            Some(d) if !self.entries.is_empty() => d,
            _ => {
                return Err(AppError::new(
                    codes::EMPTY_INDEX,
                    "The index has no entries to search",
                ))
            }
        };
        if query.len() != dims {
            return Err(AppError::new(
                codes::DIMENSION_MISMATCH,
                "Query embedding size does not match the index",
            )
            .with_details(format!("index_dims={dims}; query_dims={}", query.len())));
        }

        if let Some(bad) = first_non_finite(query) {
            return Err(AppError::new(
                codes::INVALID_VECTOR,
                "Query embedding must contain finite numbers only",
            )
            .with_details(format!("component={bad}")));
        }

        let mut scored: Vec<(f64, &IndexEntry)> = self
            .entries
            .iter()
            .map(|e| (similarity::squared_l2(query, &e.vector), e))
            .collect();
        scored.sort_by(|a, b| match a.0.total_cmp(&b.0) {
            Ordering::Equal => a.1.chunk_id.cmp(&b.1.chunk_id),
            other => other,
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(i, (distance, e))| RetrievalResult {
                chunk_id: e.chunk_id.clone(),
                score: similarity::similarity_from_distance(distance),
                distance,
                rank: i as u32 + 1,
                unit_id: e.metadata.unit_id.clone(),
                title: e.metadata.title.clone(),
            })
            .collect())
    }
}

fn first_non_finite(v: &[f32]) -> Option<usize> {
    v.iter().position(|x| !x.is_finite())
}

use std::fs;
use std::path::{Path, PathBuf};

use cq_core::domain::Chunk;
use cq_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use super::{IndexEntry, VectorIndex};
use crate::embeddings::Embedder;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct SnapshotHeader {
    format_version: u32,
    dims: u32,
    entry_count: u32,
    embedding_model: String,
    built_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    header: SnapshotHeader,
    entries: Vec<IndexEntry>,
}

#[derive(Debug, Deserialize)]
struct HeaderOnly {
    header: SnapshotHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexStatus {
    pub ready: bool,
    pub dims: Option<u32>,
    pub entry_count: u32,
    pub embedding_model: Option<String>,
    pub built_at: Option<String>,
}

/// File-backed index snapshot. One JSON document holding a header and every entry.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent(&self) -> Result<(), AppError> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir).map_err(|e| {
                AppError::new(codes::INDEX_STORE_FAILED, "Failed to create index directory")
                    .with_details(format!("path={}; err={}", dir.display(), e))
            }),
            _ => Ok(()),
        }
    }

    fn read_bytes(&self) -> Result<Vec<u8>, AppError> {
        fs::read(&self.path).map_err(|e| {
            AppError::new(codes::INDEX_STORE_FAILED, "Failed to read index snapshot")
                .with_details(format!("path={}; err={}", self.path.display(), e))
        })
    }

    pub fn status(&self) -> Result<IndexStatus, AppError> {
        if !self.path.exists() {
            return Ok(IndexStatus {
                ready: false,
                dims: None,
                entry_count: 0,
                embedding_model: None,
                built_at: None,
            });
        }
        let bytes = self.read_bytes()?;
        let h: HeaderOnly = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::new(codes::INDEX_CORRUPT, "Index snapshot is unreadable")
                .with_details(format!("path={}; err={}", self.path.display(), e))
        })?;
        Ok(IndexStatus {
            ready: h.header.entry_count > 0,
            dims: Some(h.header.dims),
            entry_count: h.header.entry_count,
            embedding_model: Some(h.header.embedding_model),
            built_at: Some(h.header.built_at),
        })
    }

    pub fn save(
        &self,
        index: &VectorIndex,
        embedding_model: &str,
        built_at: &str,
    ) -> Result<IndexStatus, AppError> {
        let dims = match index.dims() {
            Some(d) if !index.is_empty() => d as u32,
            _ => {
                return Err(AppError::new(
                    codes::EMPTY_INDEX,
                    "Refusing to save an empty index",
                ))
            }
        };
        self.ensure_parent()?;

        let snapshot = Snapshot {
            header: SnapshotHeader {
                format_version: SNAPSHOT_FORMAT_VERSION,
                dims,
                entry_count: index.len() as u32,
                embedding_model: embedding_model.to_string(),
                built_at: built_at.to_string(),
            },
            entries: index.entries().to_vec(),
        };

        let tmp = self.path.with_extension("tmp");
        let json = serde_json::to_vec(&snapshot).map_err(|e| {
            AppError::new(codes::INDEX_STORE_FAILED, "Failed to encode index snapshot")
                .with_details(e.to_string())
        })?;
        fs::write(&tmp, &json).map_err(|e| {
            AppError::new(codes::INDEX_STORE_FAILED, "Failed to write index snapshot")
                .with_details(format!("path={}; err={}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            AppError::new(codes::INDEX_STORE_FAILED, "Failed to finalize index snapshot write")
                .with_details(format!(
                    "tmp={}; dest={}; err={}",
                    tmp.display(),
                    self.path.display(),
                    e
                ))
        })?;

        tracing::info!(
            entries = snapshot.header.entry_count,
            dims,
            path = %self.path.display(),
            "index snapshot saved"
        );
        Ok(IndexStatus {
            ready: true,
            dims: Some(dims),
            entry_count: snapshot.header.entry_count,
            embedding_model: Some(snapshot.header.embedding_model),
            built_at: Some(snapshot.header.built_at),
        })
    }

    /// Restores an index; the header must agree with the entries it describes.
    pub fn load(&self) -> Result<(VectorIndex, IndexStatus), AppError> {
        if !self.path.exists() {
            return Err(AppError::new(
                codes::NO_KNOWLEDGE_BASE,
                "No knowledge base loaded; build the index first",
            )
            .with_details(format!("path={}", self.path.display())));
        }
        let bytes = self.read_bytes()?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::new(codes::INDEX_CORRUPT, "Index snapshot is unreadable")
                .with_details(format!("path={}; err={}", self.path.display(), e))
        })?;

        let h = &snapshot.header;
        if h.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(AppError::new(
                codes::INDEX_CORRUPT,
                "Index snapshot was written by an incompatible version",
            )
            .with_details(format!("format_version={}", h.format_version)));
        }
        if h.entry_count as usize != snapshot.entries.len() {
            return Err(AppError::new(
                codes::INDEX_CORRUPT,
                "Index snapshot header does not match its entries",
            )
            .with_details(format!(
                "entry_count={}; entries={}",
                h.entry_count,
                snapshot.entries.len()
            )));
        }

        let mut index = VectorIndex::empty();
        for entry in snapshot.entries {
            if entry.vector.len() != h.dims as usize {
                return Err(AppError::new(
                    codes::INDEX_CORRUPT,
                    "Index snapshot header does not match its entries",
                )
                .with_details(format!(
                    "chunk_id={}; dims={}; got={}",
                    entry.chunk_id,
                    h.dims,
                    entry.vector.len()
                )));
            }
            index.insert(entry).map_err(|e| {
                AppError::new(codes::INDEX_CORRUPT, "Index snapshot holds invalid entries")
                    .with_details(e.details.unwrap_or(e.message))
            })?;
        }

        tracing::info!(entries = index.len(), dims = h.dims, "index snapshot loaded");
        let status = IndexStatus {
            ready: !index.is_empty(),
            dims: Some(h.dims),
            entry_count: h.entry_count,
            embedding_model: Some(h.embedding_model.clone()),
            built_at: Some(h.built_at.clone()),
        };
        Ok((index, status))
    }

    /// Embeds every chunk, builds the index and writes the snapshot.
    ///
    /// Any failure halts before the snapshot is touched.
    pub fn build_with_embedder(
        &self,
        chunks: &[Chunk],
        embedder: &dyn Embedder,
        embedding_model: &str,
        built_at: &str,
    ) -> Result<(VectorIndex, IndexStatus), AppError> {
        if chunks.is_empty() {
            return Err(AppError::new(
                codes::NO_KNOWLEDGE_BASE,
                "No chunks available; run ingest before building the index",
            ));
        }

        let mut items = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let v = embedder.embed(embedding_model, &chunk.embedding_input()).map_err(|e| {
                AppError::new(codes::EMBEDDING_UNAVAILABLE, "Failed to embed chunk")
                    .with_details(format!(
                        "chunk_id={}; code={}; details={}",
                        chunk.chunk_id,
                        e.code,
                        e.details.unwrap_or_default()
                    ))
                    .with_retryable(e.retryable)
            })?;
            items.push((chunk.clone(), v));
            if (i + 1) % 100 == 0 {
                tracing::debug!(embedded = i + 1, total = chunks.len(), "embedding progress");
            }
        }

        let index = VectorIndex::build(items)?;
        let status = self.save(&index, embedding_model, built_at)?;
        Ok((index, status))
    }
}

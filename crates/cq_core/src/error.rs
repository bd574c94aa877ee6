use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes shared by every layer and surfaced to front ends.
pub mod codes {
    pub const EMPTY_QUERY: &str = "RAG_EMPTY_QUERY";
    pub const INVALID_K: &str = "RAG_INVALID_K";
    pub const DIMENSION_MISMATCH: &str = "RAG_DIMENSION_MISMATCH";
    pub const EMPTY_INDEX: &str = "RAG_EMPTY_INDEX";
    pub const NO_KNOWLEDGE_BASE: &str = "RAG_NO_KNOWLEDGE_BASE";
    pub const EMBEDDING_UNAVAILABLE: &str = "RAG_EMBEDDING_UNAVAILABLE";
    pub const GENERATION_UNAVAILABLE: &str = "RAG_GENERATION_UNAVAILABLE";
    pub const GENERATION_TIMEOUT: &str = "RAG_GENERATION_TIMEOUT";

    pub const SEGMENT_INVALID: &str = "RAG_SEGMENT_INVALID";
    pub const DUPLICATE_CHUNK: &str = "RAG_DUPLICATE_CHUNK";
    pub const INVALID_VECTOR: &str = "RAG_INVALID_VECTOR";
    pub const INDEX_STORE_FAILED: &str = "RAG_INDEX_STORE_FAILED";
    pub const INDEX_CORRUPT: &str = "RAG_INDEX_CORRUPT";
    pub const CONFIG_INVALID: &str = "RAG_CONFIG_INVALID";
    pub const INGEST_FAILED: &str = "RAG_INGEST_FAILED";
    pub const REMOTE_NOT_ALLOWED: &str = "RAG_REMOTE_NOT_ALLOWED";
    pub const EVAL_FAILED: &str = "RAG_EVAL_FAILED";
}

/// Single structured error shape used across the pipeline and exposed to front ends.
///
/// `message` is safe to show to an end user. Anything raw (HTTP status, transport
/// errors, file paths) belongs in `details`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }

    /// Next step a user can take for this error kind.
    pub fn hint(&self) -> &'static str {
        match self.code.as_str() {
            codes::EMPTY_QUERY => "Type a question before submitting.",
            codes::INVALID_K => "Ask for at least one source (k >= 1).",
            codes::DIMENSION_MISMATCH => {
                "Rebuild the index with a single embedding model; vector sizes disagree."
            }
            codes::EMPTY_INDEX | codes::NO_KNOWLEDGE_BASE => {
                "Build the index first (run `citizenquery build`)."
            }
            codes::EMBEDDING_UNAVAILABLE => {
                "Check that the embedding service is running, then try again."
            }
            codes::GENERATION_UNAVAILABLE => {
                "Check that the language model service is running, then try again."
            }
            codes::GENERATION_TIMEOUT => {
                "The model took too long; try again or raise generation.timeout_secs."
            }
            codes::SEGMENT_INVALID => "overlap_size must be smaller than max_chunk_size.",
            codes::INVALID_VECTOR => {
                "The embedding service returned non-numeric values; check the model and rebuild."
            }
            codes::DUPLICATE_CHUNK => "Re-run ingest; the chunk set contains repeated chunk ids.",
            codes::INDEX_STORE_FAILED | codes::INDEX_CORRUPT => {
                "Rebuild the index snapshot (run `citizenquery build`)."
            }
            codes::CONFIG_INVALID => "Fix the configuration file or CQ_* environment overrides.",
            codes::INGEST_FAILED => "Check the source text file and run `citizenquery ingest` again.",
            codes::REMOTE_NOT_ALLOWED => "Point ollama.base_url at http://127.0.0.1.",
            _ => "See the logs for details.",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

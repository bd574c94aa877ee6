use cq_core::error::AppError;

/// Embedding gateway: maps text to a fixed-dimension vector for a given model.
///
/// Implementations must be deterministic for a fixed model.
pub trait Embedder: Send + Sync {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError>;
}

pub mod ollama_embed;

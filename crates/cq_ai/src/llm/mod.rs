use cq_core::error::AppError;

/// Sampling knobs forwarded to the model on every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_output_tokens: 1024,
        }
    }
}

/// Text generation gateway. One prompt in, one completion out.
pub trait Llm: Send + Sync {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, AppError>;
}

pub mod ollama_llm;

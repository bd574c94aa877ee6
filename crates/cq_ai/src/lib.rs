pub mod answer;
pub mod embeddings;
pub mod evaluate;
pub mod guardrails;
pub mod index;
pub mod llm;
pub mod ollama;

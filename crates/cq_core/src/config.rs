//! Layered configuration.
//!
//! Built-in defaults, then `citizenquery.toml`, then `CQ_*` environment variables
//! (`__` separates nested keys, e.g. `CQ_GENERATION__TEMPERATURE=0.2`).

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{codes, AppError};
use crate::segment::SegmentParams;

pub const DEFAULT_CONFIG_FILE: &str = "citizenquery.toml";
pub const ENV_PREFIX: &str = "CQ_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkingConfig {
    pub max_chunk_size: u32,
    pub overlap_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    pub top_k: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingsConfig {
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OllamaConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    pub units_path: PathBuf,
    pub chunks_path: PathBuf,
    pub index_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embeddings: EmbeddingsConfig,
    pub generation: GenerationConfig,
    pub ollama: OllamaConfig,
    pub paths: PathsConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig {
                max_chunk_size: 600,
                overlap_size: 100,
            },
            retrieval: RetrievalConfig { top_k: 3 },
            embeddings: EmbeddingsConfig {
                model: "all-minilm".to_string(),
            },
            generation: GenerationConfig {
                model: "llama3.1".to_string(),
                temperature: 0.1,
                max_output_tokens: 1024,
                timeout_secs: 30,
            },
            ollama: OllamaConfig {
                base_url: "http://127.0.0.1:11434".to_string(),
            },
            paths: PathsConfig {
                units_path: PathBuf::from("data/units.json"),
                chunks_path: PathBuf::from("data/chunks.json"),
                index_path: PathBuf::from("data/index.json"),
            },
        }
    }
}

impl RagConfig {
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// A missing file is not an error; defaults and env overrides still apply.
    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        let figment = Figment::from(Serialized::defaults(RagConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        let config: RagConfig = figment.extract().map_err(|e| {
            AppError::new(codes::CONFIG_INVALID, "Configuration could not be loaded")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.segment_params().map_err(|e| {
            AppError::new(codes::CONFIG_INVALID, "chunking.overlap_size must be smaller than chunking.max_chunk_size")
                .with_details(e.details.unwrap_or_default())
        })?;
        if self.retrieval.top_k < 1 {
            return Err(invalid("retrieval.top_k must be at least 1", self.retrieval.top_k));
        }
        let t = self.generation.temperature;
        if !(0.0..=1.0).contains(&t) {
            return Err(invalid("generation.temperature must be within [0, 1]", t));
        }
        if self.generation.max_output_tokens == 0 {
            return Err(invalid(
                "generation.max_output_tokens must be positive",
                self.generation.max_output_tokens,
            ));
        }
        if self.generation.timeout_secs == 0 {
            return Err(invalid(
                "generation.timeout_secs must be positive",
                self.generation.timeout_secs,
            ));
        }
        Ok(())
    }

    pub fn segment_params(&self) -> Result<SegmentParams, AppError> {
        SegmentParams::new(self.chunking.max_chunk_size, self.chunking.overlap_size)
    }
}

fn invalid(message: &str, value: impl std::fmt::Display) -> AppError {
    AppError::new(codes::CONFIG_INVALID, message).with_details(format!("value={value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_valid() {
        let cfg = RagConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.chunking.max_chunk_size, 600);
        assert_eq!(cfg.chunking.overlap_size, 100);
        assert_eq!(cfg.retrieval.top_k, 3);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("citizenquery.toml");
        fs::write(
            &path,
            "[chunking]\nmax_chunk_size = 200\noverlap_size = 20\n\n[generation]\ntemperature = 0.5\n",
        )
        .expect("write");

        let cfg = RagConfig::load_from(&path).expect("load");
        assert_eq!(cfg.chunking.max_chunk_size, 200);
        assert_eq!(cfg.chunking.overlap_size, 20);
        assert_eq!(cfg.generation.temperature, 0.5);
        assert_eq!(cfg.generation.max_output_tokens, 1024);
    }

    #[test]
    fn rejects_out_of_range_knobs() {
        let mut cfg = RagConfig::default();
        cfg.generation.temperature = 1.5;
        assert_eq!(cfg.validate().expect_err("temp").code, codes::CONFIG_INVALID);

        let mut cfg = RagConfig::default();
        cfg.chunking.overlap_size = 600;
        assert_eq!(cfg.validate().expect_err("overlap").code, codes::CONFIG_INVALID);

        let mut cfg = RagConfig::default();
        cfg.retrieval.top_k = 0;
        assert!(cfg.validate().is_err());
    }
}

//! Typed application configuration.
//!
//! All tunables live in named, validated structs loaded from a TOML file
//! merged over defaults. Invalid combinations (overlap >= chunk size,
//! fetch_k < k, unknown retrieval modes) are rejected when the config is
//! constructed, not when the pipeline is first exercised.

pub mod paths;

pub use paths::AppPaths;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;

/// Emitted verbatim when retrieval finds nothing relevant enough to
/// ground an answer. Byte-exact: tests assert on it.
pub const DEFAULT_FALLBACK_ANSWER: &str =
    "Sorry, I couldn't find an answer in the provided documents.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub provider: ProviderConfig,
    pub prompt: PromptConfig,
    pub ingest: IngestConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            provider: ProviderConfig::default(),
            prompt: PromptConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChunkingConfig {
    /// Window size in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks. Must be < chunk_size.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Plain top-k by similarity.
    Plain,
    /// Over-fetch then maximal-marginal-relevance re-ranking.
    Diverse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Number of chunks handed to the prompt builder.
    pub k: usize,
    /// Candidate pool size for diverse mode. Must be >= k.
    pub fetch_k: usize,
    pub mode: RetrievalMode,
    /// Cosine similarity floor; candidates below it never reach the prompt.
    pub similarity_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 4,
            fetch_k: 20,
            mode: RetrievalMode::Plain,
            similarity_threshold: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Embedding model identifier, recorded in the index version stamp.
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    /// Upper bound on a single provider call (chat or embed).
    pub request_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemma:2b".to_string(),
            temperature: None,
            max_tokens: None,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    /// Any OpenAI-compatible server (LM Studio, llama.cpp server, ...).
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Ollama,
            base_url: "http://localhost:11434".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PromptConfig {
    /// The canned answer emitted when the context is insufficient.
    pub fallback_answer: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            fallback_answer: DEFAULT_FALLBACK_ANSWER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Directory of pre-extracted text documents (.txt/.md).
    pub docs_dir: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            docs_dir: "docs".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file if it exists, otherwise fall back to
    /// defaults. The result is always validated.
    pub fn load(path: &Path) -> Result<Self, RagError> {
        let config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(RagError::internal)?;
            toml::from_str::<AppConfig>(&raw)
                .map_err(|e| RagError::InvalidConfig(format!("{}: {}", path.display(), e)))?
        } else {
            AppConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RagError> {
        self.chunking.validate()?;
        self.retrieval.validate()?;
        if self.embedding.model.trim().is_empty() {
            return Err(RagError::InvalidConfig(
                "embedding.model must not be empty".to_string(),
            ));
        }
        if self.generation.model.trim().is_empty() {
            return Err(RagError::InvalidConfig(
                "generation.model must not be empty".to_string(),
            ));
        }
        if self.generation.request_timeout_secs == 0 {
            return Err(RagError::InvalidConfig(
                "generation.request_timeout_secs must be >= 1".to_string(),
            ));
        }
        if self.prompt.fallback_answer.is_empty() {
            return Err(RagError::InvalidConfig(
                "prompt.fallback_answer must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), RagError> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidConfig(
                "chunking.chunk_size must be >= 1".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunking.overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), RagError> {
        if self.k == 0 {
            return Err(RagError::InvalidConfig(
                "retrieval.k must be >= 1".to_string(),
            ));
        }
        if self.fetch_k < self.k {
            return Err(RagError::InvalidConfig(format!(
                "retrieval.fetch_k ({}) must be >= k ({})",
                self.fetch_k, self.k
            )));
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(RagError::InvalidConfig(format!(
                "retrieval.similarity_threshold ({}) must be within [-1, 1]",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AppConfig::default().validate().expect("defaults must pass");
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let config = ChunkingConfig {
            chunk_size: 100,
            overlap: 100,
        };
        assert!(matches!(
            config.validate(),
            Err(RagError::InvalidConfig(_))
        ));
    }

    #[test]
    fn fetch_k_must_cover_k() {
        let config = RetrievalConfig {
            k: 10,
            fetch_k: 5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RagError::InvalidConfig(_))
        ));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = "[retrieval]\nk = 3\nsearch_type = \"mmr\"\n";
        let parsed = toml::from_str::<AppConfig>(raw);
        assert!(parsed.is_err());
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let raw = "[retrieval]\nmode = \"hybrid\"\n";
        let parsed = toml::from_str::<AppConfig>(raw);
        assert!(parsed.is_err());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let raw = "[chunking]\nchunk_size = 800\n";
        let config = toml::from_str::<AppConfig>(raw).expect("partial config parses");
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.chunking.overlap, 50);
        assert_eq!(config.retrieval.k, 4);
    }
}

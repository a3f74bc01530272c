//! LLM provider abstraction.
//!
//! One trait covers both capabilities the pipeline consumes: chat
//! completion (generation) and text embedding. Concrete providers talk to
//! a local Ollama server or any OpenAI-compatible endpoint.

pub mod ollama;
pub mod openai_compat;
pub mod provider;
pub mod types;

pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use provider::LlmProvider;
pub use types::{ChatMessage, ChatRequest};

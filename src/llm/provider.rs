use async_trait::async_trait;

use super::types::ChatRequest;
use crate::core::errors::RagError;

/// External model capability consumed by the pipeline.
///
/// Implementations map transport faults onto `RagError::GenerationFailed`
/// (chat) and `RagError::EmbeddingFailed` (embed) so the pipeline can
/// apply its single recovery policy without inspecting provider detail.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// provider name (e.g. "ollama", "openai")
    fn name(&self) -> &str;

    /// check if the provider is healthy/reachable
    async fn health_check(&self) -> Result<bool, RagError>;

    /// chat completion, exactly one attempt
    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, RagError>;

    /// embed a batch of texts; one vector per input, in input order
    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, RagError>;
}

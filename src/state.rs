use std::sync::Arc;
use std::time::Duration;

use crate::core::config::{AppConfig, AppPaths, ProviderKind};
use crate::core::errors::RagError;
use crate::history::HistoryStore;
use crate::llm::{LlmProvider, OllamaProvider, OpenAiCompatProvider};
use crate::rag::RagPipeline;

/// Application state shared across all callers.
///
/// Explicitly constructed and passed by reference; there is no ambient
/// global. `initialize` wires config, stores, and providers together,
/// `shutdown` releases the index and database connections.
pub struct AppState {
    pub config: AppConfig,
    pub paths: AppPaths,
    pub provider: Arc<dyn LlmProvider>,
    pub history: HistoryStore,
    pub pipeline: Arc<RagPipeline>,
}

impl AppState {
    pub async fn initialize(config: AppConfig, paths: AppPaths) -> Result<Arc<Self>, RagError> {
        config.validate()?;

        let history = HistoryStore::new(paths.history_db_path.clone()).await?;

        let request_timeout = Duration::from_secs(config.generation.request_timeout_secs);
        let provider: Arc<dyn LlmProvider> = match config.provider.kind {
            ProviderKind::Ollama => Arc::new(OllamaProvider::new(
                config.provider.base_url.clone(),
                request_timeout,
            )),
            ProviderKind::Openai => Arc::new(OpenAiCompatProvider::new(
                config.provider.base_url.clone(),
                request_timeout,
            )),
        };

        if !provider.health_check().await.unwrap_or(false) {
            tracing::warn!(
                "LLM provider '{}' at {} is not reachable; requests will fail until it is",
                provider.name(),
                config.provider.base_url
            );
        }

        let pipeline = Arc::new(RagPipeline::new(
            &config,
            &paths,
            provider.clone(),
            history.clone(),
        )?);

        Ok(Arc::new(Self {
            config,
            paths,
            provider,
            history,
            pipeline,
        }))
    }

    /// Release resources: the in-memory index and the history pool.
    pub async fn shutdown(&self) {
        self.pipeline.shutdown().await;
        self.history.close().await;
    }
}

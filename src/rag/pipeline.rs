//! Pipeline composition: ingest and query entry points.
//!
//! Ingest: chunk -> embed -> build index -> persist, guarded by a stamp
//! (embedding model + chunking parameters + corpus content hash) so an
//! unchanged corpus is never re-embedded. Query: retrieve -> prompt ->
//! generate, with the exchange appended to the session only after
//! generation succeeds.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};

use crate::core::config::{AppConfig, AppPaths, ChunkingConfig, GenerationConfig};
use crate::core::errors::RagError;
use crate::history::HistoryStore;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};
use crate::rag::chunker::Chunker;
use crate::rag::index::{IndexEntry, VectorIndex};
use crate::rag::prompt::PromptBuilder;
use crate::rag::retriever::Retriever;
use crate::rag::types::Document;

/// Documents embedded per provider call.
const EMBED_BATCH_SIZE: usize = 32;

/// Outcome of a query.
#[derive(Debug, Clone)]
pub struct Answer {
    pub answer: String,
    /// Deduplicated source labels of the chunks behind the answer, in
    /// retrieval order. Empty for fallback and apology answers.
    pub sources: Vec<String>,
}

/// Outcome of an ingest run.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub dims: usize,
    /// True when the persisted index matched the stamp and was reused
    /// without re-embedding.
    pub reused: bool,
}

pub struct RagPipeline {
    chunker: Chunker,
    retriever: Retriever,
    prompt: PromptBuilder,
    provider: Arc<dyn LlmProvider>,
    history: HistoryStore,
    chunking: ChunkingConfig,
    embedding_model: String,
    generation: GenerationConfig,
    index_path: PathBuf,
    index_slot: RwLock<Option<Arc<VectorIndex>>>,
    build_lock: Mutex<()>,
}

impl RagPipeline {
    pub fn new(
        config: &AppConfig,
        paths: &AppPaths,
        provider: Arc<dyn LlmProvider>,
        history: HistoryStore,
    ) -> Result<Self, RagError> {
        Ok(Self {
            chunker: Chunker::new(&config.chunking)?,
            retriever: Retriever::new(config.retrieval.clone())?,
            prompt: PromptBuilder::new(config.prompt.fallback_answer.clone()),
            provider,
            history,
            chunking: config.chunking.clone(),
            embedding_model: config.embedding.model.clone(),
            generation: config.generation.clone(),
            index_path: paths.index_path.clone(),
            index_slot: RwLock::new(None),
            build_lock: Mutex::new(()),
        })
    }

    /// True once an index is installed and queries can be served.
    pub async fn is_ready(&self) -> bool {
        self.index_slot.read().await.is_some()
    }

    /// Build (or reuse) the vector index for `documents`.
    ///
    /// Idempotent for an unchanged corpus: the persisted index is reused
    /// when its stamp (embedding model, chunking parameters, corpus
    /// content hash) matches the current inputs, so nothing is
    /// re-embedded. Any mismatch, load failure, or incompatible format
    /// triggers a full rebuild. Concurrent queries observe either no
    /// index (`IndexNotReady`) or a completely built one, never a
    /// partial build.
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestReport, RagError> {
        let _guard = self.build_lock.lock().await;

        let stamp = corpus_stamp(documents, &self.chunking, &self.embedding_model);

        if self.index_path.exists() {
            match VectorIndex::load(&self.index_path).await {
                Ok(loaded)
                    if loaded.meta().embedding_model == self.embedding_model
                        && loaded.meta().corpus_hash == stamp =>
                {
                    tracing::info!(
                        "Reusing persisted index ({} entries, dims {})",
                        loaded.len(),
                        loaded.dims()
                    );
                    let report = IngestReport {
                        documents: documents.len(),
                        chunks: loaded.len(),
                        dims: loaded.dims(),
                        reused: true,
                    };
                    self.install(loaded).await;
                    return Ok(report);
                }
                Ok(loaded) => {
                    tracing::info!(
                        "Persisted index stamp is stale (model {}, hash {}); rebuilding",
                        loaded.meta().embedding_model,
                        &loaded.meta().corpus_hash[..12.min(loaded.meta().corpus_hash.len())]
                    );
                }
                Err(err) => {
                    tracing::warn!("Failed to load persisted index: {}; rebuilding", err);
                }
            }
        }

        let chunks = self.chunker.split_all(documents);
        if chunks.is_empty() {
            return Err(RagError::EmptyCorpus);
        }
        tracing::info!(
            "Chunked {} documents into {} chunks; embedding with {}",
            documents.len(),
            chunks.len(),
            self.embedding_model
        );

        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let inputs: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embed_with_timeout(&inputs).await?;
            for (chunk, embedding) in batch.iter().zip(vectors) {
                entries.push(IndexEntry {
                    embedding,
                    chunk: chunk.clone(),
                });
            }
        }

        let index = VectorIndex::build(entries, &self.embedding_model, &stamp)?;
        index.persist(&self.index_path).await?;

        let report = IngestReport {
            documents: documents.len(),
            chunks: index.len(),
            dims: index.dims(),
            reused: false,
        };
        tracing::info!(
            "Index built: {} chunks, dims {}, persisted to {}",
            report.chunks,
            report.dims,
            self.index_path.display()
        );
        self.install(index).await;
        Ok(report)
    }

    /// Answer a question from the indexed corpus.
    ///
    /// With a `session_id`, the question/answer exchange is appended to
    /// that session after generation succeeds; a failed generation
    /// appends nothing. Provider faults surface as the user-safe apology
    /// string, never the raw error.
    pub async fn ask(
        &self,
        question: &str,
        session_id: Option<&str>,
    ) -> Result<Answer, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidConfig(
                "question must not be empty".to_string(),
            ));
        }

        // Resolve the session up front so a bad id fails before the
        // (paid) provider calls.
        if let Some(session_id) = session_id {
            self.history.get_session(session_id).await?;
        }

        let index = self
            .index_slot
            .read()
            .await
            .clone()
            .ok_or(RagError::IndexNotReady)?;

        let question_input = vec![question.to_string()];
        let query = self
            .embed_with_timeout(&question_input)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RagError::EmbeddingFailed("embedder returned no vector for the question".into())
            })?;

        let retrieved = self.retriever.select(&index, &query)?;

        if retrieved.is_empty() {
            tracing::info!("No chunk cleared the similarity threshold; returning fallback");
            let answer = self.prompt.fallback_answer().to_string();
            if let Some(session_id) = session_id {
                self.history
                    .append_exchange(session_id, question, &answer)
                    .await?;
            }
            return Ok(Answer {
                answer,
                sources: Vec::new(),
            });
        }

        let prompt = self.prompt.build(&retrieved, question);
        let request = {
            let mut req = ChatRequest::new(vec![ChatMessage::user(prompt)]);
            req.temperature = self.generation.temperature;
            req.max_tokens = self.generation.max_tokens;
            req
        };

        let answer = match self.chat_with_timeout(request).await {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                tracing::error!("Generation failed: {}", err);
                return Ok(Answer {
                    answer: err.user_message().to_string(),
                    sources: Vec::new(),
                });
            }
        };

        if let Some(session_id) = session_id {
            self.history
                .append_exchange(session_id, question, &answer)
                .await?;
        }

        let mut sources = Vec::new();
        for scored in &retrieved {
            if !sources.contains(&scored.chunk.source) {
                sources.push(scored.chunk.source.clone());
            }
        }

        Ok(Answer { answer, sources })
    }

    async fn install(&self, index: VectorIndex) {
        *self.index_slot.write().await = Some(Arc::new(index));
    }

    /// Drop the in-memory index. The persisted file stays on disk for
    /// the next startup.
    pub async fn shutdown(&self) {
        *self.index_slot.write().await = None;
    }

    async fn embed_with_timeout(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let limit = Duration::from_secs(self.generation.request_timeout_secs);
        match tokio::time::timeout(limit, self.provider.embed(inputs, &self.embedding_model)).await
        {
            Ok(result) => result,
            Err(_) => Err(RagError::EmbeddingFailed(format!(
                "embedding timed out after {}s",
                limit.as_secs()
            ))),
        }
    }

    async fn chat_with_timeout(&self, request: ChatRequest) -> Result<String, RagError> {
        let limit = Duration::from_secs(self.generation.request_timeout_secs);
        match tokio::time::timeout(limit, self.provider.chat(request, &self.generation.model))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(RagError::GenerationFailed(format!(
                "generation timed out after {}s",
                limit.as_secs()
            ))),
        }
    }
}

/// Hash identifying the exact index a corpus + configuration would
/// produce. Any change in document text, chunking parameters, or the
/// embedding model changes the stamp and forces a rebuild.
fn corpus_stamp(
    documents: &[Document],
    chunking: &ChunkingConfig,
    embedding_model: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(embedding_model.as_bytes());
    hasher.update((chunking.chunk_size as u64).to_le_bytes());
    hasher.update((chunking.overlap as u64).to_le_bytes());
    for doc in documents {
        hasher.update(doc.source_label().as_bytes());
        hasher.update([0u8]);
        hasher.update((doc.text.len() as u64).to_le_bytes());
        hasher.update(doc.text.as_bytes());
    }
    hex::encode(hasher.finalize())
}

//! Retrieval-augmented generation pipeline.
//!
//! Ingest path: document -> chunker -> embedder -> vector index
//! (persisted to disk). Query path: question -> retriever -> prompt
//! builder -> generator, with an optional session append on success.

pub mod chunker;
pub mod index;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod similarity;
pub mod types;

pub use chunker::Chunker;
pub use index::{IndexEntry, IndexMeta, VectorIndex};
pub use pipeline::{Answer, IngestReport, RagPipeline};
pub use prompt::PromptBuilder;
pub use retriever::Retriever;
pub use types::{Chunk, Document, ScoredChunk};

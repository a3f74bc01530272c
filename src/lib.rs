//! Retrieval-augmented document chat backend.
//!
//! Ingests pre-extracted text documents into an embedded vector index
//! and answers questions grounded in the retrieved chunks, with
//! persisted conversation sessions.

pub mod core;
pub mod history;
pub mod llm;
pub mod logging;
pub mod rag;
pub mod state;

pub use crate::core::config::{AppConfig, AppPaths};
pub use crate::core::errors::RagError;
pub use crate::history::{HistoryStore, MessageRole};
pub use crate::llm::LlmProvider;
pub use crate::rag::{Answer, Document, IngestReport, RagPipeline};
pub use crate::state::AppState;

use serde::{Deserialize, Serialize};

/// An ingested document: immutable text plus source metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Pre-extracted text content.
    pub text: String,
    /// Origin identifier (file name, URL, ...).
    pub source: String,
    /// Page number for paginated sources.
    pub page: Option<u32>,
}

impl Document {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            page: None,
        }
    }

    /// Source label used for chunk citations, e.g. `report.pdf#p3`.
    pub fn source_label(&self) -> String {
        match self.page {
            Some(page) => format!("{}#p{}", self.source, page),
            None => self.source.clone(),
        }
    }
}

/// A window of document text with its citation back-reference.
///
/// `source` and `start_offset` point back into the originating document;
/// the chunk does not own the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// The text content.
    pub text: String,
    /// Source label of the originating document.
    pub source: String,
    /// Character offset of this window in the original text.
    pub start_offset: usize,
    /// Position of this chunk within its source.
    pub chunk_index: usize,
}

/// A retrieved chunk with its similarity score (higher = better).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

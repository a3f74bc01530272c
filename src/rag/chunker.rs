//! Fixed-window text chunker.
//!
//! Splits document text into overlapping character windows: window size
//! `chunk_size`, stride `chunk_size - overlap`. Consecutive chunks share
//! exactly `overlap` characters; the final chunk may be shorter. The
//! boundaries depend only on the input and the configuration.

use crate::core::config::ChunkingConfig;
use crate::core::errors::RagError;
use crate::rag::types::{Chunk, Document};

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Fails with `InvalidConfig` when `overlap >= chunk_size` or the
    /// window is empty.
    pub fn new(config: &ChunkingConfig) -> Result<Self, RagError> {
        config.validate()?;
        Ok(Self {
            chunk_size: config.chunk_size,
            overlap: config.overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split a document into overlapping windows.
    ///
    /// Offsets are in characters, so multi-byte text cannot split inside
    /// a code point. An empty document yields no chunks.
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        let source = document.source_label();
        let chars: Vec<char> = document.text.chars().collect();
        let total = chars.len();

        if total == 0 {
            return Vec::new();
        }

        let step = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        let mut chunk_index = 0;

        loop {
            let end = (start + self.chunk_size).min(total);
            let text: String = chars[start..end].iter().collect();

            chunks.push(Chunk {
                text,
                source: source.clone(),
                start_offset: start,
                chunk_index,
            });

            if end == total {
                break;
            }
            start += step;
            chunk_index += 1;
        }

        chunks
    }

    /// Split many documents, numbering chunks per source.
    pub fn split_all(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|doc| self.split(doc)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(chunk_size: usize, overlap: usize) -> Chunker {
        Chunker::new(&ChunkingConfig {
            chunk_size,
            overlap,
        })
        .expect("valid chunker config")
    }

    /// Rebuild the original text from chunk windows: first chunk whole,
    /// every later chunk minus its leading overlap.
    fn reconstruct(chunks: &[Chunk], overlap: usize) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(&chunk.text);
            } else {
                out.extend(chunk.text.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        let config = ChunkingConfig {
            chunk_size: 10,
            overlap: 10,
        };
        assert!(matches!(
            Chunker::new(&config),
            Err(RagError::InvalidConfig(_))
        ));
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let doc = Document::new("hello", "doc");
        let chunks = chunker(100, 10).split(&doc);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello");
        assert_eq!(chunks[0].start_offset, 0);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let doc = Document::new("", "doc");
        assert!(chunker(100, 10).split(&doc).is_empty());
    }

    #[test]
    fn consecutive_chunks_overlap_exactly() {
        let text: String = ('a'..='z').cycle().take(100).collect();
        let doc = Document::new(text, "doc");
        let chunks = chunker(30, 5).split(&doc);

        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].text.chars().collect();
            let next: Vec<char> = pair[1].text.chars().collect();
            let tail: String = prev[prev.len() - 5..].iter().collect();
            let head: String = next[..5].iter().collect();
            assert_eq!(tail, head);
            assert_eq!(pair[1].start_offset, pair[0].start_offset + 25);
        }
    }

    #[test]
    fn chunks_cover_the_whole_text() {
        let text: String = "The quick brown fox jumps over the lazy dog. ".repeat(12);
        let doc = Document::new(text.clone(), "doc");
        let chunks = chunker(80, 16).split(&doc);

        assert_eq!(reconstruct(&chunks, 16), text);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
        }
    }

    #[test]
    fn final_chunk_may_be_shorter() {
        let doc = Document::new("abcdefghij", "doc");
        let chunks = chunker(4, 1).split(&doc);
        let last = chunks.last().unwrap();
        assert!(last.text.chars().count() <= 4);
        assert_eq!(reconstruct(&chunks, 1), "abcdefghij");
    }

    #[test]
    fn boundaries_are_deterministic() {
        let text = "Paris is the capital of France. ".repeat(20);
        let doc = Document::new(text, "doc");
        let c = chunker(50, 10);
        let first = c.split(&doc);
        let second = c.split(&doc);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.start_offset, b.start_offset);
        }
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "géométrie élémentaire très répétée ".repeat(10);
        let doc = Document::new(text.clone(), "doc");
        let chunks = chunker(40, 8).split(&doc);
        assert_eq!(reconstruct(&chunks, 8), text);
    }

    #[test]
    fn page_number_reaches_the_citation_label() {
        let mut doc = Document::new("text", "report.pdf");
        doc.page = Some(3);
        let chunks = chunker(100, 10).split(&doc);
        assert_eq!(chunks[0].source, "report.pdf#p3");
    }
}

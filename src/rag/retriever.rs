//! Query-time retrieval policy over the vector index.
//!
//! `plain` takes the top-k by similarity. `diverse` over-fetches
//! `fetch_k` candidates and greedily re-ranks with a maximal-marginal-
//! relevance trade-off so near-duplicate chunks do not crowd out
//! complementary ones. Either way, candidates under the similarity
//! threshold never reach the prompt.

use crate::core::config::{RetrievalConfig, RetrievalMode};
use crate::core::errors::RagError;
use crate::rag::index::VectorIndex;
use crate::rag::similarity::cosine_similarity;
use crate::rag::types::ScoredChunk;

/// Relevance/diversity trade-off for diverse mode.
const MMR_LAMBDA: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct Retriever {
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(config: RetrievalConfig) -> Result<Self, RagError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Select up to `k` chunks for the prompt. An empty result means
    /// nothing in the corpus cleared the similarity threshold.
    pub fn select(
        &self,
        index: &VectorIndex,
        query: &[f32],
    ) -> Result<Vec<ScoredChunk>, RagError> {
        let pool_size = match self.config.mode {
            RetrievalMode::Plain => self.config.k,
            RetrievalMode::Diverse => self.config.fetch_k,
        };

        let candidates: Vec<(usize, f32)> = index
            .rank(query, pool_size)?
            .into_iter()
            .filter(|(_, score)| *score >= self.config.similarity_threshold)
            .collect();

        let picked = match self.config.mode {
            RetrievalMode::Plain => candidates,
            RetrievalMode::Diverse => mmr_select(index, &candidates, self.config.k),
        };

        Ok(picked
            .into_iter()
            .take(self.config.k)
            .map(|(idx, score)| ScoredChunk {
                chunk: index.entries()[idx].chunk.clone(),
                score,
            })
            .collect())
    }
}

/// Greedy maximal-marginal-relevance selection.
///
/// Candidates arrive sorted by relevance. The first pick is the most
/// relevant; each further pick maximizes
/// `lambda * relevance - (1 - lambda) * max_similarity_to_selected`.
/// Reported scores stay the original query relevance.
fn mmr_select(
    index: &VectorIndex,
    candidates: &[(usize, f32)],
    k: usize,
) -> Vec<(usize, f32)> {
    let mut remaining: Vec<(usize, f32)> = candidates.to_vec();
    let mut selected: Vec<(usize, f32)> = Vec::new();

    while selected.len() < k && !remaining.is_empty() {
        if selected.is_empty() {
            selected.push(remaining.remove(0));
            continue;
        }

        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (pos, (idx, relevance)) in remaining.iter().enumerate() {
            let candidate_embedding = &index.entries()[*idx].embedding;
            let max_sim = selected
                .iter()
                .map(|(sel_idx, _)| {
                    cosine_similarity(candidate_embedding, &index.entries()[*sel_idx].embedding)
                })
                .fold(f32::NEG_INFINITY, f32::max);

            let score = MMR_LAMBDA * relevance - (1.0 - MMR_LAMBDA) * max_sim;
            // strict > keeps the more relevant candidate on ties
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }
        selected.push(remaining.remove(best_pos));
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::index::IndexEntry;
    use crate::rag::types::Chunk;

    fn entry(text: &str, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            embedding,
            chunk: Chunk {
                text: text.to_string(),
                source: "doc".to_string(),
                start_offset: 0,
                chunk_index: 0,
            },
        }
    }

    fn index(entries: Vec<IndexEntry>) -> VectorIndex {
        VectorIndex::build(entries, "model", "hash").unwrap()
    }

    fn config(k: usize, fetch_k: usize, mode: RetrievalMode, threshold: f32) -> RetrievalConfig {
        RetrievalConfig {
            k,
            fetch_k,
            mode,
            similarity_threshold: threshold,
        }
    }

    #[test]
    fn plain_mode_returns_top_k_above_threshold() {
        let idx = index(vec![
            entry("best", vec![1.0, 0.0]),
            entry("good", vec![0.8, 0.6]),
            entry("unrelated", vec![0.0, 1.0]),
        ]);
        let retriever =
            Retriever::new(config(2, 2, RetrievalMode::Plain, 0.3)).unwrap();

        let results = retriever.select(&idx, &[1.0, 0.0]).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.text, "best");
        assert_eq!(results[1].chunk.text, "good");
    }

    #[test]
    fn threshold_can_filter_everything() {
        let idx = index(vec![
            entry("a", vec![0.0, 1.0]),
            entry("b", vec![0.0, 1.0]),
        ]);
        let retriever =
            Retriever::new(config(2, 2, RetrievalMode::Plain, 0.5)).unwrap();

        let results = retriever.select(&idx, &[1.0, 0.0]).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn diverse_mode_skips_near_duplicates() {
        // Two near-identical chunks plus one complementary chunk that is
        // still relevant to the query. Plain retrieval returns both
        // duplicates; diverse retrieval trades the second duplicate for
        // the complementary chunk.
        let idx = index(vec![
            entry("dup-1", vec![0.9, 0.1, 0.0]),
            entry("dup-2", vec![0.9, 0.1, 0.01]),
            entry("other", vec![0.55, 0.0, 0.6]),
        ]);

        let plain = Retriever::new(config(2, 3, RetrievalMode::Plain, 0.0)).unwrap();
        let diverse = Retriever::new(config(2, 3, RetrievalMode::Diverse, 0.0)).unwrap();
        let query = vec![1.0, 0.0, 0.0];

        let plain_texts: Vec<String> = plain
            .select(&idx, &query)
            .unwrap()
            .into_iter()
            .map(|r| r.chunk.text)
            .collect();
        assert_eq!(plain_texts, vec!["dup-1", "dup-2"]);

        let diverse_texts: Vec<String> = diverse
            .select(&idx, &query)
            .unwrap()
            .into_iter()
            .map(|r| r.chunk.text)
            .collect();
        assert_eq!(diverse_texts, vec!["dup-1", "other"]);
    }

    #[test]
    fn diverse_mode_never_exceeds_k() {
        let idx = index(vec![
            entry("a", vec![1.0, 0.0]),
            entry("b", vec![0.9, 0.1]),
            entry("c", vec![0.8, 0.2]),
        ]);
        let retriever =
            Retriever::new(config(2, 3, RetrievalMode::Diverse, 0.0)).unwrap();

        let results = retriever.select(&idx, &[1.0, 0.0]).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn reported_scores_are_query_relevance() {
        let idx = index(vec![
            entry("a", vec![1.0, 0.0]),
            entry("b", vec![0.6, 0.8]),
        ]);
        let retriever =
            Retriever::new(config(2, 2, RetrievalMode::Diverse, 0.0)).unwrap();

        let results = retriever.select(&idx, &[1.0, 0.0]).unwrap();
        assert!((results[0].score - 1.0).abs() < 1e-5);
        assert!((results[1].score - 0.6).abs() < 1e-5);
    }
}

//! Grounding prompt assembly.
//!
//! Renders retrieved chunks verbatim, in retrieval order, followed by
//! the question and a strict context-only instruction. The instruction
//! names the fallback sentence so the model can echo it exactly when the
//! context is insufficient; the pipeline additionally short-circuits to
//! the fallback when retrieval comes back empty, which is what makes the
//! byte-for-byte guarantee hold.

use crate::rag::types::ScoredChunk;

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    fallback_answer: String,
}

impl PromptBuilder {
    pub fn new(fallback_answer: impl Into<String>) -> Self {
        Self {
            fallback_answer: fallback_answer.into(),
        }
    }

    /// The canned answer for insufficient context, byte-exact.
    pub fn fallback_answer(&self) -> &str {
        &self.fallback_answer
    }

    /// Assemble the full grounding prompt.
    ///
    /// Chunk texts are embedded unmodified and keep their retrieval
    /// order; each block carries its source citation.
    pub fn build(&self, chunks: &[ScoredChunk], question: &str) -> String {
        let mut prompt = String::new();

        prompt.push_str(
            "You are a helpful assistant answering questions about the provided documents.\n",
        );
        prompt.push_str(
            "Use ONLY the context below to answer. Do not use outside knowledge.\n",
        );
        prompt.push_str(&format!(
            "If the context does not contain the answer, reply with exactly this sentence and nothing else:\n{}\n\n",
            self.fallback_answer
        ));

        prompt.push_str("Context:\n");
        for (i, scored) in chunks.iter().enumerate() {
            prompt.push_str(&format!(
                "[{}] (Source: {})\n{}\n\n",
                i + 1,
                scored.chunk.source,
                scored.chunk.text
            ));
        }

        prompt.push_str(&format!("Question: {}\nAnswer:", question));
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DEFAULT_FALLBACK_ANSWER;
    use crate::rag::types::Chunk;

    fn scored(text: &str, source: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                text: text.to_string(),
                source: source.to_string(),
                start_offset: 0,
                chunk_index: 0,
            },
            score: 0.9,
        }
    }

    #[test]
    fn chunks_appear_verbatim_and_in_order() {
        let builder = PromptBuilder::new(DEFAULT_FALLBACK_ANSWER);
        let chunks = vec![
            scored("IFRS is a set of accounting standards.", "ifrs.pdf"),
            scored("The standards are issued by the IASB.", "ifrs.pdf"),
        ];

        let prompt = builder.build(&chunks, "What is IFRS?");

        let first = prompt.find("IFRS is a set of accounting standards.").unwrap();
        let second = prompt.find("The standards are issued by the IASB.").unwrap();
        assert!(first < second);
        assert!(prompt.contains("(Source: ifrs.pdf)"));
        assert!(prompt.ends_with("Question: What is IFRS?\nAnswer:"));
    }

    #[test]
    fn instruction_names_the_fallback_sentence() {
        let builder = PromptBuilder::new("No idea, sorry.");
        let prompt = builder.build(&[], "Anything?");
        assert!(prompt.contains("No idea, sorry."));
        assert!(prompt.contains("ONLY the context below"));
    }

    #[test]
    fn question_is_not_rewritten() {
        let builder = PromptBuilder::new(DEFAULT_FALLBACK_ANSWER);
        let question = "Qu'est-ce que l'IFRS ?";
        let prompt = builder.build(&[scored("texte", "doc")], question);
        assert!(prompt.contains(question));
    }
}

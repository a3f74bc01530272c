//! End-to-end pipeline tests with a deterministic in-process provider.
//!
//! The stub embedder scores text on fixed topic axes (keyword counts),
//! so retrieval behavior is fully predictable without a model server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use docbot::core::config::{AppConfig, AppPaths, DEFAULT_FALLBACK_ANSWER};
use docbot::core::errors::RagError;
use docbot::history::{HistoryStore, MessageRole};
use docbot::llm::{ChatRequest, LlmProvider};
use docbot::rag::{Document, RagPipeline};

const CANNED_REPLY: &str =
    "IFRS stands for International Financial Reporting Standards.";
const APOLOGY: &str = "Sorry, there was a problem processing your question.";

/// Keyword axes standing in for embedding dimensions.
const TOPIC_AXES: &[&[&str]] = &[
    &["ifrs", "accounting", "standards", "iasb", "financial", "reporting"],
    &["france", "paris", "capital", "city"],
    &["weather", "rain", "sunny"],
];

struct StubProvider {
    reply: String,
    fail_chat: bool,
    last_prompt: Mutex<Option<String>>,
    embed_calls: AtomicUsize,
}

impl StubProvider {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            fail_chat: false,
            last_prompt: Mutex::new(None),
            embed_calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: String::new(),
            fail_chat: true,
            last_prompt: Mutex::new(None),
            embed_calls: AtomicUsize::new(0),
        })
    }

    fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }

    fn embed_call_count(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    fn embed_text(text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        TOPIC_AXES
            .iter()
            .map(|words| {
                words
                    .iter()
                    .filter(|word| lowered.contains(*word))
                    .count() as f32
            })
            .collect()
    }
}

#[async_trait]
impl LlmProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn health_check(&self) -> Result<bool, RagError> {
        Ok(true)
    }

    async fn chat(&self, request: ChatRequest, _model_id: &str) -> Result<String, RagError> {
        if self.fail_chat {
            return Err(RagError::GenerationFailed("stub provider offline".into()));
        }
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        *self.last_prompt.lock().unwrap() = Some(prompt);
        Ok(self.reply.clone())
    }

    async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, RagError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(inputs.iter().map(|text| Self::embed_text(text)).collect())
    }
}

struct TestEnv {
    _tmp: TempDir,
    paths: AppPaths,
    history: HistoryStore,
    pipeline: RagPipeline,
}

async fn setup(provider: Arc<StubProvider>) -> TestEnv {
    let tmp = TempDir::new().expect("temp dir");
    let paths = AppPaths::from_data_dir(tmp.path().join("data"));
    let config = AppConfig::default();
    let history = HistoryStore::new(paths.history_db_path.clone())
        .await
        .expect("history store");
    let pipeline = RagPipeline::new(&config, &paths, provider, history.clone())
        .expect("pipeline");
    TestEnv {
        _tmp: tmp,
        paths,
        history,
        pipeline,
    }
}

fn ifrs_corpus() -> Vec<Document> {
    vec![
        Document::new(
            "IFRS stands for International Financial Reporting Standards, \
             a common set of accounting rules for public companies.",
            "ifrs-overview.txt",
        ),
        Document::new(
            "IFRS reporting is mandatory for listed companies in many \
             jurisdictions around the world.",
            "ifrs-adoption.txt",
        ),
        Document::new(
            "The IASB issues and maintains the IFRS accounting standards.",
            "iasb.txt",
        ),
    ]
}

#[tokio::test]
async fn on_topic_question_is_grounded_in_retrieved_chunks() {
    let provider = StubProvider::new(CANNED_REPLY);
    let env = setup(provider.clone()).await;
    let corpus = ifrs_corpus();

    let report = env.pipeline.ingest(&corpus).await.unwrap();
    assert_eq!(report.documents, 3);
    assert_eq!(report.chunks, 3);
    assert!(!report.reused);

    let session_id = env.history.create_session(None).await.unwrap();
    let answer = env
        .pipeline
        .ask("What is IFRS?", Some(&session_id))
        .await
        .unwrap();

    assert_eq!(answer.answer, CANNED_REPLY);
    assert_ne!(answer.answer, DEFAULT_FALLBACK_ANSWER);
    assert!(answer.sources.contains(&"ifrs-overview.txt".to_string()));

    // Every retrieved chunk appears verbatim in the generator prompt.
    let prompt = provider.last_prompt().expect("generator was called");
    for doc in &corpus {
        assert!(prompt.contains(&doc.text), "prompt missing chunk from {}", doc.source);
    }
    assert!(prompt.contains("What is IFRS?"));

    let messages = env.history.get_messages(&session_id, 0).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, "user");
    assert_eq!(messages[0].content, "What is IFRS?");
    assert_eq!(messages[1].role, "bot");
    assert_eq!(messages[1].content, CANNED_REPLY);
}

#[tokio::test]
async fn off_topic_question_returns_the_exact_fallback_sentence() {
    let provider = StubProvider::new(CANNED_REPLY);
    let env = setup(provider.clone()).await;
    env.pipeline.ingest(&ifrs_corpus()).await.unwrap();

    let answer = env
        .pipeline
        .ask("What is the capital of France?", None)
        .await
        .unwrap();

    assert_eq!(answer.answer, DEFAULT_FALLBACK_ANSWER);
    assert!(answer.sources.is_empty());
    // The generator is never consulted for a fallback answer.
    assert!(provider.last_prompt().is_none());
}

#[tokio::test]
async fn ask_before_ingest_reports_index_not_ready() {
    let provider = StubProvider::new(CANNED_REPLY);
    let env = setup(provider).await;

    let err = env.pipeline.ask("What is IFRS?", None).await.unwrap_err();
    assert!(matches!(err, RagError::IndexNotReady));
    assert!(err.is_transient());
}

#[tokio::test]
async fn ingesting_nothing_fails_with_empty_corpus() {
    let provider = StubProvider::new(CANNED_REPLY);
    let env = setup(provider).await;

    let err = env.pipeline.ingest(&[]).await.unwrap_err();
    assert!(matches!(err, RagError::EmptyCorpus));
    assert!(!env.pipeline.is_ready().await);
}

#[tokio::test]
async fn unchanged_corpus_reuses_the_persisted_index() {
    let provider = StubProvider::new(CANNED_REPLY);
    let env = setup(provider.clone()).await;
    let corpus = ifrs_corpus();

    env.pipeline.ingest(&corpus).await.unwrap();
    let builds = provider.embed_call_count();
    assert!(builds > 0);

    // A fresh pipeline over the same data dir finds the stamp intact.
    let config = AppConfig::default();
    let second = RagPipeline::new(&config, &env.paths, provider.clone(), env.history.clone())
        .unwrap();
    let report = second.ingest(&corpus).await.unwrap();
    assert!(report.reused);
    assert_eq!(provider.embed_call_count(), builds);

    // Changing a document changes the stamp and forces a rebuild.
    let mut changed = corpus.clone();
    changed[0].text.push_str(" Amended in 2024.");
    let report = second.ingest(&changed).await.unwrap();
    assert!(!report.reused);
    assert!(provider.embed_call_count() > builds);
}

#[tokio::test]
async fn generation_failure_yields_apology_and_no_session_writes() {
    let provider = StubProvider::failing();
    let env = setup(provider).await;
    env.pipeline.ingest(&ifrs_corpus()).await.unwrap();

    let session_id = env.history.create_session(None).await.unwrap();
    let answer = env
        .pipeline
        .ask("What is IFRS?", Some(&session_id))
        .await
        .unwrap();

    assert_eq!(answer.answer, APOLOGY);
    let messages = env.history.get_messages(&session_id, 0).await.unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn asking_into_a_deleted_session_fails_before_generation() {
    let provider = StubProvider::new(CANNED_REPLY);
    let env = setup(provider.clone()).await;
    env.pipeline.ingest(&ifrs_corpus()).await.unwrap();

    let session_id = env.history.create_session(None).await.unwrap();
    env.history.soft_delete_session(&session_id).await.unwrap();

    let err = env
        .pipeline
        .ask("What is IFRS?", Some(&session_id))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::SessionNotFound(_)));
    assert!(provider.last_prompt().is_none());
}

#[tokio::test]
async fn concurrent_writers_keep_their_own_message_order() {
    let provider = StubProvider::new(CANNED_REPLY);
    let env = setup(provider).await;
    let session_id = env.history.create_session(None).await.unwrap();

    let mut handles = Vec::new();
    for writer in 0..2 {
        let history = env.history.clone();
        let session_id = session_id.clone();
        handles.push(tokio::spawn(async move {
            for seq in 0..25 {
                history
                    .append_message(
                        &session_id,
                        MessageRole::User,
                        &format!("w{}-{}", writer, seq),
                    )
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let messages = env.history.get_messages(&session_id, 0).await.unwrap();
    assert_eq!(messages.len(), 50);

    // Within each writer, issue order is preserved.
    for writer in 0..2 {
        let prefix = format!("w{}-", writer);
        let seqs: Vec<usize> = messages
            .iter()
            .filter(|m| m.content.starts_with(&prefix))
            .map(|m| m.content[prefix.len()..].parse().unwrap())
            .collect();
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        assert_eq!(seqs, sorted);
    }
}

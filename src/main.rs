use std::env;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;

use docbot::core::config::{AppConfig, AppPaths};
use docbot::rag::Document;
use docbot::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = AppPaths::new();
    docbot::logging::init(&paths);

    let config_path = env::var("DOCBOT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("docbot.toml"));
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let docs_dir = PathBuf::from(&config.ingest.docs_dir);
    let state = AppState::initialize(config, paths).await?;

    let documents = load_text_documents(&docs_dir)?;
    if documents.is_empty() {
        tracing::warn!(
            "No .txt/.md documents found in {}; questions will fail until documents are ingested",
            docs_dir.display()
        );
    } else {
        let report = state.pipeline.ingest(&documents).await?;
        if report.reused {
            tracing::info!("Reused persisted index ({} chunks)", report.chunks);
        } else {
            tracing::info!(
                "Indexed {} documents into {} chunks",
                report.documents,
                report.chunks
            );
        }
    }

    let session_id = state
        .history
        .create_session(Some("terminal".to_string()))
        .await?;

    println!("docbot ready. Ask a question ('exit' to quit, '/sessions', '/history').");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else { break };
        let input = line?.trim().to_string();
        if input.is_empty() {
            continue;
        }

        match input.as_str() {
            "exit" | "quit" => break,
            "/sessions" => {
                for session in state.history.list_sessions().await? {
                    println!(
                        "{}  {}  ({} messages)",
                        session.id,
                        session.title.as_deref().unwrap_or("-"),
                        session.message_count
                    );
                }
            }
            "/history" => {
                for message in state.history.get_messages(&session_id, 0).await? {
                    println!("[{}] {}", message.role, message.content);
                }
            }
            question => {
                tracing::info!("Question: {}", question);
                match state.pipeline.ask(question, Some(&session_id)).await {
                    Ok(answer) => {
                        println!("{}", answer.answer);
                        if !answer.sources.is_empty() {
                            println!("(sources: {})", answer.sources.join(", "));
                        }
                    }
                    Err(err) => {
                        tracing::error!("Failed to answer: {}", err);
                        println!("{}", err.user_message());
                    }
                }
            }
        }
    }

    state.shutdown().await;
    Ok(())
}

/// Read pre-extracted text documents (.txt/.md) from a directory.
/// Other formats are out of scope and skipped.
fn load_text_documents(dir: &Path) -> anyhow::Result<Vec<Document>> {
    let mut documents = Vec::new();
    if !dir.exists() {
        return Ok(documents);
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    paths.sort();

    for path in paths {
        let is_text = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("txt") | Some("md")
        );
        if !is_text {
            continue;
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let source = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        documents.push(Document::new(text, source));
    }

    Ok(documents)
}

//! In-memory vector index with a SQLite on-disk representation.
//!
//! Search is brute-force cosine over all entries; ranking ties are broken
//! by insertion order. The persisted file carries a format version, the
//! embedding model identifier, the dimensionality, and a corpus content
//! hash so `load` can fail fast instead of returning silently wrong
//! neighbors.
//!
//! The index is append-only in spirit: once built it is never mutated,
//! only replaced by a full rebuild.

use std::cmp::Ordering;
use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::core::errors::RagError;
use crate::rag::similarity::{cosine_similarity, embedding_from_blob, embedding_to_blob};
use crate::rag::types::{Chunk, ScoredChunk};

/// Bumped whenever the on-disk layout changes.
pub const INDEX_FORMAT_VERSION: i64 = 1;

/// Version stamp persisted alongside the entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    pub embedding_model: String,
    pub dims: usize,
    /// SHA-256 over the source documents and chunking parameters.
    pub corpus_hash: String,
    pub created_at: String,
}

/// An embedding paired with its chunk. Owned exclusively by the index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub embedding: Vec<f32>,
    pub chunk: Chunk,
}

pub struct VectorIndex {
    meta: IndexMeta,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Build from scratch. Fails with `EmptyCorpus` on no entries and
    /// `EmbeddingDimensionMismatch` when vectors disagree on length.
    pub fn build(
        entries: Vec<IndexEntry>,
        embedding_model: &str,
        corpus_hash: &str,
    ) -> Result<Self, RagError> {
        if entries.is_empty() {
            return Err(RagError::EmptyCorpus);
        }

        let dims = entries[0].embedding.len();
        if dims == 0 {
            return Err(RagError::EmbeddingFailed(
                "embedder produced an empty vector".to_string(),
            ));
        }
        for entry in &entries {
            if entry.embedding.len() != dims {
                return Err(RagError::EmbeddingDimensionMismatch {
                    expected: dims,
                    actual: entry.embedding.len(),
                });
            }
        }

        Ok(Self {
            meta: IndexMeta {
                embedding_model: embedding_model.to_string(),
                dims,
                corpus_hash: corpus_hash.to_string(),
                created_at: chrono::Utc::now().to_rfc3339(),
            },
            entries,
        })
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn dims(&self) -> usize {
        self.meta.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Rank all entries against `query`, highest similarity first,
    /// truncated to `limit`. Equal scores keep insertion order (stable
    /// sort over entries scored in insertion order).
    pub fn rank(&self, query: &[f32], limit: usize) -> Result<Vec<(usize, f32)>, RagError> {
        if query.len() != self.meta.dims {
            return Err(RagError::EmbeddingDimensionMismatch {
                expected: self.meta.dims,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (idx, cosine_similarity(query, &entry.embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    /// Nearest-neighbor search: up to `k` chunks, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, RagError> {
        let ranked = self.rank(query, k)?;
        Ok(ranked
            .into_iter()
            .map(|(idx, score)| ScoredChunk {
                chunk: self.entries[idx].chunk.clone(),
                score,
            })
            .collect())
    }

    /// Write the index to a SQLite file, replacing any previous file.
    pub async fn persist(&self, path: &Path) -> Result<(), RagError> {
        remove_index_files(path);

        let pool = open_pool(path, true).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(RagError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                source TEXT NOT NULL,
                start_offset INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                embedding BLOB NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(RagError::internal)?;

        let mut tx = pool.begin().await.map_err(RagError::internal)?;

        for (key, value) in [
            ("format_version", INDEX_FORMAT_VERSION.to_string()),
            ("embedding_model", self.meta.embedding_model.clone()),
            ("dims", self.meta.dims.to_string()),
            ("corpus_hash", self.meta.corpus_hash.clone()),
            ("created_at", self.meta.created_at.clone()),
        ] {
            sqlx::query("INSERT OR REPLACE INTO index_meta (key, value) VALUES (?1, ?2)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await
                .map_err(RagError::internal)?;
        }

        for entry in &self.entries {
            sqlx::query(
                "INSERT INTO index_entries (content, source, start_offset, chunk_index, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&entry.chunk.text)
            .bind(&entry.chunk.source)
            .bind(entry.chunk.start_offset as i64)
            .bind(entry.chunk.chunk_index as i64)
            .bind(embedding_to_blob(&entry.embedding))
            .execute(&mut *tx)
            .await
            .map_err(RagError::internal)?;
        }

        tx.commit().await.map_err(RagError::internal)?;
        pool.close().await;
        Ok(())
    }

    /// Read an index back from disk.
    ///
    /// Fails with `IncompatibleIndexVersion` on an unknown format
    /// version, missing metadata, or entries that disagree with the
    /// recorded dimensionality.
    pub async fn load(path: &Path) -> Result<Self, RagError> {
        if !path.exists() {
            return Err(RagError::Internal(format!(
                "index file not found: {}",
                path.display()
            )));
        }

        let pool = open_pool(path, false).await?;
        let result = Self::load_from_pool(&pool).await;
        pool.close().await;
        result
    }

    async fn load_from_pool(pool: &SqlitePool) -> Result<Self, RagError> {
        let meta_rows = sqlx::query("SELECT key, value FROM index_meta")
            .fetch_all(pool)
            .await
            .map_err(|e| RagError::IncompatibleIndexVersion(e.to_string()))?;

        let mut format_version = None;
        let mut embedding_model = None;
        let mut dims = None;
        let mut corpus_hash = None;
        let mut created_at = None;

        for row in &meta_rows {
            let key: String = row.get("key");
            let value: String = row.get("value");
            match key.as_str() {
                "format_version" => format_version = value.parse::<i64>().ok(),
                "embedding_model" => embedding_model = Some(value),
                "dims" => dims = value.parse::<usize>().ok(),
                "corpus_hash" => corpus_hash = Some(value),
                "created_at" => created_at = Some(value),
                _ => {}
            }
        }

        let format_version = format_version.ok_or_else(|| {
            RagError::IncompatibleIndexVersion("missing format_version stamp".to_string())
        })?;
        if format_version != INDEX_FORMAT_VERSION {
            return Err(RagError::IncompatibleIndexVersion(format!(
                "format version {} (supported: {})",
                format_version, INDEX_FORMAT_VERSION
            )));
        }

        let meta = IndexMeta {
            embedding_model: embedding_model.ok_or_else(|| {
                RagError::IncompatibleIndexVersion("missing embedding_model stamp".to_string())
            })?,
            dims: dims.ok_or_else(|| {
                RagError::IncompatibleIndexVersion("missing dims stamp".to_string())
            })?,
            corpus_hash: corpus_hash.ok_or_else(|| {
                RagError::IncompatibleIndexVersion("missing corpus_hash stamp".to_string())
            })?,
            created_at: created_at.unwrap_or_default(),
        };

        let rows = sqlx::query(
            "SELECT content, source, start_offset, chunk_index, embedding
             FROM index_entries ORDER BY id ASC",
        )
        .fetch_all(pool)
        .await
        .map_err(|e| RagError::IncompatibleIndexVersion(e.to_string()))?;

        if rows.is_empty() {
            return Err(RagError::EmptyCorpus);
        }

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            if blob.len() != meta.dims * 4 {
                return Err(RagError::IncompatibleIndexVersion(format!(
                    "entry blob of {} bytes does not match dims {}",
                    blob.len(),
                    meta.dims
                )));
            }
            let start_offset: i64 = row.get("start_offset");
            let chunk_index: i64 = row.get("chunk_index");
            entries.push(IndexEntry {
                embedding: embedding_from_blob(&blob),
                chunk: Chunk {
                    text: row.get("content"),
                    source: row.get("source"),
                    start_offset: start_offset as usize,
                    chunk_index: chunk_index as usize,
                },
            });
        }

        Ok(Self { meta, entries })
    }
}

async fn open_pool(path: &Path, create: bool) -> Result<SqlitePool, RagError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(RagError::internal)
}

fn remove_index_files(path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(suffix);
        let _ = std::fs::remove_file(std::path::PathBuf::from(candidate));
    }
}

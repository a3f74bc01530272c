//! Conversation session persistence.
//!
//! Sessions own an ordered sequence of messages. Deletion is soft: the
//! row stays, the `deleted` flag flips, and every subsequent operation
//! on the session fails with `SessionNotFound`. Message order is the
//! autoincrement rowid, i.e. arrival order; appends run inside a
//! transaction so two near-simultaneous writers to the same session
//! serialize instead of interleaving.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::core::errors::RagError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Bot,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Bot => "bot",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub message_count: i64,
    #[serde(default)]
    pub preview: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: i64,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, RagError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(RagError::internal)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                title TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_session_id ON messages(session_id)")
            .execute(&self.pool)
            .await
            .map_err(RagError::internal)?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn create_session(&self, title: Option<String>) -> Result<String, RagError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO sessions (id, title, created_at, updated_at, deleted)
             VALUES (?1, ?2, ?3, ?4, 0)",
        )
        .bind(&session_id)
        .bind(title)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        Ok(session_id)
    }

    /// Fetch an active session. Absent and soft-deleted sessions are
    /// indistinguishable to callers: both are `SessionNotFound`.
    pub async fn get_session(&self, session_id: &str) -> Result<SessionInfo, RagError> {
        let row = sqlx::query(
            "SELECT id, title, created_at, updated_at,
                    (SELECT COUNT(*) FROM messages WHERE session_id = sessions.id) AS msg_count
             FROM sessions
             WHERE id = ?1 AND deleted = 0",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RagError::internal)?;

        let row = row.ok_or_else(|| RagError::SessionNotFound(session_id.to_string()))?;
        Ok(SessionInfo {
            id: row.get("id"),
            title: row.try_get("title").unwrap_or(None),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            message_count: row.get("msg_count"),
            preview: None,
        })
    }

    /// Active sessions, most recently touched first. Soft-deleted
    /// sessions never reappear here.
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>, RagError> {
        let rows = sqlx::query(
            "SELECT s.id, s.title, s.created_at, s.updated_at,
                    COUNT(m.id) AS msg_count,
                    (SELECT content FROM messages
                     WHERE session_id = s.id ORDER BY id DESC LIMIT 1) AS preview
             FROM sessions s
             LEFT JOIN messages m ON s.id = m.session_id
             WHERE s.deleted = 0
             GROUP BY s.id
             ORDER BY s.updated_at DESC
             LIMIT 100",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::internal)?;

        Ok(rows
            .into_iter()
            .map(|row| SessionInfo {
                id: row.get("id"),
                title: row.try_get("title").unwrap_or(None),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
                message_count: row.get("msg_count"),
                preview: row.try_get("preview").unwrap_or(None),
            })
            .collect())
    }

    pub async fn rename_session(&self, session_id: &str, title: &str) -> Result<(), RagError> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE sessions SET title = ?1, updated_at = ?2 WHERE id = ?3 AND deleted = 0",
        )
        .bind(title)
        .bind(now)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        if result.rows_affected() == 0 {
            return Err(RagError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    /// Flip the deleted flag. The session and its messages stay on disk
    /// but become invisible to every other operation.
    pub async fn soft_delete_session(&self, session_id: &str) -> Result<(), RagError> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE sessions SET deleted = 1, updated_at = ?1 WHERE id = ?2 AND deleted = 0",
        )
        .bind(now)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        if result.rows_affected() == 0 {
            return Err(RagError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    /// Append one message. Never creates the session implicitly.
    ///
    /// The session touch runs first so the transaction starts with a
    /// write: concurrent appenders then queue on SQLite's write lock
    /// instead of racing a read-to-write upgrade.
    pub async fn append_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<i64, RagError> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.map_err(RagError::internal)?;

        let touched =
            sqlx::query("UPDATE sessions SET updated_at = ?1 WHERE id = ?2 AND deleted = 0")
                .bind(&now)
                .bind(session_id)
                .execute(&mut *tx)
                .await
                .map_err(RagError::internal)?;
        if touched.rows_affected() == 0 {
            return Err(RagError::SessionNotFound(session_id.to_string()));
        }

        let result = sqlx::query(
            "INSERT INTO messages (session_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(RagError::internal)?;

        tx.commit().await.map_err(RagError::internal)?;
        Ok(result.last_insert_rowid())
    }

    /// Append a question/answer pair in one transaction, so a session
    /// never ends up with a question missing its answer.
    pub async fn append_exchange(
        &self,
        session_id: &str,
        question: &str,
        answer: &str,
    ) -> Result<(), RagError> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.map_err(RagError::internal)?;

        let touched =
            sqlx::query("UPDATE sessions SET updated_at = ?1 WHERE id = ?2 AND deleted = 0")
                .bind(&now)
                .bind(session_id)
                .execute(&mut *tx)
                .await
                .map_err(RagError::internal)?;
        if touched.rows_affected() == 0 {
            return Err(RagError::SessionNotFound(session_id.to_string()));
        }

        for (role, content) in [(MessageRole::User, question), (MessageRole::Bot, answer)] {
            sqlx::query(
                "INSERT INTO messages (session_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(session_id)
            .bind(role.as_str())
            .bind(content)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(RagError::internal)?;
        }

        tx.commit().await.map_err(RagError::internal)?;
        Ok(())
    }

    /// Messages in arrival order. `limit > 0` returns the most recent
    /// `limit` messages, still oldest-first; `limit <= 0` returns all.
    pub async fn get_messages(
        &self,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<HistoryMessage>, RagError> {
        self.get_session(session_id).await?;

        let rows = if limit > 0 {
            sqlx::query(
                "SELECT * FROM (SELECT * FROM messages WHERE session_id = ?1
                 ORDER BY id DESC LIMIT ?2) ORDER BY id ASC",
            )
            .bind(session_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(RagError::internal)?
        } else {
            sqlx::query("SELECT * FROM messages WHERE session_id = ?1 ORDER BY id ASC")
                .bind(session_id)
                .fetch_all(&self.pool)
                .await
                .map_err(RagError::internal)?
        };

        Ok(rows
            .into_iter()
            .map(|row| HistoryMessage {
                id: row.get("id"),
                session_id: row.get("session_id"),
                role: row.get("role"),
                content: row.get("content"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

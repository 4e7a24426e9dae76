//! Per-user store provisioning and message persistence.
//!
//! `StoreFactory` provisions one SQLite file per user id; `UserStore` is a
//! handle scoped to that namespace. Cross-user isolation is physical: no
//! connection to another user's file is ever opened through a handle.
//! Every operation opens its own connection, performs one transactional
//! unit of work, and releases it on every exit path.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use parley_core::error::ParleyError;
use parley_core::types::{ChatRecord, Role, StoredMessage};

use crate::migrations;

/// Factory for per-user namespaces, keyed by user identifier.
///
/// Deliberately not a shared connection pool: a handle for user A holds no
/// resource that could ever touch user B's data.
#[derive(Debug, Clone)]
pub struct StoreFactory {
    base_dir: PathBuf,
}

impl StoreFactory {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Idempotently provision the namespace for `user_id` and return a
    /// handle scoped to it.
    ///
    /// The first call creates the database file and schema; later calls
    /// are no-ops beyond returning a usable handle.
    pub fn open(&self, user_id: &str) -> Result<UserStore, ParleyError> {
        validate_user_id(user_id)?;
        std::fs::create_dir_all(&self.base_dir)?;

        let path = self.base_dir.join(format!("{}.db", user_id));
        let existed = path.exists();

        let conn = open_connection(&path)?;
        migrations::run_migrations(&conn)?;

        if !existed {
            info!(user = %user_id, path = %path.display(), "User namespace provisioned");
        } else {
            debug!(user = %user_id, "User namespace opened");
        }

        Ok(UserStore {
            user_id: user_id.to_string(),
            path,
        })
    }
}

/// Handle to one user's namespace.
///
/// Holds no open connection; each operation connects, runs one
/// transactional unit of work, and disconnects.
#[derive(Debug, Clone)]
pub struct UserStore {
    user_id: String,
    path: PathBuf,
}

impl UserStore {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Insert one message at the next sequence position for `chat_id`.
    ///
    /// A duplicate `message_id` raises `ParleyError::DuplicateMessage` and
    /// rolls the transaction back; no partial write is visible.
    pub fn append(
        &self,
        chat_id: &str,
        message_id: &str,
        content: &str,
        role: Role,
        metadata: Option<&serde_json::Value>,
    ) -> Result<(), ParleyError> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction()
            .map_err(|e| storage_err("begin transaction", &self.user_id, e))?;

        let meta_text = metadata.map(|v| v.to_string());
        tx.execute(
            "INSERT INTO messages (chat_id, message_id, content, role, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![chat_id, message_id, content, role.to_string(), meta_text],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                warn!(user = %self.user_id, chat = %chat_id, message = %message_id,
                      "Duplicate message id rejected");
                ParleyError::DuplicateMessage(message_id.to_string())
            } else {
                storage_err("append message", &self.user_id, e)
            }
        })?;

        tx.commit()
            .map_err(|e| storage_err("commit append", &self.user_id, e))?;
        Ok(())
    }

    /// Create the chat row if it does not exist yet.
    ///
    /// Existing rows are left untouched; a chat's title, creation time,
    /// and mode tag never change after creation.
    pub fn ensure_chat(&self, chat_id: &str, title: &str, mode: &str) -> Result<(), ParleyError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR IGNORE INTO chats (id, title, created_at, mode)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![chat_id, title, Utc::now().to_rfc3339(), mode],
        )
        .map_err(|e| storage_err("ensure chat", &self.user_id, e))?;
        Ok(())
    }

    /// Fetch a chat record by id.
    pub fn chat(&self, chat_id: &str) -> Result<Option<ChatRecord>, ParleyError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT id, title, created_at, mode FROM chats WHERE id = ?1")
            .map_err(|e| storage_err("prepare chat lookup", &self.user_id, e))?;

        let mut rows = stmt
            .query_map(rusqlite::params![chat_id], |row| {
                Ok(ChatRecord {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    created_at: row.get(2)?,
                    mode: row.get(3)?,
                })
            })
            .map_err(|e| storage_err("chat lookup", &self.user_id, e))?;

        match rows.next() {
            Some(row) => Ok(Some(
                row.map_err(|e| storage_err("chat lookup", &self.user_id, e))?,
            )),
            None => Ok(None),
        }
    }

    /// All messages for a chat in insertion order.
    ///
    /// An unknown chat yields an empty vec, never an error.
    pub fn history(&self, chat_id: &str) -> Result<Vec<StoredMessage>, ParleyError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT seq, chat_id, message_id, content, role, metadata
                 FROM messages WHERE chat_id = ?1 ORDER BY seq ASC",
            )
            .map_err(|e| storage_err("prepare history", &self.user_id, e))?;

        let rows = stmt
            .query_map(rusqlite::params![chat_id], |row| Ok(map_message_row(row)))
            .map_err(|e| storage_err("fetch history", &self.user_id, e))?;

        let mut messages = Vec::new();
        for row in rows {
            let message = row.map_err(|e| storage_err("fetch history", &self.user_id, e))??;
            messages.push(message);
        }
        Ok(messages)
    }

    /// Distinct chat identifiers ever written for this user.
    pub fn all_chat_ids(&self) -> Result<Vec<String>, ParleyError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT chat_id FROM messages ORDER BY chat_id")
            .map_err(|e| storage_err("prepare chat ids", &self.user_id, e))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| storage_err("fetch chat ids", &self.user_id, e))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|e| storage_err("fetch chat ids", &self.user_id, e))?);
        }
        Ok(ids)
    }

    /// Remove all messages for a chat.
    ///
    /// Idempotent; deleting a chat that was never written succeeds with
    /// zero rows affected.
    pub fn delete_history(&self, chat_id: &str) -> Result<usize, ParleyError> {
        let conn = self.connect()?;
        let deleted = conn
            .execute(
                "DELETE FROM messages WHERE chat_id = ?1",
                rusqlite::params![chat_id],
            )
            .map_err(|e| storage_err("delete history", &self.user_id, e))?;
        debug!(user = %self.user_id, chat = %chat_id, deleted, "Chat history deleted");
        Ok(deleted)
    }

    fn connect(&self) -> Result<Connection, ParleyError> {
        open_connection(&self.path)
    }
}

fn open_connection(path: &Path) -> Result<Connection, ParleyError> {
    let conn = Connection::open(path)
        .map_err(|e| ParleyError::Storage(format!("Failed to open database: {}", e)))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;",
    )
    .map_err(|e| ParleyError::Storage(format!("Failed to set pragmas: {}", e)))?;

    Ok(conn)
}

/// Reject user ids that would escape the namespace directory.
fn validate_user_id(user_id: &str) -> Result<(), ParleyError> {
    if user_id.is_empty() {
        return Err(ParleyError::Storage("User id must not be empty".to_string()));
    }
    if user_id.contains('/') || user_id.contains('\\') || user_id.contains("..") {
        return Err(ParleyError::Storage(format!(
            "User id contains path components: {}",
            user_id
        )));
    }
    Ok(())
}

fn map_message_row(row: &rusqlite::Row<'_>) -> Result<StoredMessage, ParleyError> {
    let role_text: String = row
        .get(4)
        .map_err(|e| ParleyError::Storage(e.to_string()))?;
    let role: Role = role_text
        .parse()
        .map_err(|e: String| ParleyError::Storage(e))?;

    let meta_text: Option<String> = row
        .get(5)
        .map_err(|e| ParleyError::Storage(e.to_string()))?;
    let metadata = match meta_text {
        Some(text) => Some(serde_json::from_str(&text)?),
        None => None,
    };

    Ok(StoredMessage {
        seq: row.get(0).map_err(|e| ParleyError::Storage(e.to_string()))?,
        chat_id: row.get(1).map_err(|e| ParleyError::Storage(e.to_string()))?,
        message_id: row.get(2).map_err(|e| ParleyError::Storage(e.to_string()))?,
        content: row.get(3).map_err(|e| ParleyError::Storage(e.to_string()))?,
        role,
        metadata,
    })
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn storage_err(operation: &str, user_id: &str, e: rusqlite::Error) -> ParleyError {
    ParleyError::Storage(format!("{} failed for user {}: {}", operation, user_id, e))
}

// =============================================================================
// Tests
// =============================================================================

//! Per-user namespace schema migrations.
//!
//! Applies the chats and messages tables plus the schema_migrations
//! tracking table. Every user database runs the same migration chain.

use rusqlite::Connection;
use tracing::debug;

use parley_core::error::ParleyError;

/// Run all pending migrations on a user namespace.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental
/// changes.
pub fn run_migrations(conn: &Connection) -> Result<(), ParleyError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| ParleyError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| ParleyError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        debug!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
///
/// `messages.seq` is the monotonic insertion sequence and the only
/// ordering key; `message_id` is caller-supplied and only constrained
/// to be unique within the namespace.
fn apply_v1(conn: &Connection) -> Result<(), ParleyError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS chats (
            id          TEXT PRIMARY KEY NOT NULL,
            title       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            mode        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id     TEXT NOT NULL,
            message_id  TEXT NOT NULL UNIQUE,
            content     TEXT NOT NULL,
            role        TEXT NOT NULL
                        CHECK (role IN ('user', 'assistant')),
            metadata    TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages (chat_id, seq ASC);

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| ParleyError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}

//! Connection handling and schema migration.

use clipcast_core::error::{ClipcastError, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

/// Handle to the relational store. Cheap to share behind an `Arc`;
/// the inner connection is serialized by a mutex.
pub struct Store {
    pub(crate) conn: Mutex<Connection>,
}

impl Store {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| ClipcastError::Store(format!("DB open: {e}")))?;
        // Two processes (scheduler + approver) share this file.
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| ClipcastError::Store(e.to_string()))?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| ClipcastError::Store(e.to_string()))?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                access_token TEXT,
                token_expires_at TEXT,
                posting_schedule TEXT NOT NULL,   -- JSON wire format
                is_active INTEGER NOT NULL DEFAULT 1,
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                last_post_at TEXT,
                last_error TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS content (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'generating',
                idea TEXT,
                video_path TEXT,
                idea_cost REAL NOT NULL DEFAULT 0,
                prompts_cost REAL NOT NULL DEFAULT 0,
                videos_cost REAL NOT NULL DEFAULT 0,
                compose_cost REAL NOT NULL DEFAULT 0,
                post_cost REAL NOT NULL DEFAULT 0,
                reviewed_by TEXT,
                reviewed_at TEXT,
                review_notes TEXT,
                error_message TEXT,
                posted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (account_id) REFERENCES accounts(id)
            );
            CREATE INDEX IF NOT EXISTS idx_content_account_status
                ON content(account_id, status);

            -- One row per decision-channel event id. Existence = already
            -- processed; never updated or deleted by normal flow.
            CREATE TABLE IF NOT EXISTS review_interactions (
                event_id TEXT PRIMARY KEY,
                content_id TEXT NOT NULL,
                action TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| ClipcastError::Store(format!("Migration: {e}")))?;
        Ok(())
    }

    pub(crate) fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ClipcastError::Store(format!("lock poisoned: {e}")))
    }
}

/// Parse an optional RFC 3339 column.
pub(crate) fn parse_ts(value: Option<String>) -> Option<chrono::DateTime<chrono::Utc>> {
    value.and_then(|s| {
        chrono::DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|d| d.with_timezone(&chrono::Utc))
    })
}

/// Parse a required RFC 3339 column, defaulting to the epoch on a
/// malformed value rather than failing the whole row.
pub(crate) fn parse_ts_required(value: String) -> chrono::DateTime<chrono::Utc> {
    parse_ts(Some(value)).unwrap_or_default()
}

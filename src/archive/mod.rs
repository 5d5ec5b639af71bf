pub mod members;
pub mod messages;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// SQLite transcript of every chat the bot can see.
///
/// The Bot API offers no way to read chat history, so messages are recorded
/// as they arrive and word clouds are computed from this archive.
#[derive(Clone)]
pub struct Archive {
    conn: Arc<Mutex<Connection>>,
}

impl Archive {
    /// Open or create the archive database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open archive: {}", path.display()))?;

        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        // Migrate on the raw connection, before it is shared behind the async lock
        Self::run_migrations(&conn)?;

        info!("Transcript archive opened at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS chats (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                username TEXT,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_chats_username
                ON chats(username COLLATE NOCASE);

            -- sent_at is unix seconds, the resolution Telegram reports
            CREATE TABLE IF NOT EXISTS messages (
                chat_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                author_id INTEGER,
                author_is_bot INTEGER NOT NULL DEFAULT 0,
                is_self INTEGER NOT NULL DEFAULT 0,
                is_report INTEGER NOT NULL DEFAULT 0,
                sent_at INTEGER NOT NULL,
                text TEXT,
                PRIMARY KEY (chat_id, message_id)
            );

            CREATE INDEX IF NOT EXISTS idx_messages_chat_time
                ON messages(chat_id, sent_at DESC, message_id DESC);

            CREATE INDEX IF NOT EXISTS idx_messages_author_time
                ON messages(chat_id, author_id, sent_at DESC, message_id DESC);

            CREATE TABLE IF NOT EXISTS members (
                chat_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                display_name TEXT NOT NULL,
                is_bot INTEGER NOT NULL DEFAULT 0,
                last_seen_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (chat_id, user_id)
            );
            ",
        )
        .context("Failed to run archive migrations")?;
        Ok(())
    }
}

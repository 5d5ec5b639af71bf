use std::collections::VecDeque;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use rusqlite::{Connection, OptionalExtension};

use super::members::{upsert_member, Member};
use super::Archive;
use crate::platform::ChatHandle;
use crate::wordcloud::source::{MessageSource, SourceMessage};

/// Rows fetched per round trip while streaming a chat backwards
const PAGE_SIZE: usize = 200;

/// One message as it is written to the archive
#[derive(Debug, Clone)]
pub struct ArchivedMessage {
    pub chat_id: i64,
    pub message_id: i32,
    pub author: Option<Member>,
    pub sent_at: DateTime<Utc>,
    pub text: Option<String>,
    pub is_self: bool,
    pub is_report: bool,
}

impl Archive {
    /// Remember a chat's display name and public username
    pub async fn record_chat(&self, chat: &ChatHandle, username: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO chats (id, title, username) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                username = excluded.username,
                updated_at = datetime('now')",
            rusqlite::params![chat.id, chat.display_name, username],
        )
        .context("Failed to record chat")?;
        Ok(())
    }

    /// Find a chat by numeric id or by `@username` (case-insensitive)
    pub async fn find_chat(&self, reference: &str) -> Result<Option<ChatHandle>> {
        let conn = self.conn.lock().await;
        let row: Option<(i64, String)> = match reference.parse::<i64>() {
            Ok(id) => conn
                .query_row(
                    "SELECT id, title FROM chats WHERE id = ?1",
                    rusqlite::params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional(),
            Err(_) => conn
                .query_row(
                    "SELECT id, title FROM chats
                     WHERE username = ?1 COLLATE NOCASE
                     ORDER BY updated_at DESC LIMIT 1",
                    rusqlite::params![reference.trim_start_matches('@')],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional(),
        }
        .context("Failed to look up chat")?;

        Ok(row.map(|(id, display_name)| ChatHandle { id, display_name }))
    }

    /// Store a message. Re-recording the same message (an edit) replaces its text.
    pub async fn record_message(&self, msg: &ArchivedMessage) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO messages
             (chat_id, message_id, author_id, author_is_bot, is_self, is_report, sent_at, text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(chat_id, message_id) DO UPDATE SET text = excluded.text",
            rusqlite::params![
                msg.chat_id,
                msg.message_id,
                msg.author.as_ref().map(|a| a.user_id as i64),
                msg.author.as_ref().is_some_and(|a| a.is_bot),
                msg.is_self,
                msg.is_report,
                msg.sent_at.timestamp(),
                msg.text,
            ],
        )
        .context("Failed to record message")?;

        if let Some(author) = &msg.author {
            upsert_member(&conn, msg.chat_id, author)?;
        }
        Ok(())
    }

    async fn page(
        &self,
        chat_id: i64,
        author_id: Option<u64>,
        before: (i64, i64),
    ) -> Result<Vec<SourceMessage>> {
        let conn = self.conn.lock().await;
        query_page(&conn, chat_id, author_id, before)
    }
}

// Caller holds the lock; keeps the statement out of any await.
fn query_page(
    conn: &Connection,
    chat_id: i64,
    author_id: Option<u64>,
    (sent_at, message_id): (i64, i64),
) -> Result<Vec<SourceMessage>> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT message_id, author_id, author_is_bot, is_self, is_report, sent_at, text
             FROM messages
             WHERE chat_id = ?1
               AND (?2 IS NULL OR author_id = ?2)
               AND (sent_at < ?3 OR (sent_at = ?3 AND message_id < ?4))
             ORDER BY sent_at DESC, message_id DESC
             LIMIT ?5",
        )
        .context("Failed to prepare page query")?;
    let messages = stmt
        .query_map(
            rusqlite::params![
                chat_id,
                author_id.map(|id| id as i64),
                sent_at,
                message_id,
                PAGE_SIZE as i64
            ],
            |row| {
                let sent_at: i64 = row.get(5)?;
                Ok(SourceMessage {
                    message_id: row.get(0)?,
                    author_id: row.get::<_, Option<i64>>(1)?.map(|id| id as u64),
                    is_bot_author: row.get(2)?,
                    is_self_author: row.get(3)?,
                    is_report: row.get(4)?,
                    timestamp: DateTime::from_timestamp(sent_at, 0).unwrap_or_default(),
                    text: row.get(6)?,
                })
            },
        )
        .context("Failed to query messages")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read messages")?;
    Ok(messages)
}

struct PageCursor {
    before: (i64, i64),
    buffered: VecDeque<SourceMessage>,
    exhausted: bool,
}

impl MessageSource for Archive {
    fn messages_before(
        &self,
        chat_id: i64,
        author_id: Option<u64>,
        end: DateTime<Utc>,
    ) -> BoxStream<'_, Result<SourceMessage>> {
        let start = PageCursor {
            before: (end.timestamp(), i64::MAX),
            buffered: VecDeque::new(),
            exhausted: false,
        };

        stream::try_unfold(start, move |mut cursor| async move {
            if cursor.buffered.is_empty() && !cursor.exhausted {
                let page = self.page(chat_id, author_id, cursor.before).await?;
                cursor.exhausted = page.len() < PAGE_SIZE;
                if let Some(last) = page.last() {
                    cursor.before = (last.timestamp.timestamp(), last.message_id);
                }
                cursor.buffered.extend(page);
            }
            Ok::<_, anyhow::Error>(cursor.buffered.pop_front().map(|msg| (msg, cursor)))
        })
        .boxed()
    }
}

use anyhow::{Context, Result};
use rusqlite::Connection;

use super::Archive;

/// A user seen in a chat, either posting or joining
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub user_id: u64,
    pub display_name: String,
    pub is_bot: bool,
}

pub(super) fn upsert_member(conn: &Connection, chat_id: i64, member: &Member) -> Result<()> {
    conn.execute(
        "INSERT INTO members (chat_id, user_id, display_name, is_bot) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(chat_id, user_id) DO UPDATE SET
            display_name = excluded.display_name,
            is_bot = excluded.is_bot,
            last_seen_at = datetime('now')",
        rusqlite::params![
            chat_id,
            member.user_id as i64,
            member.display_name,
            member.is_bot
        ],
    )
    .context("Failed to record member")?;
    Ok(())
}

impl Archive {
    pub async fn record_member(&self, chat_id: i64, member: &Member) -> Result<()> {
        let conn = self.conn.lock().await;
        upsert_member(&conn, chat_id, member)
    }

    /// Drop a member after they have been removed from the chat
    pub async fn forget_member(&self, chat_id: i64, user_id: u64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM members WHERE chat_id = ?1 AND user_id = ?2",
            rusqlite::params![chat_id, user_id as i64],
        )
        .context("Failed to forget member")?;
        Ok(())
    }

    /// Every member ever recorded for a chat, oldest id first
    pub async fn members(&self, chat_id: i64) -> Result<Vec<Member>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT user_id, display_name, is_bot FROM members
                 WHERE chat_id = ?1 ORDER BY user_id ASC",
            )
            .context("Failed to prepare members query")?;
        let members = stmt
            .query_map(rusqlite::params![chat_id], |row| {
                Ok(Member {
                    user_id: row.get::<_, i64>(0)? as u64,
                    display_name: row.get(1)?,
                    is_bot: row.get(2)?,
                })
            })
            .context("Failed to query members")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read members")?;
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: u64, name: &str) -> Member {
        Member {
            user_id: id,
            display_name: name.to_string(),
            is_bot: false,
        }
    }

    #[tokio::test]
    async fn test_record_updates_display_name() {
        let archive = Archive::open_in_memory().unwrap();
        archive.record_member(-1, &member(5, "old")).await.unwrap();
        archive.record_member(-1, &member(5, "new")).await.unwrap();
        archive.record_member(-1, &member(3, "other")).await.unwrap();

        let members = archive.members(-1).await.unwrap();

        assert_eq!(members, vec![member(3, "other"), member(5, "new")]);
    }

    #[tokio::test]
    async fn test_members_are_per_chat() {
        let archive = Archive::open_in_memory().unwrap();
        archive.record_member(-1, &member(5, "a")).await.unwrap();
        archive.record_member(-2, &member(6, "b")).await.unwrap();

        assert_eq!(archive.members(-1).await.unwrap().len(), 1);
        assert_eq!(archive.members(-2).await.unwrap()[0].user_id, 6);
    }

    #[tokio::test]
    async fn test_forget_member() {
        let archive = Archive::open_in_memory().unwrap();
        archive.record_member(-1, &member(5, "gone")).await.unwrap();
        archive.forget_member(-1, 5).await.unwrap();

        assert!(archive.members(-1).await.unwrap().is_empty());
    }
}

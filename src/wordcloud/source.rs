use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

/// A transcript message as the aggregation engine sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub message_id: i64,
    pub author_id: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub text: Option<String>,
    pub is_bot_author: bool,
    /// Sent by this bot
    pub is_self_author: bool,
    /// Archived as one of this bot's own word cloud reports
    pub is_report: bool,
}

/// Lazily yields the messages of one chat, newest first.
///
/// Implementations must yield messages with non-increasing timestamps, all at
/// or before `end`, restricted to `author_id` when one is given. Consumers
/// stop pulling as soon as they have seen enough, so pages should only be
/// fetched on demand.
pub trait MessageSource: Send + Sync {
    fn messages_before(
        &self,
        chat_id: i64,
        author_id: Option<u64>,
        end: DateTime<Utc>,
    ) -> BoxStream<'_, Result<SourceMessage>>;
}

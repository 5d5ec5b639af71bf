pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

use crate::wordcloud::report::OutboundReport;

/// A chat resolved to something the transport can address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatHandle {
    pub id: i64,
    pub display_name: String,
}

/// A member of a chat, as seen by the cleanup pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub user_id: u64,
    pub display_name: String,
    pub is_deleted: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The bot may not perform this action, e.g. removing the chat owner
    #[error("insufficient privilege: {0}")]
    InsufficientPrivilege(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The chat platform as seen by reports and maintenance jobs
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Resolve `@username` or a numeric chat id
    async fn resolve_chat(&self, reference: &str) -> Result<ChatHandle>;

    async fn send_report(&self, chat: &ChatHandle, report: &OutboundReport) -> Result<()>;

    async fn participants(&self, chat: &ChatHandle) -> Result<Vec<Participant>>;

    /// Remove a participant while still allowing them to rejoin
    async fn kick_participant(
        &self,
        chat: &ChatHandle,
        user_id: u64,
    ) -> std::result::Result<(), TransportError>;
}

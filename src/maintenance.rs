use anyhow::Result;
use tracing::{info, warn};

use crate::platform::{ChatTransport, TransportError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupSummary {
    pub removed: usize,
    /// Deleted accounts the bot is not allowed to remove
    pub skipped: usize,
}

/// Remove every deleted account from a chat.
///
/// A participant the bot lacks the rights to remove (the owner, another
/// admin) is skipped; any other failure aborts the pass.
pub async fn remove_deleted_accounts(
    transport: &dyn ChatTransport,
    reference: &str,
) -> Result<CleanupSummary> {
    let chat = transport.resolve_chat(reference).await?;
    let mut summary = CleanupSummary::default();

    for participant in transport.participants(&chat).await? {
        if !participant.is_deleted {
            continue;
        }
        match transport.kick_participant(&chat, participant.user_id).await {
            Ok(()) => {
                info!(
                    "Removed deleted account {} ({:?}) from {}",
                    participant.user_id, participant.display_name, chat.display_name
                );
                summary.removed += 1;
            }
            Err(TransportError::InsufficientPrivilege(reason)) => {
                warn!(
                    "Cannot remove deleted account {} from {}: {}",
                    participant.user_id, chat.display_name, reason
                );
                summary.skipped += 1;
            }
            Err(TransportError::Other(e)) => return Err(e),
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Participant;
    use crate::wordcloud::testing::RecordingTransport;

    fn participant(user_id: u64, is_deleted: bool) -> Participant {
        Participant {
            user_id,
            display_name: String::new(),
            is_deleted,
        }
    }

    #[tokio::test]
    async fn test_removes_only_deleted_accounts() {
        let transport = RecordingTransport {
            participants: vec![participant(1, false), participant(2, true), participant(3, true)],
            ..Default::default()
        };

        let summary = remove_deleted_accounts(&transport, "@emacs_zh").await.unwrap();

        assert_eq!(summary, CleanupSummary { removed: 2, skipped: 0 });
        assert_eq!(*transport.kicked.lock().unwrap(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_privilege_errors_are_skipped() {
        let transport = RecordingTransport {
            participants: vec![participant(1, true), participant(2, true)],
            privileged: vec![1],
            ..Default::default()
        };

        let summary = remove_deleted_accounts(&transport, "@emacs_zh").await.unwrap();

        assert_eq!(summary, CleanupSummary { removed: 1, skipped: 1 });
        assert_eq!(*transport.kicked.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_unknown_chat_fails() {
        let transport = RecordingTransport::default();
        assert!(remove_deleted_accounts(&transport, "@nowhere").await.is_err());
    }
}

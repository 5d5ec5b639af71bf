use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::{Chat, InputFile, User};
use teloxide::dispatching::UpdateHandler;
use teloxide::{ApiError, RequestError};
use tracing::{debug, error, info};

use super::{ChatHandle, ChatTransport, Participant, TransportError};
use crate::archive::members::Member;
use crate::archive::messages::ArchivedMessage;
use crate::archive::Archive;
use crate::commands::{Command, WordCloudCommand, START_REPLY};
use crate::wordcloud::report::OutboundReport;
use crate::wordcloud::{Author, WordCloudService};

/// Fragments of Bot API errors that mean the bot lacks the rights for an action
const PRIVILEGE_ERRORS: [&str; 6] = [
    "not enough rights",
    "chat owner",
    "is an administrator of the chat",
    "chat_admin_required",
    "user_admin_invalid",
    "need administrator rights",
];

fn is_privilege_error(description: &str) -> bool {
    let description = description.to_lowercase();
    PRIVILEGE_ERRORS.iter().any(|p| description.contains(p))
}

fn classify(err: RequestError) -> TransportError {
    if let RequestError::Api(api) = &err {
        let description = api.to_string();
        if is_privilege_error(&description) {
            return TransportError::InsufficientPrivilege(description);
        }
    }
    TransportError::Other(anyhow::Error::new(err))
}

/// The user no longer exists as far as the Bot API is concerned
fn is_user_gone(err: &RequestError) -> bool {
    matches!(err, RequestError::Api(ApiError::UserNotFound))
}

/// How a ban-then-unban removal ended
#[derive(Debug)]
enum Removal {
    Kicked,
    /// Out of the chat, but the ban could not be lifted
    LeftBanned(TransportError),
}

/// The unban only runs once the ban succeeded
async fn ban_then_unban<T, U>(
    ban: impl Future<Output = Result<T, RequestError>>,
    unban: impl Future<Output = Result<U, RequestError>>,
) -> std::result::Result<Removal, TransportError> {
    ban.await.map_err(classify)?;
    match unban.await {
        Ok(_) => Ok(Removal::Kicked),
        Err(e) => Ok(Removal::LeftBanned(classify(e))),
    }
}

/// The Bot API has no "deleted" flag; deleted accounts come back nameless
/// or with the placeholder name and nothing else.
fn looks_deleted(first_name: &str, last_name: Option<&str>, username: Option<&str>) -> bool {
    first_name.is_empty()
        || (first_name == "Deleted Account" && last_name.is_none() && username.is_none())
}

/// Whether `reference` (`@username` or numeric id) names this chat
fn matches_reference(reference: &str, chat_id: i64, username: Option<&str>) -> bool {
    match reference.parse::<i64>() {
        Ok(id) => id == chat_id,
        Err(_) => username
            .is_some_and(|name| name.eq_ignore_ascii_case(reference.trim_start_matches('@'))),
    }
}

fn chat_handle(chat: &Chat) -> ChatHandle {
    let display_name = match (chat.title(), chat.first_name()) {
        (Some(title), _) => title.to_string(),
        (None, Some(first)) => match chat.last_name() {
            Some(last) => format!("{} {}", first, last),
            None => first.to_string(),
        },
        (None, None) => chat.id.0.to_string(),
    };
    ChatHandle {
        id: chat.id.0,
        display_name,
    }
}

fn member(user: &User) -> Member {
    Member {
        user_id: user.id.0,
        display_name: user.full_name(),
        is_bot: user.is_bot,
    }
}

fn author(user: &User) -> Author {
    Author {
        id: user.id.0,
        display_name: user.full_name(),
    }
}

fn archived(msg: &Message, is_self: bool, is_report: bool) -> ArchivedMessage {
    ArchivedMessage {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        author: msg.from.as_ref().map(member),
        sent_at: msg.date,
        text: msg.text().or_else(|| msg.caption()).map(str::to_string),
        is_self,
        is_report,
    }
}

/// Bot API implementation of the chat transport.
///
/// Chats are resolved through the archive, so a channel must have been seen
/// (the bot received at least one message there) before it can be addressed
/// by `@username`.
pub struct TelegramTransport {
    bot: Bot,
    archive: Archive,
}

impl TelegramTransport {
    pub fn new(bot: Bot, archive: Archive) -> Self {
        Self { bot, archive }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn resolve_chat(&self, reference: &str) -> Result<ChatHandle> {
        self.archive.find_chat(reference).await?.with_context(|| {
            format!(
                "Chat {} is unknown; the bot has not received any message there yet",
                reference
            )
        })
    }

    async fn send_report(&self, chat: &ChatHandle, report: &OutboundReport) -> Result<()> {
        let chat_id = ChatId(chat.id);
        let sent = match &report.image {
            Some(png) => {
                let photo = InputFile::memory(png.clone()).file_name("wordcloud.png");
                self.bot
                    .send_photo(chat_id, photo)
                    .caption(report.caption.clone())
                    .await
            }
            None => self.bot.send_message(chat_id, report.caption.clone()).await,
        }
        .with_context(|| format!("Failed to send word cloud to {}", chat.display_name))?;

        // Bots never receive their own messages as updates
        self.archive.record_message(&archived(&sent, true, true)).await
    }

    async fn participants(&self, chat: &ChatHandle) -> Result<Vec<Participant>> {
        let chat_id = ChatId(chat.id);
        let mut participants = Vec::new();

        for known in self.archive.members(chat.id).await? {
            if known.is_bot {
                continue;
            }
            let chat_member = match self.bot.get_chat_member(chat_id, UserId(known.user_id)).await {
                Ok(m) => m,
                Err(e) if is_user_gone(&e) => {
                    debug!("Member {} of {} no longer exists", known.user_id, chat.display_name);
                    self.archive.forget_member(chat.id, known.user_id).await?;
                    continue;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!(
                            "Failed to look up member {} of {}",
                            known.user_id, chat.display_name
                        )
                    })
                }
            };
            if !chat_member.is_present() {
                self.archive.forget_member(chat.id, known.user_id).await?;
                continue;
            }
            let user = &chat_member.user;
            participants.push(Participant {
                user_id: user.id.0,
                display_name: user.full_name(),
                is_deleted: looks_deleted(
                    &user.first_name,
                    user.last_name.as_deref(),
                    user.username.as_deref(),
                ),
            });
        }

        debug!("{} present members in {}", participants.len(), chat.display_name);
        Ok(participants)
    }

    async fn kick_participant(
        &self,
        chat: &ChatHandle,
        user_id: u64,
    ) -> std::result::Result<(), TransportError> {
        let chat_id = ChatId(chat.id);
        // Unbanning right after the ban removes the user without blocking a rejoin
        let removal = ban_then_unban(
            self.bot.ban_chat_member(chat_id, UserId(user_id)).send(),
            self.bot.unban_chat_member(chat_id, UserId(user_id)).send(),
        )
        .await?;
        self.archive.forget_member(chat.id, user_id).await?;

        if let Removal::LeftBanned(e) = removal {
            error!(
                "User {} was removed from {} but stays banned until an admin lifts the ban: {}",
                user_id, chat.display_name, e
            );
        }
        Ok(())
    }
}

/// Shared state injected into every handler
pub struct BotState {
    pub archive: Archive,
    pub service: Arc<WordCloudService>,
    /// Chat whose join messages are deleted
    pub maintenance_channel: String,
}

/// Run the Telegram dispatcher until interrupted
pub async fn run(bot: Bot, state: Arc<BotState>) -> Result<()> {
    info!("Starting Telegram dispatcher...");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

/// Group messages and broadcast channel posts are handled alike
fn schema() -> UpdateHandler<RequestError> {
    dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_channel_post().endpoint(handle_message))
        .branch(Update::filter_edited_message().endpoint(handle_edited_message))
        .branch(Update::filter_edited_channel_post().endpoint(handle_edited_message))
}

async fn record_incoming(archive: &Archive, msg: &Message) -> Result<()> {
    archive
        .record_chat(&chat_handle(&msg.chat), msg.chat.username())
        .await?;
    archive.record_message(&archived(msg, false, false)).await
}

async fn handle_message(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    if let Err(e) = record_incoming(&state.archive, &msg).await {
        error!(
            "Failed to archive message {} in chat {}: {:#}",
            msg.id.0, msg.chat.id.0, e
        );
    }

    if let Some(users) = msg.new_chat_members() {
        for user in users {
            if let Err(e) = state.archive.record_member(msg.chat.id.0, &member(user)).await {
                error!("Failed to record new member {}: {:#}", user.id.0, e);
            }
        }
        if matches_reference(&state.maintenance_channel, msg.chat.id.0, msg.chat.username()) {
            info!("Deleting join message {} in {}", msg.id.0, state.maintenance_channel);
            bot.delete_message(msg.chat.id, msg.id).await?;
        }
        return Ok(());
    }

    let command = match msg.text().and_then(Command::parse) {
        Some(Command::WordCloud(c)) => c,
        Some(Command::Start) => {
            bot.send_message(msg.chat.id, START_REPLY).await?;
            return Ok(());
        }
        None => return Ok(()),
    };

    publish_requested(&msg, command, &state).await;
    Ok(())
}

async fn publish_requested(msg: &Message, command: WordCloudCommand, state: &BotState) {
    let replied_to = msg
        .reply_to_message()
        .and_then(|reply| reply.from.as_ref())
        .map(author);
    let sender = msg.from.as_ref().map(author);
    let scope = command.scope(replied_to, sender);
    let window = command.window(Utc::now());
    let chat = chat_handle(&msg.chat);

    info!(
        "Word cloud requested in {} ({}): {} day(s), author: {:?}",
        chat.display_name,
        chat.id,
        command.days,
        scope.author_id()
    );

    // Failures stay silent in the chat; the command is consumed either way
    if let Err(e) = state.service.publish(&chat, &scope, &window).await {
        error!("Word cloud for {} failed: {:#}", chat.display_name, e);
    }
}

async fn handle_edited_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    if let Err(e) = record_incoming(&state.archive, &msg).await {
        error!(
            "Failed to archive edit of {} in chat {}: {:#}",
            msg.id.0, msg.chat.id.0, e
        );
    }
    Ok(())
}

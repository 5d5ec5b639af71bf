use chrono::{DateTime, Utc};

use crate::wordcloud::{Author, AuthorScope, TimeWindow};

pub const WORDCLOUD_COMMAND: &str = "/wordcloud";
pub const START_COMMAND: &str = "/start";

/// Reply to `/start`; the bot has nothing to offer in private chats
pub const START_REPLY: &str = "不许瞎撩 bot!";

/// Lowercased command name of a message, without any `@botname` suffix
fn command_name(lowered: &str) -> Option<&str> {
    let command = lowered.split_whitespace().next()?;
    command.split('@').next()
}

/// Commands the bot answers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    WordCloud(WordCloudCommand),
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        if command_name(&text.to_lowercase()) == Some(START_COMMAND) {
            return Some(Command::Start);
        }
        WordCloudCommand::parse(text).map(Command::WordCloud)
    }
}

/// Arguments of `/wordcloud [<days>] [full]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordCloudCommand {
    pub days: u32,
    /// Include every author instead of a single user
    pub full: bool,
}

impl WordCloudCommand {
    /// Parse a message text; `None` if it is not a `/wordcloud` command.
    ///
    /// Matching is case-insensitive and accepts the `/wordcloud@botname` form.
    /// A missing or malformed day count falls back to one day.
    pub fn parse(text: &str) -> Option<Self> {
        let lowered = text.to_lowercase();
        if command_name(&lowered)? != WORDCLOUD_COMMAND {
            return None;
        }

        let rest: Vec<&str> = lowered.split_whitespace().skip(1).collect();
        let full = rest.get(1) == Some(&"full");
        let days = rest
            .first()
            .and_then(|d| d.parse::<i64>().ok())
            .map(|d| d.clamp(1, i64::from(u32::MAX)) as u32)
            .unwrap_or(1);

        Some(Self { days, full })
    }

    /// Who the cloud is about: everyone with `full`, otherwise the author of
    /// the replied-to message, otherwise whoever sent the command.
    pub fn scope(&self, replied_to: Option<Author>, sender: Option<Author>) -> AuthorScope {
        if self.full {
            return AuthorScope::All;
        }
        match replied_to.or(sender) {
            Some(author) => AuthorScope::Only(author),
            None => AuthorScope::All,
        }
    }

    pub fn window(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow::last_days(now, self.days)
    }
}

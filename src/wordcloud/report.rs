use std::fmt::Display;

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone, Utc};

use super::render::CloudRenderer;
use super::{AuthorScope, FrequencyMap, TimeWindow, REPORT_SUFFIX};

/// What gets posted back into the chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReport {
    pub caption: String,
    /// PNG bytes; absent when no word survived filtering
    pub image: Option<Vec<u8>>,
}

/// Caption for a report, with the window rendered in local time
pub fn caption(chat_name: &str, scope: &AuthorScope, window: &TimeWindow) -> String {
    caption_in(&Local, chat_name, scope, window)
}

pub fn caption_in<Tz>(tz: &Tz, chat_name: &str, scope: &AuthorScope, window: &TimeWindow) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!(
        "{} 频道 {} 从 {} 到 {} {}",
        chat_name,
        scope.display_name(),
        format_instant(tz, window.from()),
        format_instant(tz, window.end()),
        REPORT_SUFFIX
    )
}

/// `2024-01-01 08:00:00+08:00`
fn format_instant<Tz>(tz: &Tz, instant: DateTime<Utc>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    instant
        .with_timezone(tz)
        .format("%Y-%m-%d %H:%M:%S%:z")
        .to_string()
}

/// Build the report; the renderer is only consulted when there are words.
pub fn build_report(
    renderer: &dyn CloudRenderer,
    chat_name: &str,
    scope: &AuthorScope,
    window: &TimeWindow,
    words: &FrequencyMap,
) -> Result<OutboundReport> {
    let image = if words.is_empty() {
        None
    } else {
        Some(renderer.render(words)?)
    };
    Ok(OutboundReport {
        caption: caption(chat_name, scope, window),
        image,
    })
}

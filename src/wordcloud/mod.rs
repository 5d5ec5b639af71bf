pub mod aggregate;
pub mod render;
pub mod report;
pub mod source;
pub mod stopwords;
pub mod tokenizer;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::platform::{ChatHandle, ChatTransport};
use crate::wordcloud::aggregate::WordCounter;
use crate::wordcloud::render::CloudRenderer;
use crate::wordcloud::report::OutboundReport;
use crate::wordcloud::source::MessageSource;

/// Trailing text of every report caption. Self-authored messages ending with
/// it are prior reports and never counted.
pub const REPORT_SUFFIX: &str = "的消息词云";

/// Lowercased token -> number of occurrences within one run
pub type FrequencyMap = HashMap<String, u64>;

/// A message author, as far as reports need to know about them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: u64,
    pub display_name: String,
}

/// Which authors contribute to a word cloud
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorScope {
    All,
    Only(Author),
}

impl AuthorScope {
    pub fn author_id(&self) -> Option<u64> {
        match self {
            AuthorScope::All => None,
            AuthorScope::Only(author) => Some(author.id),
        }
    }

    /// Name shown in the caption; empty when every author is included
    pub fn display_name(&self) -> &str {
        match self {
            AuthorScope::All => "",
            AuthorScope::Only(author) => &author.display_name,
        }
    }
}

/// Closed interval `[from, end]` of instants to aggregate over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    from: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(from: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if from > end {
            anyhow::bail!("Window start {} is after its end {}", from, end);
        }
        Ok(Self { from, end })
    }

    /// The `days` days leading up to `end`.
    pub fn last_days(end: DateTime<Utc>, days: u32) -> Self {
        let from = Duration::try_days(i64::from(days))
            .and_then(|span| end.checked_sub_signed(span))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { from, end }
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

/// Ties aggregation, rendering and delivery together for both the command
/// handler and the scheduled jobs.
pub struct WordCloudService {
    source: Arc<dyn MessageSource>,
    transport: Arc<dyn ChatTransport>,
    counter: WordCounter,
    renderer: Arc<dyn CloudRenderer>,
}

impl WordCloudService {
    pub fn new(
        source: Arc<dyn MessageSource>,
        transport: Arc<dyn ChatTransport>,
        counter: WordCounter,
        renderer: Arc<dyn CloudRenderer>,
    ) -> Self {
        Self {
            source,
            transport,
            counter,
            renderer,
        }
    }

    /// Aggregate the window and build the report without sending it
    pub async fn generate(
        &self,
        chat: &ChatHandle,
        scope: &AuthorScope,
        window: &TimeWindow,
    ) -> Result<OutboundReport> {
        let words = self
            .counter
            .aggregate(self.source.as_ref(), chat.id, scope, window)
            .await?;
        report::build_report(self.renderer.as_ref(), &chat.display_name, scope, window, &words)
    }

    pub async fn publish(
        &self,
        chat: &ChatHandle,
        scope: &AuthorScope,
        window: &TimeWindow,
    ) -> Result<()> {
        let report = self.generate(chat, scope, window).await?;
        info!(
            "Sending word cloud to {} ({}), image: {}",
            chat.display_name,
            chat.id,
            report.image.is_some()
        );
        self.transport.send_report(chat, &report).await
    }

    /// Resolve a channel reference such as `@emacs_zh` and publish to it
    pub async fn publish_to(
        &self,
        reference: &str,
        scope: &AuthorScope,
        window: &TimeWindow,
    ) -> Result<()> {
        let chat = self.transport.resolve_chat(reference).await?;
        self.publish(&chat, scope, window).await
    }
}

use std::sync::Arc;

use anyhow::Result;
use futures::TryStreamExt;
use tracing::debug;

use super::source::{MessageSource, SourceMessage};
use super::stopwords::StopWords;
use super::tokenizer::Tokenizer;
use super::{AuthorScope, FrequencyMap, TimeWindow, REPORT_SUFFIX};

/// Whether a message may contribute words to a cloud.
///
/// Empty messages, messages from bots and this bot's own earlier reports are
/// skipped.
pub fn is_eligible(msg: &SourceMessage) -> bool {
    let text = match msg.text.as_deref() {
        Some(t) if !t.is_empty() => t,
        _ => return false,
    };
    if msg.is_self_author && (msg.is_report || text.ends_with(REPORT_SUFFIX)) {
        return false;
    }
    !msg.is_bot_author
}

/// Builds frequency maps from a message source.
///
/// Holds only shared read-only state; every call to [`WordCounter::aggregate`]
/// owns its own map, so overlapping calls never interfere.
#[derive(Clone)]
pub struct WordCounter {
    tokenizer: Arc<dyn Tokenizer>,
    stop_words: Arc<StopWords>,
}

impl WordCounter {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, stop_words: Arc<StopWords>) -> Self {
        Self {
            tokenizer,
            stop_words,
        }
    }

    /// Count the words of every eligible message in `window`.
    ///
    /// Pulls from the source newest first and stops at the first message older
    /// than the window start. Source errors are returned as-is.
    pub async fn aggregate<S>(
        &self,
        source: &S,
        chat_id: i64,
        scope: &AuthorScope,
        window: &TimeWindow,
    ) -> Result<FrequencyMap>
    where
        S: MessageSource + ?Sized,
    {
        let mut words = FrequencyMap::new();
        let mut scanned = 0usize;
        let mut eligible = 0usize;

        let mut messages = source.messages_before(chat_id, scope.author_id(), window.end());
        while let Some(msg) = messages.try_next().await? {
            if msg.timestamp < window.from() {
                break;
            }
            scanned += 1;
            if !is_eligible(&msg) {
                continue;
            }
            eligible += 1;
            if let Some(text) = msg.text.as_deref() {
                self.count_text(&mut words, text);
            }
        }

        debug!(
            "Scanned {} messages in chat {} ({} eligible, {} distinct words)",
            scanned,
            chat_id,
            eligible,
            words.len()
        );
        Ok(words)
    }

    fn count_text(&self, words: &mut FrequencyMap, text: &str) {
        for token in self.tokenizer.tokenize(text) {
            let word = token.to_lowercase();
            if !self.stop_words.contains(&word) {
                *words.entry(word).or_insert(0) += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{DateTime, Utc};
    use futures::stream::{self, BoxStream, StreamExt};

    use super::*;
    use crate::wordcloud::testing::{at, message, VecSource};
    use crate::wordcloud::tokenizer::WhitespaceTokenizer;
    use crate::wordcloud::Author;

    fn counter(stop_words: &[&str]) -> WordCounter {
        WordCounter::new(
            Arc::new(WhitespaceTokenizer),
            Arc::new(StopWords::from_words(stop_words.iter())),
        )
    }

    fn window(from: i64, end: i64) -> TimeWindow {
        TimeWindow::new(at(from), at(end)).unwrap()
    }

    fn only(id: u64) -> AuthorScope {
        AuthorScope::Only(Author {
            id,
            display_name: format!("user-{}", id),
        })
    }

    /// Yields a fixed sequence and counts how many items were pulled
    struct CountingSource {
        messages: Vec<SourceMessage>,
        pulled: AtomicUsize,
    }

    impl MessageSource for CountingSource {
        fn messages_before(
            &self,
            _chat_id: i64,
            _author_id: Option<u64>,
            _end: DateTime<Utc>,
        ) -> BoxStream<'_, Result<SourceMessage>> {
            stream::iter(self.messages.iter().cloned())
                .inspect(|_| {
                    self.pulled.fetch_add(1, Ordering::SeqCst);
                })
                .map(Ok)
                .boxed()
        }
    }

    struct FailingSource;

    impl MessageSource for FailingSource {
        fn messages_before(
            &self,
            _chat_id: i64,
            _author_id: Option<u64>,
            _end: DateTime<Utc>,
        ) -> BoxStream<'_, Result<SourceMessage>> {
            stream::iter(vec![
                Ok(message(2, 1, 5, "first")),
                Err(anyhow::anyhow!("connection reset")),
            ])
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_bot_message_excluded_from_counts() {
        let mut bot = message(2, 2, 1, "猫");
        bot.is_bot_author = true;
        let source = VecSource::new(vec![
            message(1, 1, 0, "猫 狗 猫"),
            bot,
            message(3, 1, 2, "鸟"),
        ]);

        let words = counter(&[])
            .aggregate(&source, 1, &AuthorScope::All, &window(0, 2))
            .await
            .unwrap();

        assert_eq!(words.len(), 3);
        assert_eq!(words["猫"], 2);
        assert_eq!(words["狗"], 1);
        assert_eq!(words["鸟"], 1);
    }

    #[tokio::test]
    async fn test_messages_before_window_are_never_counted() {
        let source = CountingSource {
            messages: vec![
                message(4, 1, 20, "late"),
                message(3, 1, 10, "inside"),
                message(2, 1, 5, "early"),
                message(1, 1, 10, "unordered"),
            ],
            pulled: AtomicUsize::new(0),
        };

        let words = counter(&[])
            .aggregate(&source, 1, &AuthorScope::All, &window(8, 20))
            .await
            .unwrap();

        assert_eq!(words.get("late"), Some(&1));
        assert_eq!(words.get("inside"), Some(&1));
        assert!(!words.contains_key("early"));
        // Stops at the first out-of-window message instead of draining
        assert!(!words.contains_key("unordered"));
        assert_eq!(source.pulled.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_window_bounds_are_inclusive() {
        let source = VecSource::new(vec![
            message(1, 1, 0, "start"),
            message(2, 1, 10, "end"),
            message(3, 1, 11, "after"),
        ]);

        let words = counter(&[])
            .aggregate(&source, 1, &AuthorScope::All, &window(0, 10))
            .await
            .unwrap();

        assert!(words.contains_key("start"));
        assert!(words.contains_key("end"));
        assert!(!words.contains_key("after"));
    }

    #[tokio::test]
    async fn test_self_reports_are_excluded() {
        let mut by_suffix = message(1, 9, 1, &format!("群 频道 从 a 到 b {}", REPORT_SUFFIX));
        by_suffix.is_self_author = true;
        let mut by_marker = message(2, 9, 2, "caption edited later");
        by_marker.is_self_author = true;
        by_marker.is_report = true;
        let mut self_chat = message(3, 9, 3, "hello");
        self_chat.is_self_author = true;
        let other_suffix = message(4, 1, 4, &format!("quoted {}", REPORT_SUFFIX));

        let source = VecSource::new(vec![by_suffix, by_marker, self_chat, other_suffix]);
        let words = counter(&[])
            .aggregate(&source, 1, &AuthorScope::All, &window(0, 10))
            .await
            .unwrap();

        assert!(!words.contains_key("群"));
        assert!(!words.contains_key("edited"));
        assert_eq!(words.get("hello"), Some(&1));
        // Only this bot's own captions are treated as reports
        assert_eq!(words.get("quoted"), Some(&1));
    }

    #[test]
    fn test_empty_or_missing_text_is_ineligible() {
        let mut empty = message(1, 1, 0, "");
        assert!(!is_eligible(&empty));
        empty.text = None;
        assert!(!is_eligible(&empty));
        assert!(is_eligible(&message(2, 1, 0, "x")));
    }

    #[tokio::test]
    async fn test_stop_words_only_remove_their_own_counts() {
        let messages = vec![
            message(1, 1, 1, "the emacs The vim"),
            message(2, 2, 2, "emacs rocks"),
        ];

        let before = counter(&[])
            .aggregate(&VecSource::new(messages.clone()), 1, &AuthorScope::All, &window(0, 5))
            .await
            .unwrap();
        let after = counter(&["the"])
            .aggregate(&VecSource::new(messages), 1, &AuthorScope::All, &window(0, 5))
            .await
            .unwrap();

        assert_eq!(before.get("the"), Some(&2));
        assert!(!after.contains_key("the"));
        for (word, count) in &after {
            assert_eq!(before.get(word), Some(count));
        }
        assert_eq!(after.len(), before.len() - 1);
    }

    #[tokio::test]
    async fn test_scope_restricts_authors() {
        let source = VecSource::new(vec![
            message(1, 1, 1, "alice"),
            message(2, 2, 2, "bob"),
            message(3, 1, 3, "alice again"),
        ]);

        let scoped = counter(&[])
            .aggregate(&source, 1, &only(1), &window(0, 5))
            .await
            .unwrap();
        let all = counter(&[])
            .aggregate(&source, 1, &AuthorScope::All, &window(0, 5))
            .await
            .unwrap();

        assert_eq!(scoped.get("alice"), Some(&2));
        assert!(!scoped.contains_key("bob"));
        assert_eq!(all.get("bob"), Some(&1));
    }

    #[tokio::test]
    async fn test_empty_source_yields_empty_map() {
        let words = counter(&[])
            .aggregate(&VecSource::new(vec![]), 1, &AuthorScope::All, &window(0, 5))
            .await
            .unwrap();
        assert!(words.is_empty());
    }

    #[tokio::test]
    async fn test_source_error_propagates() {
        let result = counter(&[])
            .aggregate(&FailingSource, 1, &AuthorScope::All, &window(0, 10))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_same_input_same_output() {
        let source = VecSource::new(vec![
            message(1, 1, 1, "a b c a"),
            message(2, 2, 2, "b"),
        ]);
        let first = counter(&[])
            .aggregate(&source, 1, &AuthorScope::All, &window(0, 5))
            .await
            .unwrap();
        let second = counter(&[])
            .aggregate(&source, 1, &AuthorScope::All, &window(0, 5))
            .await
            .unwrap();
        assert_eq!(first, second);
    }
}

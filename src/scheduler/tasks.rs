use std::sync::Arc;

use chrono::{DateTime, Duration, Local, Months, Utc};
use tracing::{error, info};

use crate::maintenance;
use crate::platform::ChatTransport;
use crate::scheduler::Scheduler;
use crate::wordcloud::{AuthorScope, TimeWindow, WordCloudService};

/// How often a channel gets an unscoped word cloud
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Cadence {
    pub const ALL: [Cadence; 4] = [
        Cadence::Daily,
        Cadence::Weekly,
        Cadence::Monthly,
        Cadence::Yearly,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Cadence::Daily => "wordcloud-daily",
            Cadence::Weekly => "wordcloud-weekly",
            Cadence::Monthly => "wordcloud-monthly",
            Cadence::Yearly => "wordcloud-yearly",
        }
    }

    /// Midnight at the start of each period
    pub fn cron(&self) -> &'static str {
        match self {
            Cadence::Daily => "0 0 0 * * *",
            Cadence::Weekly => "0 0 0 * * Mon",
            Cadence::Monthly => "0 0 0 1 * *",
            Cadence::Yearly => "0 0 0 1 1 *",
        }
    }

    /// The period that just ended at `end`. Months and years are calendar
    /// lengths in local time, so the monthly window after March 31st starts
    /// on February's last day.
    pub fn window_ending(&self, end: DateTime<Utc>) -> TimeWindow {
        let from = match self {
            Cadence::Daily => end.checked_sub_signed(Duration::days(1)),
            Cadence::Weekly => end.checked_sub_signed(Duration::weeks(1)),
            Cadence::Monthly => sub_local_months(end, 1),
            Cadence::Yearly => sub_local_months(end, 12),
        };
        TimeWindow::new(from.unwrap_or(DateTime::<Utc>::MIN_UTC), end)
            .unwrap_or_else(|_| TimeWindow::last_days(end, 0))
    }
}

fn sub_local_months(end: DateTime<Utc>, months: u32) -> Option<DateTime<Utc>> {
    end.with_timezone(&Local)
        .checked_sub_months(Months::new(months))
        .map(|local| local.with_timezone(&Utc))
        .or_else(|| end.checked_sub_months(Months::new(months)))
}

/// Publish one cadence's cloud to every channel, one after another.
///
/// A failing channel is logged and does not stop the others.
pub async fn publish_cadence(service: &WordCloudService, cadence: Cadence, channels: &[String]) {
    let window = cadence.window_ending(Utc::now());
    for channel in channels {
        if let Err(e) = service.publish_to(channel, &AuthorScope::All, &window).await {
            error!("{} failed for {}: {:#}", cadence.name(), channel, e);
        }
    }
}

/// Register the word cloud cadences and the daily deleted-account cleanup
pub async fn register_builtin_tasks(
    scheduler: &Scheduler,
    service: Arc<WordCloudService>,
    transport: Arc<dyn ChatTransport>,
    channels: Vec<String>,
    maintenance_channel: String,
    cleanup_cron: &str,
) -> anyhow::Result<()> {
    let channels = Arc::new(channels);
    for cadence in Cadence::ALL {
        let service = service.clone();
        let channels = channels.clone();
        scheduler
            .add_cron_job(cadence.cron(), cadence.name(), move || {
                let service = service.clone();
                let channels = channels.clone();
                Box::pin(async move {
                    publish_cadence(&service, cadence, &channels).await;
                })
            })
            .await?;
    }

    scheduler
        .add_cron_job(cleanup_cron, "remove-deleted-accounts", move || {
            let transport = transport.clone();
            let channel = maintenance_channel.clone();
            Box::pin(async move {
                match maintenance::remove_deleted_accounts(transport.as_ref(), &channel).await {
                    Ok(summary) => info!(
                        "Cleanup of {}: removed {}, skipped {}",
                        channel, summary.removed, summary.skipped
                    ),
                    Err(e) => error!("Cleanup of {} failed: {:#}", channel, e),
                }
            })
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{Datelike, TimeZone};

    use super::*;
    use crate::wordcloud::aggregate::WordCounter;
    use crate::wordcloud::stopwords::StopWords;
    use crate::wordcloud::testing::{message, FixedRenderer, RecordingTransport, VecSource};
    use crate::wordcloud::tokenizer::WhitespaceTokenizer;

    #[test]
    fn test_fixed_windows() {
        let end = Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap();
        assert_eq!(Cadence::Daily.window_ending(end).from(), end - Duration::days(1));
        assert_eq!(Cadence::Weekly.window_ending(end).from(), end - Duration::days(7));
        assert_eq!(Cadence::Daily.window_ending(end).end(), end);
    }

    #[test]
    fn test_calendar_windows() {
        let end = Utc::now();
        let monthly = Cadence::Monthly.window_ending(end).from().with_timezone(&Local);
        let yearly = Cadence::Yearly.window_ending(end).from().with_timezone(&Local);
        let local_end = end.with_timezone(&Local);

        assert_eq!((local_end.month0() + 11) % 12, monthly.month0());
        assert_eq!(local_end.year() - 1, yearly.year());
        assert!(Cadence::Monthly.window_ending(end).from() < end);
    }

    #[test]
    fn test_cron_expressions_are_distinct() {
        let crons: HashSet<_> = Cadence::ALL.iter().map(|c| c.cron()).collect();
        assert_eq!(crons.len(), Cadence::ALL.len());
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_stop_others() {
        let transport = Arc::new(RecordingTransport::default());
        let service = WordCloudService::new(
            Arc::new(VecSource::new(vec![message(1, 1, 0, "hello")])),
            transport.clone(),
            WordCounter::new(Arc::new(WhitespaceTokenizer), Arc::new(StopWords::default())),
            Arc::new(FixedRenderer),
        );
        let channels = vec!["@missing".to_string(), "@emacs_zh".to_string()];

        publish_cadence(&service, Cadence::Daily, &channels).await;

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, -100);
    }
}

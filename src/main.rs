mod archive;
mod commands;
mod config;
mod maintenance;
mod platform;
mod scheduler;
mod wordcloud;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::archive::Archive;
use crate::config::Config;
use crate::platform::telegram::{BotState, TelegramTransport};
use crate::platform::ChatTransport;
use crate::scheduler::Scheduler;
use crate::wordcloud::aggregate::WordCounter;
use crate::wordcloud::render::ImageRenderer;
use crate::wordcloud::stopwords::StopWords;
use crate::wordcloud::tokenizer::JiebaTokenizer;
use crate::wordcloud::WordCloudService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wordcloud_bot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Report channels: {:?}", config.wordcloud.channels);
    info!("  Maintenance channel: {}", config.maintenance.channel);
    info!("  Archive: {}", config.archive.database_path.display());

    // Read-only state shared by every handler and job
    let stop_words = Arc::new(StopWords::load(&config.wordcloud.stop_words_path)?);
    let counter = WordCounter::new(Arc::new(JiebaTokenizer::new()), stop_words);
    let renderer = Arc::new(ImageRenderer::from_file(
        &config.wordcloud.font_path,
        config.wordcloud.render_options(),
    )?);

    let archive = Archive::open(&config.archive.database_path)?;
    let bot = Bot::new(&config.telegram.bot_token);
    let transport: Arc<dyn ChatTransport> =
        Arc::new(TelegramTransport::new(bot.clone(), archive.clone()));

    let service = Arc::new(WordCloudService::new(
        Arc::new(archive.clone()),
        transport.clone(),
        counter,
        renderer,
    ));

    let mut scheduler = Scheduler::new().await?;
    scheduler::tasks::register_builtin_tasks(
        &scheduler,
        service.clone(),
        transport,
        config.wordcloud.channels.clone(),
        config.maintenance.channel.clone(),
        &config.maintenance.cleanup_cron,
    )
    .await?;
    scheduler.start().await?;

    let state = Arc::new(BotState {
        archive,
        service,
        maintenance_channel: config.maintenance.channel.clone(),
    });

    info!("Bot is starting...");
    platform::telegram::run(bot, state).await?;

    scheduler.shutdown().await?;
    Ok(())
}

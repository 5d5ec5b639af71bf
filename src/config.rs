use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::wordcloud::render::RenderOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default = "default_wordcloud_config")]
    pub wordcloud: WordCloudConfig,
    #[serde(default = "default_maintenance_config")]
    pub maintenance: MaintenanceConfig,
    #[serde(default = "default_archive_config")]
    pub archive: ArchiveConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WordCloudConfig {
    /// Chats that receive the scheduled daily/weekly/monthly/yearly clouds
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
    #[serde(default = "default_stop_words_path")]
    pub stop_words_path: PathBuf,
    #[serde(default = "default_font_path")]
    pub font_path: PathBuf,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_max_words")]
    pub max_words: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MaintenanceConfig {
    /// Chat whose join messages are deleted and whose deleted accounts are removed
    #[serde(default = "default_maintenance_channel")]
    pub channel: String,
    /// Six-field cron expression (seconds first)
    #[serde(default = "default_cleanup_cron")]
    pub cleanup_cron: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

fn default_channels() -> Vec<String> {
    vec!["@emacs_zh".to_string(), "@keyboard_cn".to_string()]
}

fn default_stop_words_path() -> PathBuf {
    PathBuf::from("StopWords-simple.txt")
}

fn default_font_path() -> PathBuf {
    PathBuf::from("/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc")
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    400
}

fn default_max_words() -> usize {
    200
}

fn default_maintenance_channel() -> String {
    "@emacszh".to_string()
}

fn default_cleanup_cron() -> String {
    "0 0 2 * * *".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("wordcloud.db")
}

fn default_wordcloud_config() -> WordCloudConfig {
    WordCloudConfig {
        channels: default_channels(),
        stop_words_path: default_stop_words_path(),
        font_path: default_font_path(),
        width: default_width(),
        height: default_height(),
        max_words: default_max_words(),
    }
}

fn default_maintenance_config() -> MaintenanceConfig {
    MaintenanceConfig {
        channel: default_maintenance_channel(),
        cleanup_cron: default_cleanup_cron(),
    }
}

fn default_archive_config() -> ArchiveConfig {
    ArchiveConfig {
        database_path: default_db_path(),
    }
}

impl WordCloudConfig {
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            width: self.width,
            height: self.height,
            max_words: self.max_words,
            max_font_size: self.height as f32 * 0.4,
            ..RenderOptions::default()
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;

        if config.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("telegram.bot_token must not be empty");
        }
        if config.wordcloud.width == 0 || config.wordcloud.height == 0 {
            anyhow::bail!(
                "wordcloud canvas must be non-empty, got {}x{}",
                config.wordcloud.width,
                config.wordcloud.height
            );
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse("[telegram]\nbot_token = \"123:abc\"\n").unwrap();

        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.wordcloud.channels, vec!["@emacs_zh", "@keyboard_cn"]);
        assert_eq!(config.wordcloud.width, 800);
        assert_eq!(config.wordcloud.height, 400);
        assert_eq!(config.maintenance.channel, "@emacszh");
        assert_eq!(config.maintenance.cleanup_cron, "0 0 2 * * *");
        assert_eq!(config.archive.database_path, PathBuf::from("wordcloud.db"));
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = Config::parse(
            r#"
            [telegram]
            bot_token = "t"

            [wordcloud]
            channels = ["@rust_zh"]
            width = 1024
            "#,
        )
        .unwrap();

        assert_eq!(config.wordcloud.channels, vec!["@rust_zh"]);
        assert_eq!(config.wordcloud.width, 1024);
        assert_eq!(config.wordcloud.height, 400);
        assert_eq!(config.wordcloud.max_words, 200);
    }

    #[test]
    fn test_rejects_empty_token() {
        assert!(Config::parse("[telegram]\nbot_token = \"  \"\n").is_err());
    }

    #[test]
    fn test_rejects_empty_canvas() {
        let content = "[telegram]\nbot_token = \"t\"\n[wordcloud]\nheight = 0\n";
        assert!(Config::parse(content).is_err());
    }

    #[test]
    fn test_missing_telegram_section_fails() {
        assert!(Config::parse("[archive]\ndatabase_path = \"x.db\"\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[telegram]\nbot_token = \"t\"\n").unwrap();

        assert!(Config::load(&path).is_ok());
        assert!(Config::load(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_render_options_follow_canvas() {
        let config = Config::parse("[telegram]\nbot_token = \"t\"\n").unwrap();
        let options = config.wordcloud.render_options();
        assert_eq!(options.width, 800);
        assert_eq!(options.max_font_size, 160.0);
    }
}

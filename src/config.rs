use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Register commands on one guild only (development)
    pub owner_id: Option<u64>, // Allowed to run /sync

    // Paths
    pub download_dir: PathBuf,
    pub ytdlp_path: String,

    // Presence
    pub activity: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN")
                .or_else(|_| std::env::var("BOT_TOKEN"))
                .context("Missing bot token! Set DISCORD_TOKEN")?,
            guild_id: parse_optional("GUILD_ID")?,
            owner_id: parse_optional("OWNER_ID")?,

            download_dir: prepare_download_dir(Path::new(
                &std::env::var("DOWNLOAD_DIR").unwrap_or_else(|_| "download".to_string()),
            ))?,
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),

            activity: std::env::var("BOT_ACTIVITY")
                .unwrap_or_else(|_| "Listening to the queue".to_string()),
        };

        config.validate()?;

        Ok(config)
    }

    /// Sanity checks on loaded values.
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("Missing bot token!");
        }

        if !self.download_dir.is_dir() {
            anyhow::bail!(
                "DOWNLOAD_DIR must be a directory, got: {}",
                self.download_dir.display()
            );
        }

        Ok(())
    }

    /// Configuration summary for startup logs. Never includes the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: {}\n  \
            Owner: {}\n  \
            Downloads: {} (via {})",
            self.guild_id
                .map_or("global".to_string(), |id| format!("guild {id}")),
            self.owner_id
                .map_or("none".to_string(), |id| id.to_string()),
            self.download_dir.display(),
            self.ytdlp_path,
        )
    }
}

fn parse_optional(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => Ok(Some(
            val.trim()
                .parse()
                .with_context(|| format!("{key} must be a numeric id, got: {val}"))?,
        )),
        _ => Ok(None),
    }
}

/// Creates the download directory if missing and returns its absolute path.
/// Fails if the path exists but is not a directory.
pub fn prepare_download_dir(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("could not create {}", path.display()))?;
    } else if !path.is_dir() {
        anyhow::bail!("DOWNLOAD_DIR must be a directory, got: {}", path.display());
    }

    path.canonicalize()
        .with_context(|| format!("could not resolve {}", path.display()))
}

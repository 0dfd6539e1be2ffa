//! Import configuration.
//!
//! The TOML file supplies defaults for retry, downloads, and Discord
//! settings; command-line flags override them. The source mode only comes
//! from the command line.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which part of an export to import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMode {
    /// One day of one channel.
    File { path: PathBuf, dest: String },
    /// All days of one channel; destination defaults to the directory name.
    Dir { path: PathBuf, dest: Option<String> },
    /// A whole export, one subdirectory per channel.
    Tree {
        path: PathBuf,
        channel_file: Option<PathBuf>,
    },
}

/// Retry policy for Discord calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt before a task fails.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Growth factor per retry.
    #[serde(default = "default_factor")]
    pub factor: u32,

    /// Upper bound on a single delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            factor: default_factor(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

const fn default_max_retries() -> u32 {
    5
}

const fn default_base_delay_ms() -> u64 {
    1000
}

const fn default_factor() -> u32 {
    2
}

const fn default_max_delay_ms() -> u64 {
    60_000
}

/// Attachment download settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadsConfig {
    /// Directory for downloaded files; a fresh timestamped dir if unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Treat "not found" downloads as warnings instead of errors.
    #[serde(default)]
    pub ignore_not_found: bool,
}

/// Discord settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Server (guild) name; only needed when the bot is in several.
    #[serde(default)]
    pub server: Option<String>,

    /// Create missing destination channels instead of failing.
    #[serde(default)]
    pub create_channels: bool,

    /// REST API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            server: None,
            create_channels: false,
            api_base: default_api_base(),
        }
    }
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

/// Settings loaded from the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub downloads: DownloadsConfig,

    #[serde(default)]
    pub discord: DiscordConfig,
}

impl AppConfig {
    /// Get the default config file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("slack2discord")
            .join("config.toml")
    }

    /// Downloads directory, falling back to `./downloads/<unix seconds>`.
    #[must_use]
    pub fn downloads_dir(&self) -> PathBuf {
        self.downloads.dir.clone().unwrap_or_else(|| {
            PathBuf::from("downloads").join(chrono::Utc::now().timestamp().to_string())
        })
    }
}

/// Everything the pipeline needs for one run.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub source: SourceMode,
    pub users_file: Option<PathBuf>,
    pub downloads_dir: PathBuf,
    pub ignore_not_found: bool,
    pub create_channels: bool,
    pub dry_run: bool,
    /// Continue with the next channel after one fails.
    pub keep_going: bool,
    pub retry: RetryConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay(), Duration::from_secs(1));
        assert!(!config.downloads.ignore_not_found);
        assert_eq!(config.discord.api_base, "https://discord.com/api/v10");
    }

    #[test]
    fn test_explicit_downloads_dir_wins() {
        let mut config = AppConfig::default();
        config.downloads.dir = Some(PathBuf::from("/tmp/dl"));
        assert_eq!(config.downloads_dir(), PathBuf::from("/tmp/dl"));
    }

    #[test]
    fn test_default_downloads_dir_is_timestamped() {
        let dir = AppConfig::default().downloads_dir();
        assert!(dir.starts_with("downloads"));
        assert_eq!(dir.components().count(), 2);
    }
}

//! CLI interface using clap.
//!
//! Provides the command-line arguments and their validation into an
//! import configuration.

use std::path::PathBuf;

use clap::Parser;

use crate::domain::{AppConfig, AppError, ImportConfig, Result, SourceMode};

/// slack2discord - Import a Slack export into Discord channels.
///
/// Pick exactly one source: a single day file, one channel directory, or a
/// whole export tree.
#[derive(Parser, Debug)]
#[command(name = "slack2discord")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// A single day file (`YYYY-MM-DD.json`) of one channel.
    #[arg(long, value_name = "FILE")]
    pub src_file: Option<PathBuf>,

    /// One channel directory of day files.
    #[arg(long, value_name = "DIR")]
    pub src_dir: Option<PathBuf>,

    /// The top of a Slack export, one subdirectory per channel.
    #[arg(long, value_name = "DIR")]
    pub src_dirtree: Option<PathBuf>,

    /// Discord channel to post to (required with --src-file).
    #[arg(long, value_name = "CHANNEL")]
    pub dest_channel: Option<String>,

    /// File of `slack-channel [discord-channel]` lines (only with --src-dirtree).
    #[arg(long, value_name = "FILE")]
    pub channel_file: Option<PathBuf>,

    /// Slack `users.json` (guessed from the export layout if not given).
    #[arg(long, value_name = "FILE")]
    pub users_file: Option<PathBuf>,

    /// Where to download attached files.
    #[arg(long, value_name = "DIR")]
    pub downloads_dir: Option<PathBuf>,

    /// Log files that are gone from Slack as warnings instead of failing.
    #[arg(long)]
    pub ignore_file_not_found: bool,

    /// Create destination channels that do not exist yet.
    #[arg(long)]
    pub create: bool,

    /// Discord server name, if the bot is in more than one.
    #[arg(long)]
    pub server: Option<String>,

    /// Discord bot token.
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Slack token for downloading private files.
    #[arg(long, env = "SLACK_TOKEN", hide_env_values = true)]
    pub slack_token: Option<String>,

    /// Continue with the next channel when one fails.
    #[arg(long)]
    pub keep_going: bool,

    /// Parse, download and log everything, but change nothing in Discord.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file (default: <config dir>/slack2discord/config.toml).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

fn config_error(message: &str) -> AppError {
    AppError::Config {
        message: message.to_string(),
    }
}

impl Cli {
    /// Validate the source flags into a source mode.
    ///
    /// # Errors
    /// Returns a config error for missing or conflicting source flags.
    pub fn source_mode(&self) -> Result<SourceMode> {
        match (&self.src_file, &self.src_dir, &self.src_dirtree) {
            (Some(path), None, None) => {
                self.reject_channel_file("--src-file")?;
                let dest = self
                    .dest_channel
                    .clone()
                    .ok_or_else(|| config_error("--dest-channel is required with --src-file"))?;
                Ok(SourceMode::File {
                    path: path.clone(),
                    dest,
                })
            }
            (None, Some(path), None) => {
                self.reject_channel_file("--src-dir")?;
                Ok(SourceMode::Dir {
                    path: path.clone(),
                    dest: self.dest_channel.clone(),
                })
            }
            (None, None, Some(path)) => {
                if self.dest_channel.is_some() {
                    return Err(config_error(
                        "--dest-channel cannot be used with --src-dirtree (use --channel-file)",
                    ));
                }
                Ok(SourceMode::Tree {
                    path: path.clone(),
                    channel_file: self.channel_file.clone(),
                })
            }
            (None, None, None) => Err(config_error(
                "one of --src-file, --src-dir or --src-dirtree is required",
            )),
            _ => Err(config_error(
                "only one of --src-file, --src-dir or --src-dirtree may be given",
            )),
        }
    }

    fn reject_channel_file(&self, source_flag: &str) -> Result<()> {
        if self.channel_file.is_some() {
            return Err(AppError::Config {
                message: format!("--channel-file cannot be used with {source_flag}"),
            });
        }
        Ok(())
    }

    /// The Discord token, from the flag or `DISCORD_TOKEN`.
    ///
    /// # Errors
    /// Returns a config error if no token was given.
    pub fn discord_token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| config_error("a Discord bot token is required (--token or DISCORD_TOKEN)"))
    }

    /// Server name from the flag, falling back to the config file.
    #[must_use]
    pub fn server<'a>(&'a self, app: &'a AppConfig) -> Option<&'a str> {
        self.server.as_deref().or(app.discord.server.as_deref())
    }

    /// Merge flags over the config file into a run configuration.
    ///
    /// # Errors
    /// Returns a config error if the source flags are invalid.
    pub fn import_config(&self, app: &AppConfig) -> Result<ImportConfig> {
        Ok(ImportConfig {
            source: self.source_mode()?,
            users_file: self.users_file.clone(),
            downloads_dir: self
                .downloads_dir
                .clone()
                .unwrap_or_else(|| app.downloads_dir()),
            ignore_not_found: self.ignore_file_not_found || app.downloads.ignore_not_found,
            create_channels: self.create || app.discord.create_channels,
            dry_run: self.dry_run,
            keep_going: self.keep_going,
            retry: app.retry.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut cli = Cli::try_parse_from(std::iter::once("slack2discord").chain(args.iter().copied()))
            .unwrap();
        cli.token = Some("bot-token".into());
        cli
    }

    #[test]
    fn test_src_file_requires_dest() {
        let cli = parse(&["--src-file", "general/2023-01-01.json"]);
        assert!(matches!(cli.source_mode(), Err(AppError::Config { .. })));

        let cli = parse(&["--src-file", "a.json", "--dest-channel", "general"]);
        assert_eq!(
            cli.source_mode().unwrap(),
            SourceMode::File {
                path: "a.json".into(),
                dest: "general".into()
            }
        );
    }

    #[test]
    fn test_src_dir_dest_optional() {
        let cli = parse(&["--src-dir", "export/general"]);
        assert_eq!(
            cli.source_mode().unwrap(),
            SourceMode::Dir {
                path: "export/general".into(),
                dest: None
            }
        );
    }

    #[test]
    fn test_dirtree_rejects_dest_channel() {
        let cli = parse(&["--src-dirtree", "export", "--dest-channel", "general"]);
        assert!(matches!(cli.source_mode(), Err(AppError::Config { .. })));
    }

    #[test]
    fn test_channel_file_only_with_dirtree() {
        let cli = parse(&["--src-dir", "export/general", "--channel-file", "map.txt"]);
        assert!(matches!(cli.source_mode(), Err(AppError::Config { .. })));

        let cli = parse(&["--src-dirtree", "export", "--channel-file", "map.txt"]);
        assert!(matches!(
            cli.source_mode().unwrap(),
            SourceMode::Tree {
                channel_file: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_source_flags_exclusive() {
        let cli = parse(&["--src-dir", "a", "--src-dirtree", "b"]);
        assert!(matches!(cli.source_mode(), Err(AppError::Config { .. })));
        let cli = parse(&[]);
        assert!(matches!(cli.source_mode(), Err(AppError::Config { .. })));
    }

    #[test]
    fn test_token_required() {
        let mut cli = parse(&["--src-dirtree", "export"]);
        assert_eq!(cli.discord_token().unwrap(), "bot-token");
        cli.token = Some("  ".into());
        assert!(matches!(cli.discord_token(), Err(AppError::Config { .. })));
        cli.token = None;
        assert!(cli.discord_token().is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut app = AppConfig::default();
        app.downloads.dir = Some("/from/config".into());
        app.discord.server = Some("Config Server".into());

        let cli = parse(&[
            "--src-dirtree",
            "export",
            "--downloads-dir",
            "/from/flag",
            "--create",
            "-n",
            "--server",
            "Flag Server",
        ]);
        let config = cli.import_config(&app).unwrap();

        assert_eq!(config.downloads_dir, PathBuf::from("/from/flag"));
        assert!(config.create_channels);
        assert!(config.dry_run);
        assert!(!config.keep_going);
        assert_eq!(cli.server(&app), Some("Flag Server"));
    }

    #[test]
    fn test_config_file_fills_unset_flags() {
        let mut app = AppConfig::default();
        app.downloads.dir = Some("/from/config".into());
        app.downloads.ignore_not_found = true;

        let cli = parse(&["--src-dirtree", "export"]);
        let config = cli.import_config(&app).unwrap();

        assert_eq!(config.downloads_dir, PathBuf::from("/from/config"));
        assert!(config.ignore_not_found);
        assert_eq!(cli.server(&app), None);
    }
}

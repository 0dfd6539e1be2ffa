//! Domain models for Slack export data and Discord post tasks.
//!
//! These types are the validated form of the loosely-typed export records;
//! everything optional in the export is explicitly `Option` here.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;

/// A Slack message timestamp (`"1674412345.123456"`).
///
/// Stored as integer seconds plus microseconds so ordering is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SlackTs {
    secs: i64,
    micros: u32,
}

impl SlackTs {
    #[must_use]
    pub const fn new(secs: i64, micros: u32) -> Self {
        Self { secs, micros }
    }

    /// Local wall-clock time, if representable.
    #[must_use]
    pub fn to_local(self) -> Option<DateTime<Local>> {
        DateTime::from_timestamp(self.secs, self.micros * 1000).map(|dt| dt.with_timezone(&Local))
    }
}

impl FromStr for SlackTs {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (secs, frac) = s.split_once('.').unwrap_or((s, ""));
        let secs: i64 = secs
            .parse()
            .map_err(|_| format!("invalid timestamp: {s:?}"))?;

        if frac.len() > 6 || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("invalid timestamp fraction: {s:?}"));
        }
        let micros = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<6}")
                .parse()
                .map_err(|_| format!("invalid timestamp fraction: {s:?}"))?
        };

        Ok(Self { secs, micros })
    }
}

impl fmt::Display for SlackTs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs, self.micros)
    }
}

/// One day of one channel's raw records, exactly as read from disk.
#[derive(Debug, Clone)]
pub struct ExportFile {
    /// Source channel, `None` in single-file mode.
    pub channel: Option<String>,
    /// Calendar day, when the file is named `YYYY-MM-DD.json`.
    pub date: Option<NaiveDate>,
    pub path: PathBuf,
    pub records: Vec<serde_json::Value>,
}

/// A channel to import: where it comes from and where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Slack channel name, `None` in single-file mode.
    pub source_name: Option<String>,
    /// Discord channel name.
    pub destination_name: String,
}

impl Channel {
    /// Whether a name is acceptable for a new Discord text channel.
    #[must_use]
    pub fn is_valid_destination_name(name: &str) -> bool {
        (1..=100).contains(&name.len())
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            && !name.contains("--")
    }
}

/// Who wrote a message, as referenced from the record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorRef {
    pub user_id: Option<String>,
    /// Labels embedded in the record itself, in priority order.
    pub inline: Vec<String>,
}

/// Position of a message within thread structure (one level deep).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadLink {
    TopLevel,
    Root,
    Reply { parent: SlackTs },
}

/// Whether the source file still existed at export time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Normal,
    Tombstoned { deleted_at: Option<i64> },
}

/// A file attached to a Slack message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub url: String,
    pub size: Option<u64>,
    pub lifecycle: Lifecycle,
}

impl Attachment {
    #[must_use]
    pub const fn is_tombstoned(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Tombstoned { .. })
    }
}

/// A link unfurl (Slack "attachment"), rendered as a Discord embed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkRef {
    pub title: Option<String>,
    pub title_link: Option<String>,
    pub text: Option<String>,
    pub service_name: Option<String>,
    pub service_icon: Option<String>,
    pub image_url: Option<String>,
    pub thumb_url: Option<String>,
}

/// A validated Slack message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub ts: SlackTs,
    /// Position in the channel's input stream; breaks timestamp ties.
    pub seq: usize,
    pub author: AuthorRef,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub links: Vec<LinkRef>,
    pub thread: ThreadLink,
}

impl Message {
    /// Sort key: timestamp, then input order.
    #[must_use]
    pub const fn order_key(&self) -> (SlackTs, usize) {
        (self.ts, self.seq)
    }
}

/// An author resolved from user metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    /// Candidate labels in priority order; never empty.
    pub searchlist: Vec<String>,
}

/// A Discord channel id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelHandle(pub String);

/// A Discord thread id, created from a posted root message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadHandle(pub String);

/// A posted Discord message id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageHandle(pub String);

/// Where a post task is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostTarget {
    Channel(ChannelHandle),
    Thread(ThreadHandle),
}

/// Discord embed author block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedAuthor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// Discord embed image or thumbnail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedMedia {
    pub url: String,
}

/// A Discord link preview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedMedia>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedMedia>,
}

/// A local file ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub path: PathBuf,
    /// Name Discord should show for the file.
    pub filename: String,
}

/// One message payload sent to Discord.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: String,
    pub embeds: Vec<Embed>,
    pub files: Vec<UploadFile>,
}

/// The unit submitted to the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostTask {
    pub ts: SlackTs,
    pub target: PostTarget,
    /// Content chunks, each within Discord's length limit; never empty.
    pub content: Vec<String>,
    pub embeds: Vec<Embed>,
    pub files: Vec<UploadFile>,
    /// Thread name to create from this message once posted.
    pub opens_thread: Option<String>,
}

/// Result of a posted task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostReceipt {
    /// The first message posted for the task.
    pub message: MessageHandle,
    pub thread: Option<ThreadHandle>,
}

/// Counters for the final run report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChannelReport {
    pub channel: String,
    pub messages_posted: usize,
    pub messages_total: usize,
    pub threads_created: usize,
    pub files_uploaded: usize,
    pub failed: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slack_ts_parse() {
        let ts: SlackTs = "1674412345.123456".parse().unwrap();
        assert_eq!(ts, SlackTs::new(1_674_412_345, 123_456));
        assert_eq!(ts.to_string(), "1674412345.123456");
    }

    #[test]
    fn test_slack_ts_short_fraction() {
        let ts: SlackTs = "10.5".parse().unwrap();
        assert_eq!(ts, SlackTs::new(10, 500_000));
        let whole: SlackTs = "10".parse().unwrap();
        assert_eq!(whole, SlackTs::new(10, 0));
    }

    #[test]
    fn test_slack_ts_ordering_is_exact() {
        let a: SlackTs = "1674412345.000009".parse().unwrap();
        let b: SlackTs = "1674412345.000010".parse().unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_slack_ts_rejects_garbage() {
        assert!("abc".parse::<SlackTs>().is_err());
        assert!("1.2.3".parse::<SlackTs>().is_err());
        assert!("1.1234567".parse::<SlackTs>().is_err());
    }

    #[test]
    fn test_valid_channel_names() {
        let longest = "1".repeat(100);
        for name in [
            "general",
            "foo-bar",
            "foo_bar",
            "foo-_-bar",
            "foo__bar",
            "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz1234567890-_",
            longest.as_str(),
        ] {
            assert!(Channel::is_valid_destination_name(name), "{name}");
        }
    }

    #[test]
    fn test_invalid_channel_names() {
        let too_long = "1".repeat(101);
        for name in ["foo--bar", "", "foo#bar", "foo bar", too_long.as_str()] {
            assert!(!Channel::is_valid_destination_name(name), "{name}");
        }
    }
}

//! JSON parsing for Slack export records.
//!
//! Handles validation of raw day-file records into domain messages.

use std::path::Path;

use serde::Deserialize;

use crate::domain::{
    AppError, Attachment, AuthorRef, ExportFile, Lifecycle, LinkRef, Message, Result, SlackTs,
    ThreadLink,
};

/// File modes for attachments that cannot be downloaded.
const UNAVAILABLE_FILE_MODES: &[&str] = &["tombstone", "hidden_by_limit"];

/// Raw message record as stored in a day file.
#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    user_profile: Option<RawProfile>,
    #[serde(default)]
    bot_profile: Option<RawBotProfile>,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    replies: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    reply_count: Option<u64>,
    #[serde(default)]
    files: Option<Vec<RawFile>>,
    #[serde(default)]
    attachments: Option<Vec<RawLink>>,
}

#[derive(Debug, Deserialize, Default)]
struct RawProfile {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawBotProfile {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url_private: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    date_deleted: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawLink {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    title_link: Option<String>,
    #[serde(default)]
    from_url: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    service_name: Option<String>,
    #[serde(default)]
    service_icon: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    thumb_url: Option<String>,
}

/// Parses every message of a channel, in file order then record order.
///
/// # Errors
/// Returns a parse error for the first malformed message record.
pub fn parse_channel(files: &[ExportFile]) -> Result<Vec<Message>> {
    let mut messages = Vec::new();

    for file in files {
        tracing::debug!(
            channel = ?file.channel,
            date = ?file.date,
            "Parsing export file: {}",
            file.path.display()
        );
        for (index, record) in file.records.iter().enumerate() {
            if let Some(message) = parse_record(record, &file.path, index, messages.len())? {
                messages.push(message);
            }
        }
    }

    Ok(messages)
}

/// Parses one record; records that are not messages yield `None`.
///
/// # Errors
/// Returns a parse error if a message record is malformed.
pub fn parse_record(
    record: &serde_json::Value,
    path: &Path,
    index: usize,
    seq: usize,
) -> Result<Option<Message>> {
    if !record.is_object() {
        return Err(AppError::parse_record(path, index, "record is not an object"));
    }

    let kind = record.get("type").and_then(serde_json::Value::as_str);
    if kind != Some("message") {
        tracing::debug!(record = index, kind = ?kind, "Skipping non-message record");
        return Ok(None);
    }

    let raw: RawMessage =
        serde_json::from_value(record.clone()).map_err(|e| AppError::Parse {
            path: path.to_path_buf(),
            record: Some(index),
            message: e.to_string(),
            source: Some(e),
        })?;

    let ts = parse_ts(raw.ts.as_deref(), "ts", path, index)?;
    let thread = match raw.thread_ts.as_deref() {
        Some(parent) => {
            let parent = parse_ts(Some(parent), "thread_ts", path, index)?;
            if parent == ts {
                ThreadLink::Root
            } else {
                ThreadLink::Reply { parent }
            }
        }
        None if raw.replies.is_some() || raw.reply_count.unwrap_or(0) > 0 => ThreadLink::Root,
        None => ThreadLink::TopLevel,
    };

    let attachments = raw
        .files
        .unwrap_or_default()
        .into_iter()
        .map(|f| to_attachment(f, path, index))
        .collect::<Result<Vec<_>>>()?;

    let links = raw
        .attachments
        .unwrap_or_default()
        .into_iter()
        .map(to_link)
        .collect();

    Ok(Some(Message {
        ts,
        seq,
        author: to_author(raw.user, raw.username, raw.user_profile, raw.bot_profile),
        text: raw.text.unwrap_or_default(),
        attachments,
        links,
        thread,
    }))
}

fn parse_ts(value: Option<&str>, field: &str, path: &Path, index: usize) -> Result<SlackTs> {
    let value = value.ok_or_else(|| AppError::parse_record(path, index, format!("missing {field}")))?;
    value
        .parse()
        .map_err(|e: String| AppError::parse_record(path, index, format!("{field}: {e}")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn to_author(
    user: Option<String>,
    username: Option<String>,
    profile: Option<RawProfile>,
    bot: Option<RawBotProfile>,
) -> AuthorRef {
    let profile = profile.unwrap_or_default();
    let bot = bot.unwrap_or_default();

    let inline = [
        profile.display_name,
        profile.real_name,
        username,
        bot.name,
        user.clone(),
    ]
    .into_iter()
    .filter_map(non_empty)
    .collect();

    AuthorRef {
        user_id: non_empty(user),
        inline,
    }
}

fn to_attachment(raw: RawFile, path: &Path, index: usize) -> Result<Attachment> {
    let unavailable = raw
        .mode
        .as_deref()
        .is_some_and(|mode| UNAVAILABLE_FILE_MODES.contains(&mode));

    if unavailable {
        return Ok(Attachment {
            id: raw.id.unwrap_or_default(),
            name: raw.name.unwrap_or_default(),
            url: raw.url_private.unwrap_or_default(),
            size: raw.size,
            lifecycle: Lifecycle::Tombstoned {
                deleted_at: raw.date_deleted,
            },
        });
    }

    let missing = |field: &str| AppError::parse_record(path, index, format!("file is missing {field}"));
    Ok(Attachment {
        id: raw.id.ok_or_else(|| missing("id"))?,
        name: raw.name.ok_or_else(|| missing("name"))?,
        url: raw.url_private.ok_or_else(|| missing("url_private"))?,
        size: raw.size,
        lifecycle: Lifecycle::Normal,
    })
}

fn to_link(raw: RawLink) -> LinkRef {
    LinkRef {
        title: raw.title,
        title_link: raw.title_link.or(raw.from_url),
        text: raw.text,
        service_name: raw.service_name,
        service_icon: raw.service_icon,
        image_url: raw.image_url,
        thumb_url: raw.thumb_url,
    }
}

//! Slack export discovery.
//!
//! Finds the day files of one or more channels on disk, reads them as raw
//! record lists, and locates the export's `users.json`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::domain::{AppError, Channel, ExportFile, Result, SourceMode};

use super::channel_file::{load_channel_file, strip_hash};

/// Name of the user metadata file at the top of an export.
const USERS_FILE_NAME: &str = "users.json";

/// A channel together with its day files, in date order.
#[derive(Debug, Clone)]
pub struct ScannedChannel {
    pub channel: Channel,
    pub files: Vec<ExportFile>,
}

/// Result of scanning an export.
#[derive(Debug, Clone)]
pub struct Scan {
    pub channels: Vec<ScannedChannel>,
    pub users_file: Option<PathBuf>,
}

/// Scans the export according to the source mode.
///
/// `users_file` overrides the users file that would otherwise be guessed
/// from the export layout.
///
/// # Errors
/// Returns `NotFound` for missing paths, `Structure` when a path does not
/// match the mode, and `Parse` when a day file is not a JSON record list.
pub fn scan(mode: &SourceMode, users_file: Option<&Path>) -> Result<Scan> {
    let channels = match mode {
        SourceMode::File { path, dest } => vec![scan_file(path, dest)?],
        SourceMode::Dir { path, dest } => vec![scan_dir(path, dest.as_deref())?],
        SourceMode::Tree { path, channel_file } => scan_tree(path, channel_file.as_deref())?,
    };

    let users_file = match users_file {
        Some(explicit) => Some(canonical(explicit)?),
        None => guess_users_file(mode),
    };

    Ok(Scan {
        channels,
        users_file,
    })
}

/// Derives the channel name from a directory path.
///
/// The path is canonicalized first, so `a/b/`, `a/b/.` and `a/b` all give `b`.
///
/// # Errors
/// Returns error if the path does not exist or has no final component.
pub fn infer_channel_name(path: &Path) -> Result<String> {
    let canonical = canonical(path)?;
    canonical
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            AppError::structure(format!(
                "Cannot infer a channel name from {}",
                canonical.display()
            ))
        })
}

/// Returns the date if the name has the `YYYY-MM-DD.json` day file form.
#[must_use]
pub fn day_file_date(file_name: &str) -> Option<NaiveDate> {
    let caps = day_file_regex().captures(file_name)?;
    NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()
}

#[allow(clippy::expect_used)]
fn day_file_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([0-9]{4}-[0-9]{2}-[0-9]{2})\.json$").expect("valid regex"))
}

fn canonical(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(AppError::NotFound {
            path: path.to_path_buf(),
        });
    }
    fs::canonicalize(path)
        .map_err(|e| AppError::io(format!("Failed to resolve {}", path.display()), e))
}

fn canonical_dir(path: &Path) -> Result<PathBuf> {
    let canonical = canonical(path)?;
    if !canonical.is_dir() {
        return Err(AppError::structure(format!(
            "Expected a directory but found a file: {}",
            path.display()
        )));
    }
    Ok(canonical)
}

fn scan_file(path: &Path, dest: &str) -> Result<ScannedChannel> {
    let path = canonical(path)?;
    if !path.is_file() {
        return Err(AppError::structure(format!(
            "Expected a single export file but found a directory: {}",
            path.display()
        )));
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let date = day_file_date(&file_name);
    if date.is_none() {
        tracing::warn!(
            "File is not named like a day file, will try to parse anyway: {}",
            path.display()
        );
    }

    let channel = Channel {
        source_name: None,
        destination_name: strip_hash(dest).to_string(),
    };
    tracing::info!(
        "Importing single file {} into #{}",
        path.display(),
        channel.destination_name
    );

    let file = read_export_file(&path, None, date)?;
    Ok(ScannedChannel {
        channel,
        files: vec![file],
    })
}

fn scan_dir(path: &Path, dest: Option<&str>) -> Result<ScannedChannel> {
    let dir = canonical_dir(path)?;
    let source = infer_channel_name(&dir)?;
    let destination = match dest {
        Some(d) => strip_hash(d).to_string(),
        None => {
            tracing::info!("Inferring destination channel from directory: {source}");
            source.clone()
        }
    };

    scan_channel_dir(
        &dir,
        Channel {
            source_name: Some(source),
            destination_name: destination,
        },
    )
}

fn scan_tree(path: &Path, channel_file: Option<&Path>) -> Result<Vec<ScannedChannel>> {
    let root = canonical_dir(path)?;
    let available = list_channel_dirs(&root)?;

    let channels: Vec<Channel> = match channel_file {
        Some(file) => load_channel_file(file)?
            .into_iter()
            .map(|mapping| {
                if available.contains(&mapping.source) {
                    Ok(Channel {
                        source_name: Some(mapping.source),
                        destination_name: mapping.destination,
                    })
                } else {
                    Err(AppError::structure(format!(
                        "Channel {} from {} is not in the export at {}",
                        mapping.source,
                        file.display(),
                        root.display()
                    )))
                }
            })
            .collect::<Result<_>>()?,
        None => available
            .into_iter()
            .map(|name| Channel {
                source_name: Some(name.clone()),
                destination_name: name,
            })
            .collect(),
    };

    tracing::info!(
        count = channels.len(),
        "Mapping of Slack to Discord channels: {:?}",
        channels
            .iter()
            .map(|c| (c.source_name.as_deref().unwrap_or_default(), c.destination_name.as_str()))
            .collect::<Vec<_>>()
    );

    channels
        .into_iter()
        .map(|channel| {
            let dir = root.join(channel.source_name.as_deref().unwrap_or_default());
            scan_channel_dir(&dir, channel)
        })
        .collect()
}

fn scan_channel_dir(dir: &Path, channel: Channel) -> Result<ScannedChannel> {
    let source = channel.source_name.as_deref().unwrap_or_default();
    tracing::info!(
        "Scanning Slack channel {source}, to import into #{}",
        channel.destination_name
    );

    let day_files = list_day_files(dir)?;
    if day_files.is_empty() {
        tracing::warn!(
            "No export day files found for channel {source} in {}",
            dir.display()
        );
    }

    let files = day_files
        .into_iter()
        .map(|(date, path)| read_export_file(&path, channel.source_name.clone(), Some(date)))
        .collect::<Result<Vec<_>>>()?;

    Ok(ScannedChannel { channel, files })
}

/// Lists `YYYY-MM-DD.json` files in a directory, sorted by date.
fn list_day_files(dir: &Path) -> Result<Vec<(NaiveDate, PathBuf)>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| AppError::io(format!("Failed to read directory {}", dir.display()), e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AppError::io("Failed to read directory entry", e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(date) = day_file_date(&entry.file_name().to_string_lossy()) {
            files.push((date, path));
        }
    }

    files.sort();
    Ok(files)
}

/// Lists channel subdirectories of an export root, sorted by name.
fn list_channel_dirs(root: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(root)
        .map_err(|e| AppError::io(format!("Failed to read directory {}", root.display()), e))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AppError::io("Failed to read directory entry", e))?;
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }

    names.sort();
    Ok(names)
}

fn read_export_file(
    path: &Path,
    channel: Option<String>,
    date: Option<NaiveDate>,
) -> Result<ExportFile> {
    tracing::debug!("Reading export file: {}", path.display());

    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read {}", path.display()), e))?;
    let records: Vec<serde_json::Value> =
        serde_json::from_str(&content).map_err(|e| AppError::parse_file(path, e))?;

    Ok(ExportFile {
        channel,
        date,
        path: path.to_path_buf(),
        records,
    })
}

fn guess_users_file(mode: &SourceMode) -> Option<PathBuf> {
    let guess = match mode {
        SourceMode::Tree { path, .. } => path.join(USERS_FILE_NAME),
        SourceMode::Dir { path, .. } => path.join("..").join(USERS_FILE_NAME),
        SourceMode::File { path, .. } => path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("..")
            .join(USERS_FILE_NAME),
    };

    match fs::canonicalize(&guess) {
        Ok(found) if found.is_file() => {
            tracing::info!("Users file found: {}", found.display());
            Some(found)
        }
        _ => {
            tracing::warn!(
                "No users file given and none found at {}, names will come from messages",
                guess.display()
            );
            None
        }
    }
}

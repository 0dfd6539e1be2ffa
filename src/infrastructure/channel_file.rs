//! Channel mapping file.
//!
//! One channel per line: `slack_name [discord_name]`. A single name keeps
//! the same name on both sides.

use std::fs;
use std::path::Path;

use crate::domain::{AppError, Result};

/// One line of the mapping file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMapping {
    pub source: String,
    pub destination: String,
}

/// Strips the leading pound sign from a channel name, if present.
#[must_use]
pub fn strip_hash(name: &str) -> &str {
    name.strip_prefix('#').unwrap_or(name)
}

/// Load channel mappings from a file.
///
/// # Errors
/// Returns error if the file is missing, unreadable, or has a malformed line.
pub fn load_channel_file(path: &Path) -> Result<Vec<ChannelMapping>> {
    if !path.exists() {
        return Err(AppError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read channel file: {}", path.display()), e))?;

    parse_channel_mappings(&content)
}

/// Parse mapping lines; blank lines are skipped.
///
/// # Errors
/// Returns error if a line has more than two fields.
pub fn parse_channel_mappings(content: &str) -> Result<Vec<ChannelMapping>> {
    let mut mappings = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [] => {}
            [source] => {
                let source = strip_hash(source).to_string();
                mappings.push(ChannelMapping {
                    destination: source.clone(),
                    source,
                });
            }
            [source, destination] => mappings.push(ChannelMapping {
                source: strip_hash(source).to_string(),
                destination: strip_hash(destination).to_string(),
            }),
            _ => {
                return Err(AppError::Config {
                    message: format!(
                        "Channel file line {} has too many fields: {fields:?}",
                        line_no + 1
                    ),
                })
            }
        }
    }

    Ok(mappings)
}

//! Domain-level error types for slack2discord.
//!
//! All errors are typed with `thiserror`. Each variant is fatal to the run
//! (or, for posting, to the current channel); recoverable conditions such as
//! tombstoned attachments are logged as warnings and never reach this enum.

use std::path::PathBuf;
use thiserror::Error;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// A named source path does not exist.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// The export path does not have the shape the scan mode expects.
    #[error("Unexpected export structure: {message}")]
    Structure { message: String },

    /// A day file could not be read as a list of message records.
    #[error("Failed to parse {}{}: {message}", path.display(), record.map(|i| format!(" (record {i})")).unwrap_or_default())]
    Parse {
        path: PathBuf,
        record: Option<usize>,
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Fetching an attachment from Slack failed.
    #[error("Download failed for {url}: {message}")]
    Download { url: String, message: String },

    /// Discord refused a call, or retries were exhausted.
    #[error("Posting to #{channel} failed: {message}")]
    Post { channel: String, message: String },

    /// JSON parsing failed outside of an export day file.
    #[error("JSON parse error: {message}")]
    JsonParse {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Configuration or environment error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl AppError {
    /// Create a JSON parse error.
    pub fn json_parse(err: serde_json::Error) -> Self {
        Self::JsonParse {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Create a structure error.
    pub fn structure(message: impl Into<String>) -> Self {
        Self::Structure {
            message: message.into(),
        }
    }

    /// Create a parse error for a whole file.
    pub fn parse_file(path: impl Into<PathBuf>, err: serde_json::Error) -> Self {
        Self::Parse {
            path: path.into(),
            record: None,
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create a parse error for a single record within a file.
    pub fn parse_record(path: impl Into<PathBuf>, record: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            record: Some(record),
            message: message.into(),
            source: None,
        }
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

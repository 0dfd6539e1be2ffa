//! Boundaries to the outside world: Slack file downloads, the Discord API,
//! and the clock.
//!
//! The pipeline awaits every call before issuing the next, so an
//! implementation never sees overlapping requests.

use std::fmt;
use std::time::Duration;

use super::error::Result;
use super::models::{ChannelHandle, MessageHandle, OutgoingMessage, PostTarget, ThreadHandle};

/// Outcome of fetching an attachment body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Body(Vec<u8>),
    /// The server answered "not found" (file deleted after export, or token revoked).
    NotFound,
}

/// Fetches attachment bodies from the source platform.
///
/// Transport failures other than "not found" are returned as
/// [`AppError::Download`](super::AppError::Download).
pub trait Downloader {
    async fn fetch(&self, url: &str) -> Result<Fetched>;
}

/// Classified failure of a single destination call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostFailure {
    /// "Too many requests"; the server may say how long to wait.
    RateLimited { retry_after: Option<Duration> },
    /// Network trouble or a server-side error; worth retrying.
    Transient(String),
    /// Authorization, permission, or validation failure; never retried.
    Permanent(String),
}

impl PostFailure {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Permanent(_))
    }
}

impl fmt::Display for PostFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited {
                retry_after: Some(d),
            } => write!(f, "rate limited (retry after {}ms)", d.as_millis()),
            Self::RateLimited { retry_after: None } => write!(f, "rate limited"),
            Self::Transient(msg) => write!(f, "transient error: {msg}"),
            Self::Permanent(msg) => write!(f, "permanent error: {msg}"),
        }
    }
}

/// Result of a single destination call.
pub type PostResult<T> = std::result::Result<T, PostFailure>;

/// The destination chat platform.
pub trait Destination {
    /// Look up an existing text channel by name.
    async fn find_channel(&self, name: &str) -> PostResult<Option<ChannelHandle>>;

    /// Create a text channel. Only called when creation is enabled.
    async fn create_channel(&self, name: &str) -> PostResult<ChannelHandle>;

    /// Post one message to a channel or thread.
    async fn send_message(
        &self,
        target: &PostTarget,
        message: &OutgoingMessage,
    ) -> PostResult<MessageHandle>;

    /// Start a thread anchored at a posted message.
    async fn start_thread(
        &self,
        channel: &ChannelHandle,
        message: &MessageHandle,
        name: &str,
    ) -> PostResult<ThreadHandle>;
}

/// Waits between retries.
pub trait Sleeper {
    async fn sleep(&self, delay: Duration);
}

/// Real-time sleeper backed by tokio's timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

//! Posting with retries.
//!
//! Each destination call runs through a small state machine:
//! `Pending -> Sending -> Posted | Retrying | Failed`, with
//! `Retrying -> Sending` after the backoff delay.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::domain::{
    AppError, Channel, ChannelHandle, Destination, MessageHandle, OutgoingMessage, PostFailure,
    PostReceipt, PostResult, PostTarget, PostTask, Result, RetryConfig, Sleeper, SlackTs,
    ThreadHandle,
};

/// Delay before retry number `attempt` (starting at 1).
pub trait Backoff {
    fn delay(&self, attempt: u32) -> Duration;
}

impl<F: Fn(u32) -> Duration> Backoff for F {
    fn delay(&self, attempt: u32) -> Duration {
        self(attempt)
    }
}

/// `base * factor^(attempt - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub factor: u32,
    pub max: Duration,
}

impl ExponentialBackoff {
    #[must_use]
    pub const fn from_config(config: &RetryConfig) -> Self {
        Self {
            base: config.base_delay(),
            factor: config.factor,
            max: config.max_delay(),
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        self.factor
            .checked_pow(attempt.saturating_sub(1))
            .and_then(|m| self.base.checked_mul(m))
            .map_or(self.max, |d| d.min(self.max))
    }
}

/// Where a single destination call stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostState {
    Pending,
    Sending { attempt: u32 },
    Retrying { attempt: u32, delay: Duration },
    Posted { attempt: u32 },
    Failed { reason: String },
}

impl fmt::Display for PostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Sending { attempt } => write!(f, "sending (attempt {attempt})"),
            Self::Retrying { attempt, delay } => {
                write!(f, "retrying after attempt {attempt} in {}ms", delay.as_millis())
            }
            Self::Posted { attempt } => write!(f, "posted (attempt {attempt})"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Posts one channel's tasks, one call in flight at a time.
pub struct Poster<'a, D, S, B = ExponentialBackoff> {
    destination: &'a D,
    sleeper: &'a S,
    backoff: B,
    max_retries: u32,
    channel_name: String,
    dry_run: bool,
    posted: usize,
}

impl<'a, D: Destination, S: Sleeper, B: Backoff> Poster<'a, D, S, B> {
    pub fn new(
        destination: &'a D,
        sleeper: &'a S,
        backoff: B,
        max_retries: u32,
        channel_name: impl Into<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            destination,
            sleeper,
            backoff,
            max_retries,
            channel_name: channel_name.into(),
            dry_run,
            posted: 0,
        }
    }

    /// Tasks posted so far.
    #[must_use]
    pub const fn posted(&self) -> usize {
        self.posted
    }

    /// Look up the channel this poster writes to, creating it if allowed.
    ///
    /// # Errors
    /// Returns a post error if the channel is missing and creation is off,
    /// a config error if the name cannot be used for a new channel, or a post
    /// error if the destination calls fail.
    pub async fn find_or_create_channel(&mut self, create: bool) -> Result<ChannelHandle> {
        let destination = self.destination;
        let name = self.channel_name.clone();

        if let Some(handle) = self
            .with_retry("channel lookup", || destination.find_channel(&name))
            .await?
        {
            tracing::debug!(channel = %name, "Found channel");
            return Ok(handle);
        }

        if !create {
            return Err(self.error_message(
                "channel does not exist (use --create to create it)".to_string(),
            ));
        }
        if !Channel::is_valid_destination_name(&name) {
            return Err(AppError::Config {
                message: format!("Invalid Discord channel name: {name:?}"),
            });
        }

        if self.dry_run {
            tracing::info!(channel = %name, "[dry-run] would create channel");
            return Ok(ChannelHandle(format!("dry-run-{name}")));
        }

        let handle = self
            .with_retry("channel creation", || destination.create_channel(&name))
            .await?;
        tracing::info!(channel = %name, "Created channel");
        Ok(handle)
    }

    /// Post a task: each content chunk in order, then the thread if the
    /// task opens one.
    ///
    /// # Errors
    /// Returns a post error on a permanent failure or once retries are
    /// exhausted.
    pub async fn post(&mut self, task: &PostTask) -> Result<PostReceipt> {
        if self.dry_run {
            return Ok(self.pretend(task));
        }

        let destination = self.destination;
        let what = format!("message {}", task.ts);
        let last = task.content.len().saturating_sub(1);
        let mut first: Option<MessageHandle> = None;

        for (i, chunk) in task.content.iter().enumerate() {
            let message = OutgoingMessage {
                content: chunk.clone(),
                embeds: if i == last { task.embeds.clone() } else { Vec::new() },
                files: if i == last { task.files.clone() } else { Vec::new() },
            };
            let handle = self
                .with_retry(&what, || {
                    destination.send_message(&task.target, &message)
                })
                .await?;
            first.get_or_insert(handle);
        }

        let Some(message) = first else {
            return Err(self.error(task.ts, "task has no content"));
        };

        let thread = match (&task.opens_thread, &task.target) {
            (Some(name), PostTarget::Channel(channel)) => Some(
                self.with_retry(&format!("thread {}", task.ts), || {
                    destination.start_thread(channel, &message, name)
                })
                .await?,
            ),
            (Some(_), PostTarget::Thread(_)) => {
                return Err(self.error(task.ts, "cannot open a thread inside a thread"));
            }
            (None, _) => None,
        };

        self.posted += 1;
        tracing::debug!(
            channel = %self.channel_name,
            ts = %task.ts,
            chunks = task.content.len(),
            files = task.files.len(),
            "Posted"
        );

        Ok(PostReceipt { message, thread })
    }

    fn pretend(&mut self, task: &PostTask) -> PostReceipt {
        self.posted += 1;
        let where_to = match &task.target {
            PostTarget::Channel(_) => "channel",
            PostTarget::Thread(_) => "thread",
        };
        for chunk in &task.content {
            tracing::info!(
                channel = %self.channel_name,
                ts = %task.ts,
                target = where_to,
                files = task.files.len(),
                embeds = task.embeds.len(),
                "[dry-run] would post: {chunk}"
            );
        }
        if let Some(name) = &task.opens_thread {
            tracing::info!(channel = %self.channel_name, ts = %task.ts, "[dry-run] would start thread {name}");
        }

        PostReceipt {
            message: MessageHandle(format!("dry-run-{}", self.posted)),
            thread: task
                .opens_thread
                .as_ref()
                .map(|_| ThreadHandle(format!("dry-run-thread-{}", task.ts))),
        }
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PostResult<T>>,
    {
        let mut state = PostState::Pending;
        let mut attempt: u32 = 0;
        let mut last_delay = Duration::ZERO;

        loop {
            attempt += 1;
            state = self.transition(&state, PostState::Sending { attempt }, what);

            let failure = match call().await {
                Ok(value) => {
                    self.transition(&state, PostState::Posted { attempt }, what);
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            if !failure.is_retryable() || attempt > self.max_retries {
                let reason = if failure.is_retryable() {
                    format!("{what}: gave up after {attempt} attempts: {failure}")
                } else {
                    format!("{what}: {failure}")
                };
                self.transition(&state, PostState::Failed { reason: reason.clone() }, what);
                return Err(self.error_message(reason));
            }

            // Never shorter than the last wait. A server hint above the
            // backoff repeats until the backoff overtakes it.
            let delay = self.retry_delay(attempt, &failure).max(last_delay);
            last_delay = delay;
            tracing::warn!(
                channel = %self.channel_name,
                call = what,
                attempt,
                delay_ms = delay.as_millis(),
                "{failure}, retrying"
            );
            state = self.transition(&state, PostState::Retrying { attempt, delay }, what);
            self.sleeper.sleep(delay).await;
        }
    }

    fn retry_delay(&self, attempt: u32, failure: &PostFailure) -> Duration {
        let backoff = self.backoff.delay(attempt);
        match failure {
            PostFailure::RateLimited {
                retry_after: Some(after),
            } => backoff.max(*after),
            _ => backoff,
        }
    }

    fn transition(&self, from: &PostState, to: PostState, what: &str) -> PostState {
        tracing::trace!(channel = %self.channel_name, call = what, "{from} -> {to}");
        to
    }

    fn error(&self, ts: SlackTs, message: &str) -> AppError {
        self.error_message(format!("message at {ts}: {message}"))
    }

    fn error_message(&self, message: String) -> AppError {
        AppError::Post {
            channel: self.channel_name.clone(),
            message,
        }
    }
}

/// Build a task for the channel itself.
#[must_use]
pub fn channel_task(ts: SlackTs, channel: &ChannelHandle, content: Vec<String>) -> PostTask {
    PostTask {
        ts,
        target: PostTarget::Channel(channel.clone()),
        content,
        embeds: Vec::new(),
        files: Vec::new(),
        opens_thread: None,
    }
}

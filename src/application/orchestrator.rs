//! The import pipeline.
//!
//! Everything that can fail on input (scan, parse, users, destination
//! channels) is checked before the first post. Channels are then imported
//! one after another, each one fully prepared, downloads included, before
//! its first message is sent.

use std::collections::HashMap;
use std::path::Path;

use crate::domain::{
    AppError, Channel, ChannelHandle, ChannelReport, Destination, Downloader, Embed, ImportConfig,
    Message, PostReceipt, PostTarget, PostTask, Result, Sleeper, SlackTs, ThreadHandle,
    UploadFile,
};
use crate::infrastructure::scan;

use super::attachments::{AttachmentManager, DownloadStats};
use super::converter::convert;
use super::linearizer::linearize;
use super::parser::parse_channel;
use super::poster::{ExponentialBackoff, Poster};
use super::users::UserDirectory;

/// Discord's limit on files per message.
pub const MAX_DISCORD_FILES: usize = 10;

/// What a run did, channel by channel.
#[derive(Debug, Default)]
pub struct ImportSummary {
    pub reports: Vec<ChannelReport>,
    pub downloads: DownloadStats,
    pub dry_run: bool,
    failures: Vec<AppError>,
}

impl ImportSummary {
    #[must_use]
    pub fn failed_channels(&self) -> usize {
        self.failures.len()
    }

    /// Turn the summary into the run's result: the first failure, if any.
    ///
    /// # Errors
    /// Returns the first channel failure of the run.
    pub fn finish(mut self) -> Result<()> {
        if self.failures.is_empty() {
            return Ok(());
        }
        if self.failures.len() > 1 {
            tracing::error!("{} channels failed", self.failures.len());
        }
        Err(self.failures.remove(0))
    }
}

/// A message converted and with its files on disk.
struct Prepared {
    ts: SlackTs,
    content: Vec<String>,
    embeds: Vec<Embed>,
    files: Vec<UploadFile>,
}

impl Prepared {
    fn into_task(self, target: PostTarget, opens_thread: Option<String>) -> PostTask {
        PostTask {
            ts: self.ts,
            target,
            content: self.content,
            embeds: self.embeds,
            files: self.files,
            opens_thread,
        }
    }
}

struct PreparedBlock {
    root: Prepared,
    replies: Vec<Prepared>,
}

/// Lookups shared by every channel of a run.
struct Context<'c> {
    users: &'c UserDirectory,
    /// Slack channel name to destination name, for `#channel` references.
    names: &'c HashMap<String, String>,
}

/// Runs an import against a destination.
pub struct Importer<'a, D, S> {
    config: &'a ImportConfig,
    destination: &'a D,
    sleeper: &'a S,
}

impl<'a, D: Destination, S: Sleeper> Importer<'a, D, S> {
    pub const fn new(config: &'a ImportConfig, destination: &'a D, sleeper: &'a S) -> Self {
        Self {
            config,
            destination,
            sleeper,
        }
    }

    /// Run the whole import.
    ///
    /// # Errors
    /// Returns error for anything that fails before posting starts. Failures
    /// while importing a channel are collected in the summary instead.
    pub async fn run<L: Downloader>(&self, downloader: L) -> Result<ImportSummary> {
        let scan = scan(&self.config.source, self.config.users_file.as_deref())?;

        let mut channels = Vec::with_capacity(scan.channels.len());
        for scanned in scan.channels {
            let messages = parse_channel(&scanned.files)?;
            tracing::info!(
                channel = %scanned.channel.destination_name,
                files = scanned.files.len(),
                messages = messages.len(),
                "Parsed channel"
            );
            channels.push((scanned.channel, messages));
        }

        let users = load_users(scan.users_file.as_deref())?;
        let names = channel_names(channels.iter().map(|(channel, _)| channel));

        let mut handles = Vec::with_capacity(channels.len());
        for (channel, _) in &channels {
            handles.push(
                self.poster(&channel.destination_name)
                    .find_or_create_channel(self.config.create_channels)
                    .await?,
            );
        }

        let ctx = Context {
            users: &users,
            names: &names,
        };
        let mut attachments = AttachmentManager::new(
            downloader,
            &self.config.downloads_dir,
            self.config.ignore_not_found,
        );
        let mut summary = ImportSummary {
            dry_run: self.config.dry_run,
            ..ImportSummary::default()
        };

        for ((channel, messages), handle) in channels.into_iter().zip(handles) {
            let mut report = ChannelReport {
                channel: channel.destination_name.clone(),
                ..ChannelReport::default()
            };

            let outcome = self
                .import_channel(&ctx, &channel, messages, &handle, &mut attachments, &mut report)
                .await;

            match outcome {
                Ok(()) => {
                    tracing::info!(
                        channel = %report.channel,
                        posted = report.messages_posted,
                        threads = report.threads_created,
                        "Channel imported"
                    );
                    summary.reports.push(report);
                }
                Err(err) => {
                    tracing::error!(channel = %report.channel, posted = report.messages_posted, "{err}");
                    report.failed = Some(err.to_string());
                    summary.reports.push(report);
                    summary.failures.push(err);
                    if !self.config.keep_going {
                        break;
                    }
                }
            }
        }

        attachments.log_summary();
        summary.downloads = attachments.stats();
        Ok(summary)
    }

    fn poster(&self, channel_name: &str) -> Poster<'a, D, S> {
        Poster::new(
            self.destination,
            self.sleeper,
            ExponentialBackoff::from_config(&self.config.retry),
            self.config.retry.max_retries,
            channel_name,
            self.config.dry_run,
        )
    }

    async fn import_channel<L: Downloader>(
        &self,
        ctx: &Context<'_>,
        channel: &Channel,
        messages: Vec<Message>,
        handle: &ChannelHandle,
        attachments: &mut AttachmentManager<L>,
        report: &mut ChannelReport,
    ) -> Result<()> {
        let blocks = linearize(messages);
        report.messages_total = blocks.iter().map(|b| 1 + b.replies.len()).sum();
        tracing::info!(
            channel = %channel.destination_name,
            messages = report.messages_total,
            "Importing channel"
        );

        let mut prepared = Vec::with_capacity(blocks.len());
        for block in &blocks {
            let root = prepare(&block.root, ctx, attachments).await?;
            let mut replies = Vec::with_capacity(block.replies.len());
            for reply in &block.replies {
                replies.push(prepare(reply, ctx, attachments).await?);
            }
            prepared.push(PreparedBlock { root, replies });
        }

        let mut poster = self.poster(&channel.destination_name);
        let mut threads: HashMap<SlackTs, ThreadHandle> = HashMap::new();

        for block in prepared {
            let root_ts = block.root.ts;
            let opens_thread = (!block.replies.is_empty()).then(|| format!("thread{root_ts}"));
            let task = block
                .root
                .into_task(PostTarget::Channel(handle.clone()), opens_thread);

            let receipt = post_task(&mut poster, &task, report).await?;
            if let Some(thread) = receipt.thread {
                threads.insert(root_ts, thread);
                report.threads_created += 1;
            }

            if block.replies.is_empty() {
                continue;
            }
            let Some(thread) = threads.get(&root_ts).cloned() else {
                return Err(AppError::Post {
                    channel: channel.destination_name.clone(),
                    message: format!("no thread was started for message {root_ts}"),
                });
            };
            for reply in block.replies {
                let task = reply.into_task(PostTarget::Thread(thread.clone()), None);
                post_task(&mut poster, &task, report).await?;
            }
        }

        Ok(())
    }
}

async fn prepare<L: Downloader>(
    message: &Message,
    ctx: &Context<'_>,
    attachments: &mut AttachmentManager<L>,
) -> Result<Prepared> {
    let rendered = convert(message, ctx.users, ctx.names);
    let mut files = attachments.resolve_all(&message.attachments).await?;
    if files.len() > MAX_DISCORD_FILES {
        tracing::warn!(
            ts = %message.ts,
            files = files.len(),
            "Too many files for one message, keeping the first {MAX_DISCORD_FILES}"
        );
        files.truncate(MAX_DISCORD_FILES);
    }

    Ok(Prepared {
        ts: message.ts,
        content: rendered.content,
        embeds: rendered.embeds,
        files,
    })
}

/// Post a task and count it, adding progress to a post error.
async fn post_task<D: Destination, S: Sleeper>(
    poster: &mut Poster<'_, D, S>,
    task: &PostTask,
    report: &mut ChannelReport,
) -> Result<PostReceipt> {
    match poster.post(task).await {
        Ok(receipt) => {
            report.messages_posted += 1;
            report.files_uploaded += task.files.len();
            Ok(receipt)
        }
        Err(AppError::Post { channel, message }) => Err(AppError::Post {
            channel,
            message: format!(
                "{message} ({} of {} messages posted)",
                report.messages_posted, report.messages_total
            ),
        }),
        Err(err) => Err(err),
    }
}

fn load_users(path: Option<&Path>) -> Result<UserDirectory> {
    match path {
        Some(path) => UserDirectory::load(path),
        None => {
            tracing::debug!("Resolving authors from message fields only");
            Ok(UserDirectory::default())
        }
    }
}

fn channel_names<'c>(channels: impl Iterator<Item = &'c Channel>) -> HashMap<String, String> {
    channels
        .filter_map(|c| {
            c.source_name
                .clone()
                .map(|source| (source, c.destination_name.clone()))
        })
        .collect()
}

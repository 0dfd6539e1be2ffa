//! Test doubles for the pipeline's outside boundaries.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::domain::{
    AppError, ChannelHandle, Destination, Downloader, Fetched, MessageHandle, OutgoingMessage,
    PostFailure, PostResult, PostTarget, Result, Sleeper, ThreadHandle,
};

/// Serves canned bodies by URL; unknown URLs fail like a dropped connection.
#[derive(Default)]
pub struct FakeDownloader {
    pub bodies: HashMap<String, Fetched>,
    pub calls: RefCell<Vec<String>>,
}

impl FakeDownloader {
    pub fn with(url: &str, fetched: Fetched) -> Self {
        Self {
            bodies: HashMap::from([(url.to_string(), fetched)]),
            calls: RefCell::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Downloader for FakeDownloader {
    async fn fetch(&self, url: &str) -> Result<Fetched> {
        self.calls.borrow_mut().push(url.to_string());
        self.bodies.get(url).cloned().ok_or_else(|| AppError::Download {
            url: url.to_string(),
            message: "connection reset".into(),
        })
    }
}

/// Records every call and answers from a script.
#[derive(Default)]
pub struct FakeDestination {
    pub channels: RefCell<HashMap<String, ChannelHandle>>,
    pub created: RefCell<Vec<String>>,
    pub sent: RefCell<Vec<(PostTarget, OutgoingMessage)>>,
    pub threads: RefCell<Vec<(ChannelHandle, MessageHandle, String)>>,
    /// Failures returned by the next `send_message` calls, in order.
    pub send_failures: RefCell<VecDeque<PostFailure>>,
    /// Failures returned by the next `start_thread` calls, in order.
    pub thread_failures: RefCell<VecDeque<PostFailure>>,
    /// Content substring that makes `send_message` fail permanently.
    pub reject_content: RefCell<Option<String>>,
    pub send_calls: Cell<usize>,
}

impl FakeDestination {
    pub fn with_channels(names: &[&str]) -> Self {
        let fake = Self::default();
        for name in names {
            fake.channels
                .borrow_mut()
                .insert((*name).to_string(), ChannelHandle(format!("c-{name}")));
        }
        fake
    }

    pub fn fail_sends(&self, failures: impl IntoIterator<Item = PostFailure>) {
        self.send_failures.borrow_mut().extend(failures);
    }

    pub fn sent_contents(&self) -> Vec<String> {
        self.sent
            .borrow()
            .iter()
            .map(|(_, m)| m.content.clone())
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.send_calls.get() + self.threads.borrow().len() + self.created.borrow().len()
    }
}

impl Destination for FakeDestination {
    async fn find_channel(&self, name: &str) -> PostResult<Option<ChannelHandle>> {
        Ok(self.channels.borrow().get(name).cloned())
    }

    async fn create_channel(&self, name: &str) -> PostResult<ChannelHandle> {
        self.created.borrow_mut().push(name.to_string());
        let handle = ChannelHandle(format!("c-{name}"));
        self.channels
            .borrow_mut()
            .insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    async fn send_message(
        &self,
        target: &PostTarget,
        message: &OutgoingMessage,
    ) -> PostResult<MessageHandle> {
        self.send_calls.set(self.send_calls.get() + 1);
        if let Some(failure) = self.send_failures.borrow_mut().pop_front() {
            return Err(failure);
        }
        if let Some(needle) = self.reject_content.borrow().as_deref() {
            if message.content.contains(needle) {
                return Err(PostFailure::Permanent("400 Bad Request".into()));
            }
        }
        let mut sent = self.sent.borrow_mut();
        sent.push((target.clone(), message.clone()));
        Ok(MessageHandle(format!("m{}", sent.len())))
    }

    async fn start_thread(
        &self,
        channel: &ChannelHandle,
        message: &MessageHandle,
        name: &str,
    ) -> PostResult<ThreadHandle> {
        if let Some(failure) = self.thread_failures.borrow_mut().pop_front() {
            return Err(failure);
        }
        self.threads
            .borrow_mut()
            .push((channel.clone(), message.clone(), name.to_string()));
        Ok(ThreadHandle(format!("t-{}", message.0)))
    }
}

/// Records requested delays instead of waiting.
#[derive(Default)]
pub struct RecordingSleeper {
    pub delays: RefCell<Vec<Duration>>,
}

impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.delays.borrow_mut().push(delay);
    }
}

/// Counts warning events on the current thread while installed.
#[derive(Clone, Default)]
pub struct WarningCounter(Arc<AtomicUsize>);

impl WarningCounter {
    /// Installs the counter as this thread's default subscriber.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        use tracing_subscriber::prelude::*;
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for WarningCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

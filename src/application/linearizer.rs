//! Ordering of a channel's messages into thread blocks.

use std::collections::BTreeMap;

use crate::domain::{AuthorRef, Message, SlackTs, ThreadLink};

/// Text of the placeholder root for a thread whose start was not exported.
pub const MISSING_ROOT_TEXT: &str = "_Unable to find start of exported thread_";

/// A top-level message and the replies threaded under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadBlock {
    pub root: Message,
    pub replies: Vec<Message>,
}

/// Order messages for posting.
///
/// Blocks are sorted by root `(ts, seq)`, and replies within a block the
/// same way. Replies to a root that is not in the export get a synthetic
/// root at the parent timestamp.
#[must_use]
pub fn linearize(messages: Vec<Message>) -> Vec<ThreadBlock> {
    let mut roots = Vec::new();
    let mut replies: BTreeMap<SlackTs, Vec<Message>> = BTreeMap::new();

    for message in messages {
        match message.thread {
            ThreadLink::Reply { parent } => replies.entry(parent).or_default().push(message),
            ThreadLink::TopLevel | ThreadLink::Root => roots.push(message),
        }
    }

    roots.sort_by_key(Message::order_key);
    let mut blocks: Vec<ThreadBlock> = roots
        .into_iter()
        .map(|root| ThreadBlock {
            root,
            replies: Vec::new(),
        })
        .collect();

    let mut orphans = Vec::new();
    for (parent, mut thread) in replies {
        thread.sort_by_key(Message::order_key);
        match blocks.iter_mut().find(|b| b.root.ts == parent) {
            Some(block) => block.replies = thread,
            None => {
                tracing::warn!(
                    ts = %parent,
                    replies = thread.len(),
                    "Thread start not found in export, creating placeholder"
                );
                orphans.push(ThreadBlock {
                    root: placeholder_root(parent, thread[0].seq),
                    replies: thread,
                });
            }
        }
    }

    if !orphans.is_empty() {
        blocks.extend(orphans);
        blocks.sort_by_key(|b| b.root.order_key());
    }
    blocks
}

fn placeholder_root(ts: SlackTs, seq: usize) -> Message {
    Message {
        ts,
        seq,
        author: AuthorRef::default(),
        text: MISSING_ROOT_TEXT.to_string(),
        attachments: Vec::new(),
        links: Vec::new(),
        thread: ThreadLink::Root,
    }
}

//! Domain layer - core types, errors, and boundary traits.
//!
//! This layer contains pure domain models and error types
//! without any external dependencies (network, filesystem).

pub mod config;
pub mod error;
pub mod models;
pub mod ports;

pub use config::{AppConfig, ImportConfig, RetryConfig, SourceMode};
pub use error::{AppError, Result};
pub use models::{
    Attachment, AuthorRef, Channel, ChannelHandle, ChannelReport, Embed, EmbedAuthor, EmbedMedia,
    ExportFile, Lifecycle, LinkRef, Message, MessageHandle, OutgoingMessage, PostReceipt,
    PostTarget, PostTask, SlackTs, ThreadHandle, ThreadLink, UploadFile, User,
};
pub use ports::{Destination, Downloader, Fetched, PostFailure, PostResult, Sleeper, TokioSleeper};

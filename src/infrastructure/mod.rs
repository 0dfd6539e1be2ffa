//! Infrastructure layer - external adapters (filesystem, HTTP).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod channel_file;
pub mod config;
pub mod discord_client;
pub mod export_scanner;
pub mod http_downloader;

pub use config::load_config;
pub use discord_client::DiscordClient;
pub use export_scanner::{scan, Scan, ScannedChannel};
pub use http_downloader::{redact, HttpDownloader};

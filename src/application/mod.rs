//! Application layer - use cases and orchestration.
//!
//! This layer contains the import pipeline: parsing, author resolution,
//! conversion, attachments, ordering and posting.

pub mod attachments;
pub mod converter;
pub mod formatter;
pub mod linearizer;
pub mod orchestrator;
pub mod parser;
pub mod poster;
pub mod users;

#[cfg(test)]
pub mod fakes;

pub use formatter::format_summary;
pub use orchestrator::{ImportSummary, Importer};

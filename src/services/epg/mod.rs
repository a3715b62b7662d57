//! XMLTV guide ingestion
//!
//! `parser` turns one guide document into a [`crate::models::GuideIndex`];
//! `merge` fetches every shard behind a region bucket, merges the parsed
//! documents in shard-list order and caches the result.

pub mod merge;
pub mod parser;

// Re-export commonly used items
pub use merge::GuideService;
pub use parser::{parse_bytes, parse_str, GzipHint};

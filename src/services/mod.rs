//! Service layer
//!
//! Upstream fetching, playlist and guide parsing, TTL caching, identity
//! resolution and catalog assembly, plus the background cache pruner.

pub mod cache;
pub mod catalog;
pub mod channels;
pub mod cleanup;
pub mod epg;
pub mod fetch;
pub mod m3u_parser;
pub mod resolver;

// Re-export commonly used items
pub use cache::{Clock, SystemClock, TtlCache};
pub use catalog::{CatalogScope, CatalogService};
pub use channels::{ChannelService, ChannelSettings};
pub use epg::GuideService;
pub use fetch::{HttpFetcher, SourceFetch};

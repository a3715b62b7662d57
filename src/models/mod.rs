//! Data model
//!
//! Core records for the aggregation engine (channels, programmes, guide
//! indexes, region enums) plus the addon boundary serialization shapes.

pub mod addon;
pub mod channel;
pub mod guide;
pub mod region;

// Re-export commonly used items
pub use channel::{Channel, ChannelKind};
pub use guide::{set_if_absent, GuideIndex, Programme};
pub use region::{AuRegion, GuideBucket};

//! Feed search entry points.
//!
//! # Responsibility
//! - Filter and shape the locally cached feed for display.
//! - Keep result shaping inside core.

pub mod filter;

pub use filter::{
    filter_entries, project_feed, relative_day_label, FeedHeading, FeedProjection, FeedQuery,
    DEFAULT_HEAD_SIZE,
};

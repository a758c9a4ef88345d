//! Real-time feed synchronization.
//!
//! # Responsibility
//! - Turn committed row changes into per-table notifications.
//! - Keep each device's feed cache equal to the store's owner-scoped view.

pub mod change_stream;
pub mod feed;

pub use change_stream::{
    latest_change_seq, load_changes_after, prune_change_log, ChangeEvent, ChangeKind,
    ChangeStream, Subscription, WatchedTable,
};
pub use feed::{FeedSource, FeedSynchronizer, LiveFeed, LocalFeedCache};

//! Client-local feed filtering and projection.
//!
//! # Responsibility
//! - Match memories against a free-text query.
//! - Shape the visible slice of the feed (recent head vs. full list).
//!
//! # Invariants
//! - Pure: output depends only on the inputs, input order is preserved.
//! - Matching is a case-insensitive substring test over the original word,
//!   the translated word and the child name.
//! - Whitespace-only query text behaves as an empty query.

use crate::model::memory::MemoryEntry;
use chrono::DateTime;

/// Number of entries shown for an empty query when not expanded.
pub const DEFAULT_HEAD_SIZE: usize = 3;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Feed filter options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    pub text: String,
    /// Show the whole feed for an empty query instead of the recent head.
    pub show_all: bool,
    pub head_size: usize,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            text: String::new(),
            show_all: false,
            head_size: DEFAULT_HEAD_SIZE,
        }
    }
}

impl FeedQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn all() -> Self {
        Self {
            show_all: true,
            ..Self::default()
        }
    }

    pub fn with_head_size(mut self, head_size: usize) -> Self {
        self.head_size = head_size;
        self
    }

    /// Lowercased needle, or `None` when the query is blank.
    fn needle(&self) -> Option<String> {
        let trimmed = self.text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_lowercase())
        }
    }
}

/// Section title the feed view should show above the items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedHeading {
    SearchResults,
    AllMemories,
    RecentMemories,
}

impl FeedHeading {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SearchResults => "search_results",
            Self::AllMemories => "all_memories",
            Self::RecentMemories => "recent_memories",
        }
    }
}

/// Visible slice of the feed plus the counts the view needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedProjection {
    pub items: Vec<MemoryEntry>,
    /// Size of the unfiltered feed.
    pub total: usize,
    /// Entries held back by the head limit; drives "View all (N)".
    pub hidden: usize,
    pub heading: FeedHeading,
}

/// Returns the entries visible for `query`, preserving input order.
pub fn filter_entries(entries: &[MemoryEntry], query: &FeedQuery) -> Vec<MemoryEntry> {
    match query.needle() {
        Some(needle) => entries
            .iter()
            .filter(|entry| entry_matches(entry, &needle))
            .cloned()
            .collect(),
        None if query.show_all => entries.to_vec(),
        None => entries.iter().take(query.head_size).cloned().collect(),
    }
}

pub fn project_feed(entries: &[MemoryEntry], query: &FeedQuery) -> FeedProjection {
    let items = filter_entries(entries, query);
    let total = entries.len();
    let (heading, hidden) = if query.needle().is_some() {
        (FeedHeading::SearchResults, 0)
    } else if query.show_all {
        (FeedHeading::AllMemories, 0)
    } else {
        (FeedHeading::RecentMemories, total - items.len())
    };

    FeedProjection {
        items,
        total,
        hidden,
        heading,
    }
}

fn entry_matches(entry: &MemoryEntry, needle: &str) -> bool {
    entry.original_word.to_lowercase().contains(needle)
        || entry.translated_word.to_lowercase().contains(needle)
        || entry
            .child_name
            .as_deref()
            .is_some_and(|name| name.to_lowercase().contains(needle))
}

/// Human label for a memory's age at `now_ms`.
///
/// Counts whole elapsed 24-hour periods: `Today`, `Yesterday`, `N days ago`
/// under a week, otherwise the UTC date `YYYY-MM-DD`. Future timestamps read
/// as `Today`.
pub fn relative_day_label(created_at_ms: i64, now_ms: i64) -> String {
    let days = now_ms.saturating_sub(created_at_ms).div_euclid(MS_PER_DAY);
    match days {
        i64::MIN..=0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        2..=6 => format!("{days} days ago"),
        _ => match DateTime::from_timestamp_millis(created_at_ms) {
            Some(created) => created.format("%Y-%m-%d").to_string(),
            None => format!("{days} days ago"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{filter_entries, project_feed, relative_day_label, FeedHeading, FeedQuery};
    use crate::model::memory::MemoryEntry;
    use crate::session::UserId;
    use uuid::Uuid;

    const HOUR: i64 = 60 * 60 * 1000;
    const DAY: i64 = 24 * HOUR;
    // 2024-03-10T12:00:00Z
    const NOW: i64 = 1_710_072_000_000;

    fn entry(original: &str, translated: &str, child: &str) -> MemoryEntry {
        MemoryEntry {
            id: Uuid::new_v4(),
            owner_id: UserId::parse("owner").expect("valid user id"),
            child_id: Uuid::new_v4(),
            child_name: Some(child.to_string()),
            original_word: original.to_string(),
            translated_word: translated.to_string(),
            image_ref: None,
            audio_ref: None,
            created_at: NOW,
        }
    }

    #[test]
    fn query_matches_any_field_case_insensitively() {
        let entries = vec![
            entry("Titties", "Sweets", "Phoebe"),
            entry("Isha", "Fish", "Noah"),
            entry("Baba", "Bottle", "ISHAAN"),
        ];

        let hits = filter_entries(&entries, &FeedQuery::new("  isha "));
        let words = hits
            .iter()
            .map(|entry| entry.original_word.as_str())
            .collect::<Vec<_>>();
        assert_eq!(words, vec!["Isha", "Baba"]);

        assert_eq!(filter_entries(&entries, &FeedQuery::new("SWEET")).len(), 1);
        assert!(filter_entries(&entries, &FeedQuery::new("zebra")).is_empty());
    }

    #[test]
    fn empty_query_shows_recent_head_unless_expanded() {
        let entries = (0..5)
            .map(|index| entry(&format!("w{index}"), "t", "Phoebe"))
            .collect::<Vec<_>>();

        let recent = project_feed(&entries, &FeedQuery::new("   "));
        assert_eq!(recent.heading, FeedHeading::RecentMemories);
        assert_eq!(recent.items.len(), 3);
        assert_eq!(recent.items[0].original_word, "w0");
        assert_eq!(recent.hidden, 2);
        assert_eq!(recent.total, 5);

        let all = project_feed(&entries, &FeedQuery::all());
        assert_eq!(all.heading, FeedHeading::AllMemories);
        assert_eq!(all.items.len(), 5);
        assert_eq!(all.hidden, 0);
    }

    #[test]
    fn search_ignores_head_limit() {
        let entries = (0..5)
            .map(|index| entry(&format!("milk{index}"), "t", "Phoebe"))
            .collect::<Vec<_>>();
        let projection = project_feed(&entries, &FeedQuery::new("milk"));
        assert_eq!(projection.heading, FeedHeading::SearchResults);
        assert_eq!(projection.items.len(), 5);
        assert_eq!(projection.hidden, 0);
    }

    #[test]
    fn entry_without_child_name_matches_on_words_only() {
        let mut orphan = entry("Dada", "Daddy", "unused");
        orphan.child_name = None;
        let entries = vec![orphan];
        assert_eq!(filter_entries(&entries, &FeedQuery::new("dad")).len(), 1);
        assert!(filter_entries(&entries, &FeedQuery::new("unused")).is_empty());
    }

    #[test]
    fn relative_day_label_counts_elapsed_days() {
        assert_eq!(relative_day_label(NOW - 60_000, NOW), "Today");
        assert_eq!(relative_day_label(NOW - 23 * HOUR, NOW), "Today");
        assert_eq!(relative_day_label(NOW - 25 * HOUR, NOW), "Yesterday");
        assert_eq!(relative_day_label(NOW - DAY, NOW), "Yesterday");
        assert_eq!(relative_day_label(NOW - 3 * DAY, NOW), "3 days ago");
        assert_eq!(relative_day_label(NOW - 10 * DAY, NOW), "2024-02-29");
        assert_eq!(relative_day_label(NOW + DAY, NOW), "Today");
    }

    #[test]
    fn relative_day_label_survives_extreme_timestamps() {
        assert_eq!(relative_day_label(i64::MAX, NOW), "Today");
        assert_eq!(relative_day_label(0, i64::MAX), "1970-01-01");
        assert!(relative_day_label(i64::MIN, NOW).ends_with("days ago"));
        assert!(relative_day_label(i64::MIN, i64::MAX).ends_with("days ago"));
    }
}

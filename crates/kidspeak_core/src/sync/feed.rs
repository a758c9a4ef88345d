//! Live memory feed kept in sync with the shared store.
//!
//! # Responsibility
//! - Mirror one owner's memories into a local, newest-first cache.
//! - Re-fetch the whole feed on any change to `memory_entries`.
//! - Apply local commits and confirmed deletes immediately.
//!
//! # Invariants
//! - The cache is always ordered by `created_at DESC`, newest insert first
//!   on ties.
//! - Re-fetch replaces the cache wholesale, so duplicate or reordered
//!   notifications converge to the store's state.
//! - A failed re-fetch keeps the previous cache and records the error.
//! - Deletes touch the cache only after the store confirms them.
//! - The live channel is open before the first read.

use crate::error::CoreResult;
use crate::model::memory::{MemoryEntry, MemoryId};
use crate::repo::child_repo::ChildRepository;
use crate::repo::memory_repo::MemoryRepository;
use crate::repo::RepoResult;
use crate::search::filter::{project_feed, FeedProjection, FeedQuery};
use crate::service::memory_service::MemoryService;
use crate::session::{IdentityProvider, UserId};
use crate::sync::change_stream::{ChangeStream, Subscription, WatchedTable};
use log::{info, warn};
use std::cell::RefCell;
use std::rc::Rc;

/// Owner-scoped source of the full memory feed.
pub trait FeedSource {
    fn fetch_feed(&self, owner: &UserId) -> CoreResult<Vec<MemoryEntry>>;
}

impl<C: ChildRepository, M: MemoryRepository> FeedSource for MemoryService<C, M> {
    fn fetch_feed(&self, owner: &UserId) -> CoreResult<Vec<MemoryEntry>> {
        MemoryService::fetch_feed(self, owner)
    }
}

/// Per-device ordered copy of one owner's memories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalFeedCache {
    entries: Vec<MemoryEntry>,
}

impl LocalFeedCache {
    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: MemoryId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    /// Replaces the cache with a freshly fetched feed.
    pub fn replace_all(&mut self, mut entries: Vec<MemoryEntry>) {
        // Stable sort keeps the store's tie order for equal timestamps.
        entries.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        self.entries = entries;
    }

    /// Inserts or replaces one entry at its ordered position.
    pub fn upsert(&mut self, entry: MemoryEntry) {
        self.entries.retain(|existing| existing.id != entry.id);
        let position = self
            .entries
            .iter()
            .position(|existing| existing.created_at <= entry.created_at)
            .unwrap_or(self.entries.len());
        self.entries.insert(position, entry);
    }

    pub fn remove(&mut self, id: MemoryId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }
}

#[derive(Default)]
struct FeedState {
    cache: LocalFeedCache,
    last_sync_error: Option<String>,
    refetches: u64,
}

/// Subscribe/fetch contract over one change stream.
pub struct FeedSynchronizer<'a, 'conn> {
    stream: &'a ChangeStream<'conn>,
    source: Rc<dyn FeedSource + 'conn>,
}

impl<'a, 'conn> FeedSynchronizer<'a, 'conn> {
    pub fn new(stream: &'a ChangeStream<'conn>, source: Rc<dyn FeedSource + 'conn>) -> Self {
        Self { stream, source }
    }

    /// Opens a channel on the memory table; `on_change` runs on any change.
    ///
    /// The channel is not filtered by owner; callers re-fetch through the
    /// owner-scoped `fetch`.
    pub fn subscribe(
        &self,
        owner: &UserId,
        mut on_change: impl FnMut() + 'conn,
    ) -> RepoResult<Subscription<'conn>> {
        let subscription = self
            .stream
            .subscribe(WatchedTable::MemoryEntries, move |_event| on_change())?;
        info!(
            "event=feed_subscribe module=sync status=ok owner_len={}",
            owner.as_str().len()
        );
        Ok(subscription)
    }

    pub fn unsubscribe(&self, subscription: Subscription<'conn>) {
        subscription.unsubscribe();
    }

    /// Full owner-scoped re-fetch, newest first.
    pub fn fetch(&self, owner: &UserId) -> CoreResult<Vec<MemoryEntry>> {
        self.source.fetch_feed(owner)
    }
}

/// One open feed view: local cache plus its live channel.
pub struct LiveFeed<'conn> {
    owner: UserId,
    source: Rc<dyn FeedSource + 'conn>,
    state: Rc<RefCell<FeedState>>,
    subscription: Option<Subscription<'conn>>,
}

impl<'conn> LiveFeed<'conn> {
    /// Subscribes to memory changes, then fetches the owner's feed.
    ///
    /// The channel opens before the initial read, so a change committed
    /// in between is either in the read or delivered by the next poll.
    pub fn open(
        stream: &ChangeStream<'conn>,
        source: Rc<dyn FeedSource + 'conn>,
        owner: UserId,
    ) -> CoreResult<Self> {
        let state = Rc::new(RefCell::new(FeedState::default()));
        let synchronizer = FeedSynchronizer::new(stream, Rc::clone(&source));
        let subscription = {
            let state = Rc::clone(&state);
            let source = Rc::clone(&source);
            let owner_for_refetch = owner.clone();
            synchronizer.subscribe(&owner, move || {
                refetch_into(&state, source.as_ref(), &owner_for_refetch);
            })?
        };
        let initial = source.fetch_feed(&owner)?;
        state.borrow_mut().cache.replace_all(initial);

        info!(
            "event=feed_open module=sync status=ok entries={}",
            state.borrow().cache.len()
        );
        Ok(Self {
            owner,
            source,
            state,
            subscription: Some(subscription),
        })
    }

    pub fn owner(&self) -> &UserId {
        &self.owner
    }

    /// Snapshot of the cached entries, newest first.
    pub fn entries(&self) -> Vec<MemoryEntry> {
        self.state.borrow().cache.entries().to_vec()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().cache.is_empty()
    }

    pub fn contains(&self, id: MemoryId) -> bool {
        self.state.borrow().cache.contains(id)
    }

    /// Number of full re-fetches triggered by change notifications.
    pub fn refetch_count(&self) -> u64 {
        self.state.borrow().refetches
    }

    pub fn last_sync_error(&self) -> Option<String> {
        self.state.borrow().last_sync_error.clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Explicit full re-fetch.
    pub fn refresh(&self) -> CoreResult<()> {
        let entries = self.source.fetch_feed(&self.owner)?;
        let mut state = self.state.borrow_mut();
        state.cache.replace_all(entries);
        state.last_sync_error = None;
        Ok(())
    }

    /// Shows a just-committed memory without waiting for its notification.
    pub fn apply_committed(&self, entry: MemoryEntry) {
        if entry.owner_id != self.owner {
            return;
        }
        self.state.borrow_mut().cache.upsert(entry);
    }

    /// Deletes through the store, then drops the entry from the cache.
    pub fn delete<C: ChildRepository, M: MemoryRepository>(
        &self,
        service: &MemoryService<C, M>,
        session: &dyn IdentityProvider,
        id: MemoryId,
    ) -> CoreResult<()> {
        service.delete_memory(session, id)?;
        self.state.borrow_mut().cache.remove(id);
        Ok(())
    }

    /// Filters the cache for display.
    pub fn project(&self, query: &FeedQuery) -> FeedProjection {
        project_feed(self.state.borrow().cache.entries(), query)
    }

    /// Closes the live channel; the cache stays readable.
    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

fn refetch_into(state: &RefCell<FeedState>, source: &dyn FeedSource, owner: &UserId) {
    match source.fetch_feed(owner) {
        Ok(entries) => {
            let mut state = state.borrow_mut();
            state.cache.replace_all(entries);
            state.last_sync_error = None;
            state.refetches += 1;
        }
        Err(err) => {
            warn!(
                "event=feed_refetch module=sync status=error error_code={} error={}",
                err.code(),
                err
            );
            let mut state = state.borrow_mut();
            state.last_sync_error = Some(err.to_string());
            state.refetches += 1;
        }
    }
}

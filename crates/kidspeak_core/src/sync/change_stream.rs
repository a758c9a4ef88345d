//! Table-level change stream over the shared `change_log`.
//!
//! # Responsibility
//! - Let each device open channels on a watched table.
//! - Deliver insert/update/delete events written by any connection.
//!
//! # Invariants
//! - A new channel only sees changes committed after it was opened.
//! - Each channel receives events in `seq` order, at least once.
//! - Dropping a `Subscription` closes its channel, also mid-dispatch.
//! - Streams are single-threaded (`!Send`); one stream per connection.

use crate::repo::{RepoError, RepoResult};
use log::{debug, info};
use rusqlite::{params, Connection};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

/// Table whose changes can be watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchedTable {
    Children,
    MemoryEntries,
}

impl WatchedTable {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Children => "children",
            Self::MemoryEntries => "memory_entries",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "children" => Some(Self::Children),
            "memory_entries" => Some(Self::MemoryEntries),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One committed row mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub seq: i64,
    pub table: WatchedTable,
    pub kind: ChangeKind,
    pub row_id: String,
}

type ChangeCallback<'conn> = Box<dyn FnMut(&ChangeEvent) + 'conn>;

struct Channel<'conn> {
    table: WatchedTable,
    cursor: i64,
    on_change: ChangeCallback<'conn>,
}

#[derive(Default)]
struct ChannelTable<'conn> {
    next_id: u64,
    channels: BTreeMap<u64, Channel<'conn>>,
    dispatching: bool,
    closed_while_dispatching: BTreeSet<u64>,
}

/// Change stream bound to one connection.
pub struct ChangeStream<'conn> {
    conn: &'conn Connection,
    channels: Rc<RefCell<ChannelTable<'conn>>>,
}

impl<'conn> ChangeStream<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            channels: Rc::new(RefCell::new(ChannelTable::default())),
        }
    }

    /// Opens a channel on `table`; `on_change` runs for every later change.
    pub fn subscribe(
        &self,
        table: WatchedTable,
        on_change: impl FnMut(&ChangeEvent) + 'conn,
    ) -> RepoResult<Subscription<'conn>> {
        let cursor = latest_change_seq(self.conn)?;
        let mut channels = self.channels.borrow_mut();
        let id = channels.next_id;
        channels.next_id += 1;
        channels.channels.insert(
            id,
            Channel {
                table,
                cursor,
                on_change: Box::new(on_change),
            },
        );
        info!(
            "event=channel_open module=sync status=ok table={} channel_id={} cursor={}",
            table.as_str(),
            id,
            cursor
        );

        Ok(Subscription {
            id,
            channels: Rc::downgrade(&self.channels),
        })
    }

    /// Number of open channels.
    pub fn channel_count(&self) -> usize {
        self.channels.borrow().channels.len()
    }

    /// Delivers every change committed since each channel's cursor.
    ///
    /// Returns the number of callback invocations.
    pub fn poll(&self) -> RepoResult<usize> {
        let Some(from_seq) = self
            .channels
            .borrow()
            .channels
            .values()
            .map(|channel| channel.cursor)
            .min()
        else {
            return Ok(0);
        };

        let events = load_changes_after(self.conn, from_seq)?;
        if events.is_empty() {
            return Ok(0);
        }

        let mut dispatching = {
            let mut table = self.channels.borrow_mut();
            table.dispatching = true;
            std::mem::take(&mut table.channels)
        };

        let mut delivered = 0;
        for event in &events {
            for (id, channel) in dispatching.iter_mut() {
                if event.seq <= channel.cursor || self.closed_during_dispatch(*id) {
                    continue;
                }
                channel.cursor = event.seq;
                if channel.table == event.table {
                    (channel.on_change)(event);
                    delivered += 1;
                }
            }
        }

        let mut discarded = Vec::new();
        {
            let mut table = self.channels.borrow_mut();
            table.dispatching = false;
            let closed = std::mem::take(&mut table.closed_while_dispatching);
            for (id, channel) in dispatching {
                if closed.contains(&id) {
                    discarded.push(channel);
                } else {
                    table.channels.insert(id, channel);
                }
            }
        }
        // Callbacks may own subscriptions; drop them with the table released.
        drop(discarded);

        debug!(
            "event=stream_poll module=sync status=ok changes={} delivered={}",
            events.len(),
            delivered
        );
        Ok(delivered)
    }

    fn closed_during_dispatch(&self, id: u64) -> bool {
        self.channels.borrow().closed_while_dispatching.contains(&id)
    }
}

/// Handle for one open channel; closing it is idempotent.
pub struct Subscription<'conn> {
    id: u64,
    channels: Weak<RefCell<ChannelTable<'conn>>>,
}

impl Subscription<'_> {
    /// Closes the channel. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription<'_> {
    fn drop(&mut self) {
        let Some(channels) = self.channels.upgrade() else {
            return;
        };
        let removed = {
            let Ok(mut table) = channels.try_borrow_mut() else {
                return;
            };
            let removed = table.channels.remove(&self.id);
            if removed.is_none() && table.dispatching {
                table.closed_while_dispatching.insert(self.id);
            }
            removed
        };
        // The callback may own other subscriptions; drop it with the table released.
        drop(removed);
        info!(
            "event=channel_close module=sync status=ok channel_id={}",
            self.id
        );
    }
}

/// Highest change sequence committed so far (`0` for an empty log).
pub fn latest_change_seq(conn: &Connection) -> RepoResult<i64> {
    let seq: i64 = conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM change_log;", [], |row| {
        row.get(0)
    })?;
    Ok(seq)
}

/// Loads changes with `seq > after_seq`, oldest first.
pub fn load_changes_after(conn: &Connection, after_seq: i64) -> RepoResult<Vec<ChangeEvent>> {
    let mut stmt = conn.prepare(
        "SELECT seq, table_name, op, row_id
         FROM change_log
         WHERE seq > ?1
         ORDER BY seq ASC;",
    )?;
    let mut rows = stmt.query([after_seq])?;
    let mut events = Vec::new();
    while let Some(row) = rows.next()? {
        let table_text: String = row.get(1)?;
        let op_text: String = row.get(2)?;
        events.push(ChangeEvent {
            seq: row.get(0)?,
            table: WatchedTable::parse(&table_text).ok_or_else(|| {
                RepoError::InvalidData(format!("unknown table `{table_text}` in change_log"))
            })?,
            kind: ChangeKind::parse(&op_text).ok_or_else(|| {
                RepoError::InvalidData(format!("unknown op `{op_text}` in change_log"))
            })?,
            row_id: row.get(3)?,
        });
    }
    Ok(events)
}

/// Deletes change-log rows recorded before `before_epoch_ms`.
///
/// Channels whose cursor is older than the pruned range simply skip the
/// pruned events; feeds re-fetch on the next change anyway.
pub fn prune_change_log(conn: &Connection, before_epoch_ms: i64) -> RepoResult<usize> {
    let removed = conn.execute(
        "DELETE FROM change_log
         WHERE changed_at < ?1
           AND seq < (SELECT COALESCE(MAX(seq), 0) FROM change_log);",
        params![before_epoch_ms],
    )?;
    info!(
        "event=change_log_prune module=sync status=ok removed={}",
        removed
    );
    Ok(removed)
}

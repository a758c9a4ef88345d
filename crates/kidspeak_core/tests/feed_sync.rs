use kidspeak_core::db::open_db;
use kidspeak_core::sync::{latest_change_seq, prune_change_log, ChangeKind, WatchedTable};
use kidspeak_core::{
    ChangeStream, ChildService, CoreResult, FeedQuery, FeedSource, FsObjectStorage, Gender,
    LiveFeed, MediaUploader, MemoryDraft, MemoryEntry, MemoryService, SessionContext,
    SqliteChildRepository, SqliteMemoryRepository, SubmissionForm, UserId,
};
use rusqlite::Connection;
use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

type SqliteMemoryService<'conn> =
    MemoryService<SqliteChildRepository<'conn>, SqliteMemoryRepository<'conn>>;

fn user(id: &str) -> UserId {
    UserId::parse(id).unwrap()
}

fn session(id: &str) -> SessionContext {
    SessionContext::signed_in(user(id))
}

fn memory_service<'conn>(conn: &'conn Connection, storage_root: &Path) -> SqliteMemoryService<'conn> {
    let storage = FsObjectStorage::open(storage_root, "https://cdn.test").unwrap();
    MemoryService::new(
        SqliteChildRepository::try_new(conn).unwrap(),
        SqliteMemoryRepository::try_new(conn).unwrap(),
        MediaUploader::new(Arc::new(storage)),
    )
}

fn add_child(conn: &Connection, owner: &str, name: &str) -> Uuid {
    ChildService::new(SqliteChildRepository::try_new(conn).unwrap())
        .add_child(&session(owner), name, Gender::Girl)
        .unwrap()
        .id
}

#[test]
fn memory_committed_on_one_device_reaches_the_other() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("family.db");
    let storage_root = dir.path().join("storage");

    let phone = open_db(&db_path).unwrap();
    let tablet = open_db(&db_path).unwrap();
    let phoebe = add_child(&phone, "parent-a", "Phoebe");

    let phone_service = memory_service(&phone, &storage_root);
    let tablet_source: Rc<dyn FeedSource + '_> = Rc::new(memory_service(&tablet, &storage_root));
    let tablet_stream = ChangeStream::new(&tablet);
    let tablet_feed = LiveFeed::open(&tablet_stream, tablet_source, user("parent-a")).unwrap();
    assert!(tablet_feed.is_empty());

    let entry = phone_service
        .submit_memory(
            &session("parent-a"),
            &MemoryDraft::text_only(phoebe, "Titties", "Sweets"),
        )
        .unwrap();

    assert!(!tablet_feed.contains(entry.id));
    assert_eq!(tablet_stream.poll().unwrap(), 1);
    assert_eq!(tablet_feed.refetch_count(), 1);
    assert!(tablet_feed.contains(entry.id));
    assert_eq!(tablet_feed.entries()[0].child_name.as_deref(), Some("Phoebe"));

    // Nothing new: polling again is a no-op.
    assert_eq!(tablet_stream.poll().unwrap(), 0);
    assert_eq!(tablet_feed.len(), 1);
}

#[test]
fn other_owners_changes_trigger_refetch_but_stay_invisible() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("shared.db");
    let storage_root = dir.path().join("storage");

    let device_a = open_db(&db_path).unwrap();
    let device_b = open_db(&db_path).unwrap();
    let mia = add_child(&device_b, "parent-b", "Mia");

    let source: Rc<dyn FeedSource + '_> = Rc::new(memory_service(&device_a, &storage_root));
    let stream = ChangeStream::new(&device_a);
    let feed = LiveFeed::open(&stream, source, user("parent-a")).unwrap();

    memory_service(&device_b, &storage_root)
        .submit_memory(
            &session("parent-b"),
            &MemoryDraft::text_only(mia, "Nana", "Banana"),
        )
        .unwrap();

    assert_eq!(stream.poll().unwrap(), 1);
    assert_eq!(feed.refetch_count(), 1);
    assert!(feed.is_empty());
    assert!(feed.last_sync_error().is_none());
}

#[test]
fn delete_on_one_device_converges_everywhere() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("family.db");
    let storage_root = dir.path().join("storage");

    let phone = open_db(&db_path).unwrap();
    let tablet = open_db(&db_path).unwrap();
    let phoebe = add_child(&phone, "parent-a", "Phoebe");

    let phone_service = Rc::new(memory_service(&phone, &storage_root));
    let phone_stream = ChangeStream::new(&phone);
    let phone_feed = LiveFeed::open(
        &phone_stream,
        phone_service.clone() as Rc<dyn FeedSource + '_>,
        user("parent-a"),
    )
    .unwrap();

    let tablet_source: Rc<dyn FeedSource + '_> = Rc::new(memory_service(&tablet, &storage_root));
    let tablet_stream = ChangeStream::new(&tablet);
    let tablet_feed = LiveFeed::open(&tablet_stream, tablet_source, user("parent-a")).unwrap();

    let entry = phone_service
        .submit_memory(
            &session("parent-a"),
            &MemoryDraft::text_only(phoebe, "Isha", "Fish"),
        )
        .unwrap();
    phone_feed.apply_committed(entry.clone());
    assert!(phone_feed.contains(entry.id));

    tablet_stream.poll().unwrap();
    assert!(tablet_feed.contains(entry.id));

    // A stranger cannot delete; the cache is untouched.
    let err = phone_feed
        .delete(&*phone_service, &session("parent-b"), entry.id)
        .unwrap_err();
    assert_eq!(err.code(), "forbidden");
    assert!(phone_feed.contains(entry.id));

    phone_feed
        .delete(&*phone_service, &session("parent-a"), entry.id)
        .unwrap();
    assert!(!phone_feed.contains(entry.id));

    tablet_stream.poll().unwrap();
    assert!(tablet_feed.is_empty());

    // The phone's own notifications (insert + delete) re-fetch to the same state.
    phone_stream.poll().unwrap();
    assert!(phone_feed.is_empty());
    assert_eq!(phone_feed.refetch_count(), 2);
}

#[test]
fn repeated_notifications_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("family.db");
    let storage_root = dir.path().join("storage");

    let writer = open_db(&db_path).unwrap();
    let reader = open_db(&db_path).unwrap();
    let phoebe = add_child(&writer, "parent-a", "Phoebe");
    let writer_service = memory_service(&writer, &storage_root);

    let source: Rc<dyn FeedSource + '_> = Rc::new(memory_service(&reader, &storage_root));
    let stream = ChangeStream::new(&reader);
    let feed = LiveFeed::open(&stream, source, user("parent-a")).unwrap();

    for word in ["one", "two", "three"] {
        writer_service
            .submit_memory(
                &session("parent-a"),
                &MemoryDraft::text_only(phoebe, word, "t"),
            )
            .unwrap();
    }

    assert_eq!(stream.poll().unwrap(), 3);
    assert_eq!(feed.refetch_count(), 3);
    let words = feed
        .entries()
        .into_iter()
        .map(|entry| entry.original_word)
        .collect::<Vec<_>>();
    assert_eq!(words, vec!["three", "two", "one"]);

    let before = feed.entries();
    feed.refresh().unwrap();
    assert_eq!(feed.entries(), before);

    assert_eq!(stream.poll().unwrap(), 0);
    assert_eq!(feed.refetch_count(), 3);
    assert_eq!(feed.entries(), before);

    let recent = feed.project(&FeedQuery::default());
    assert_eq!(recent.items.len(), 3);
    assert_eq!(recent.hidden, 0);
    let hits = feed.project(&FeedQuery::new("TWO"));
    assert_eq!(hits.items.len(), 1);
}

/// Reads the feed, then lets another device commit before returning.
struct CommitAfterFirstRead<'conn> {
    reader: SqliteMemoryService<'conn>,
    other_device: SqliteMemoryService<'conn>,
    child_id: Uuid,
    committed: Cell<bool>,
}

impl FeedSource for CommitAfterFirstRead<'_> {
    fn fetch_feed(&self, owner: &UserId) -> CoreResult<Vec<MemoryEntry>> {
        let entries = self.reader.fetch_feed(owner)?;
        if !self.committed.replace(true) {
            self.other_device.submit_memory(
                &SessionContext::signed_in(owner.clone()),
                &MemoryDraft::text_only(self.child_id, "Isha", "Fish"),
            )?;
        }
        Ok(entries)
    }
}

#[test]
fn change_committed_during_initial_read_is_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("family.db");
    let storage_root = dir.path().join("storage");

    let phone = open_db(&db_path).unwrap();
    let tablet = open_db(&db_path).unwrap();
    let phoebe = add_child(&phone, "parent-a", "Phoebe");

    let source: Rc<dyn FeedSource + '_> = Rc::new(CommitAfterFirstRead {
        reader: memory_service(&tablet, &storage_root),
        other_device: memory_service(&phone, &storage_root),
        child_id: phoebe,
        committed: Cell::new(false),
    });
    let stream = ChangeStream::new(&tablet);
    let feed = LiveFeed::open(&stream, source, user("parent-a")).unwrap();
    assert!(feed.is_empty());

    assert_eq!(stream.poll().unwrap(), 1);
    assert_eq!(feed.len(), 1);
    assert_eq!(feed.entries()[0].original_word, "Isha");
}

#[test]
fn committed_form_shows_up_before_its_notification() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("family.db");
    let storage_root = dir.path().join("storage");
    let phone = open_db(&db_path).unwrap();
    let phoebe = add_child(&phone, "parent-a", "Phoebe");

    let service = Rc::new(memory_service(&phone, &storage_root));
    let stream = ChangeStream::new(&phone);
    let feed = LiveFeed::open(
        &stream,
        service.clone() as Rc<dyn FeedSource + '_>,
        user("parent-a"),
    )
    .unwrap();

    let mut form = SubmissionForm::new();
    form.select_child(phoebe);
    form.set_original_word("Nana");
    form.set_translated_word("Banana");
    let entry = form
        .submit_to_feed(&*service, &session("parent-a"), &feed)
        .unwrap();
    assert!(feed.contains(entry.id));
    assert_eq!(feed.refetch_count(), 0);

    // A failed submit leaves the feed alone.
    form.set_original_word("   ");
    assert!(form
        .submit_to_feed(&*service, &session("parent-a"), &feed)
        .is_err());
    assert_eq!(feed.len(), 1);

    assert_eq!(stream.poll().unwrap(), 1);
    assert_eq!(feed.len(), 1);
    assert!(feed.contains(entry.id));
}

#[test]
fn closing_a_feed_releases_its_channel() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("family.db");
    let storage_root = dir.path().join("storage");
    let conn = open_db(&db_path).unwrap();
    let stream = ChangeStream::new(&conn);

    let source: Rc<dyn FeedSource + '_> = Rc::new(memory_service(&conn, &storage_root));
    let mut feed = LiveFeed::open(&stream, source.clone(), user("parent-a")).unwrap();
    assert_eq!(stream.channel_count(), 1);
    assert!(feed.is_subscribed());

    feed.close();
    assert!(!feed.is_subscribed());
    assert_eq!(stream.channel_count(), 0);

    {
        let _scoped = LiveFeed::open(&stream, source, user("parent-a")).unwrap();
        assert_eq!(stream.channel_count(), 1);
    }
    assert_eq!(stream.channel_count(), 0);
}

#[test]
fn channels_only_see_their_table_and_later_changes() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("family.db");
    let conn = open_db(&db_path).unwrap();
    let other = open_db(&db_path).unwrap();
    add_child(&other, "parent-a", "Early");

    let stream = ChangeStream::new(&conn);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let subscription = stream
        .subscribe(WatchedTable::Children, move |event| {
            sink.borrow_mut().push((event.kind, event.row_id.clone()));
        })
        .unwrap();

    let late = add_child(&other, "parent-a", "Late");
    assert_eq!(stream.poll().unwrap(), 1);
    assert_eq!(
        seen.borrow().as_slice(),
        &[(ChangeKind::Insert, late.to_string())]
    );

    subscription.unsubscribe();
    add_child(&other, "parent-a", "Later");
    assert_eq!(stream.poll().unwrap(), 0);
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn subscription_dropped_inside_its_callback_is_closed() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("family.db");
    let conn = open_db(&db_path).unwrap();
    let stream = ChangeStream::new(&conn);

    let holder = Rc::new(RefCell::new(None));
    let calls = Rc::new(RefCell::new(0));
    let subscription = {
        let holder = Rc::clone(&holder);
        let calls = Rc::clone(&calls);
        stream
            .subscribe(WatchedTable::Children, move |_event| {
                *calls.borrow_mut() += 1;
                holder.borrow_mut().take();
            })
            .unwrap()
    };
    *holder.borrow_mut() = Some(subscription);

    add_child(&conn, "parent-a", "Phoebe");
    add_child(&conn, "parent-a", "Noah");
    assert_eq!(stream.poll().unwrap(), 1);
    assert_eq!(stream.channel_count(), 0);

    add_child(&conn, "parent-a", "Mia");
    assert_eq!(stream.poll().unwrap(), 0);
    assert_eq!(*calls.borrow(), 1);
}

#[test]
fn prune_keeps_the_log_head() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db(dir.path().join("family.db")).unwrap();
    add_child(&conn, "parent-a", "Phoebe");
    add_child(&conn, "parent-a", "Noah");
    let head = latest_change_seq(&conn).unwrap();

    let removed = prune_change_log(&conn, i64::MAX).unwrap();
    assert_eq!(removed, 1);
    assert_eq!(latest_change_seq(&conn).unwrap(), head);
}

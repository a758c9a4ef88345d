//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose child, memory and feed use-cases to Dart via FRB.
//! - Translate core errors into flat envelopes with stable error codes.
//!
//! # Invariants
//! - Exported functions must not panic across the FFI boundary.
//! - Every call carries the signed-in user id explicitly; a blank id is
//!   treated as "no session" and fails with `unauthenticated`.
//! - Each call opens its own connection; nothing is cached between calls
//!   except resolved configuration.

use kidspeak_core::db::{now_epoch_ms, open_db};
use kidspeak_core::sync::{latest_change_seq, load_changes_after, WatchedTable};
use kidspeak_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    project_feed, relative_day_label, AudioBlob, Child, ChildService, CoreConfig, CoreError,
    FeedQuery, FsObjectStorage, Gender, MediaUploader, MemoryDraft, MemoryEntry, MemoryService,
    PhotoInput, SessionContext, SqliteChildRepository, SqliteMemoryRepository, UserId,
    ValidationError,
};
use log::warn;
use rusqlite::Connection;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

static CORE_CONFIG: OnceLock<CoreConfig> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Child row as seen by Dart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildItem {
    pub child_id: String,
    pub name: String,
    /// `girl|boy`.
    pub gender: String,
    /// Display color as `#RRGGBB`.
    pub color_preference: String,
    pub created_at_ms: i64,
}

/// Memory row as seen by Dart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryItem {
    pub memory_id: String,
    pub child_id: String,
    pub child_name: Option<String>,
    pub original_word: String,
    pub translated_word: String,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
    pub created_at_ms: i64,
    /// `Today`, `Yesterday`, `N days ago` or `YYYY-MM-DD`.
    pub day_label: String,
}

/// Result envelope for create/delete style calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub ok: bool,
    /// Created or affected row ID.
    pub id: Option<String>,
    /// Stable machine code on failure (`validation_error`, `forbidden`, ...).
    pub error_code: Option<String>,
    /// Human-readable message for diagnostics/UI.
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>, id: String) -> Self {
        Self {
            ok: true,
            id: Some(id),
            error_code: None,
            message: message.into(),
        }
    }

    fn failure(call: &str, err: &CoreError) -> Self {
        Self {
            ok: false,
            id: None,
            error_code: Some(err.code().to_string()),
            message: format!("{call} failed: {err}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildListResponse {
    pub ok: bool,
    pub items: Vec<ChildItem>,
    pub error_code: Option<String>,
    pub message: String,
}

/// Feed view envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedResponse {
    pub ok: bool,
    pub items: Vec<MemoryItem>,
    pub total: u32,
    /// Entries held back by the recent-head limit.
    pub hidden: u32,
    /// `search_results|all_memories|recent_memories`.
    pub heading: String,
    pub error_code: Option<String>,
    pub message: String,
}

impl FeedResponse {
    fn failure(err: &CoreError) -> Self {
        Self {
            ok: false,
            items: Vec::new(),
            total: 0,
            hidden: 0,
            heading: String::new(),
            error_code: Some(err.code().to_string()),
            message: format!("feed_search failed: {err}"),
        }
    }
}

/// Change-log polling envelope; Dart re-fetches the feed when
/// `memory_changes > 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedChangesResponse {
    pub ok: bool,
    /// Cursor to pass to the next call.
    pub latest_seq: i64,
    pub memory_changes: u32,
    pub child_changes: u32,
    pub message: String,
}

/// Adds a child for `user_id`.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - `gender` is `girl|boy` (case-insensitive).
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn child_add(user_id: String, name: String, gender: String) -> ActionResponse {
    let Some(gender) = Gender::parse(&gender) else {
        let err = CoreError::from(ValidationError::UnknownGender(gender.trim().to_string()));
        return ActionResponse::failure("child_add", &err);
    };
    let session = session_for(&user_id);
    match with_connection(|conn| {
        let service = ChildService::new(SqliteChildRepository::try_new(conn)?);
        service.add_child(&session, &name, gender)
    }) {
        Ok(child) => ActionResponse::success("Child added.", child.id.to_string()),
        Err(err) => ActionResponse::failure("child_add", &err),
    }
}

/// Lists the children of `user_id` ordered by name.
#[flutter_rust_bridge::frb(sync)]
pub fn child_list(user_id: String) -> ChildListResponse {
    let session = session_for(&user_id);
    match with_connection(|conn| {
        let service = ChildService::new(SqliteChildRepository::try_new(conn)?);
        service.list_children(&session)
    }) {
        Ok(children) => ChildListResponse {
            ok: true,
            message: format!("Found {} child(ren).", children.len()),
            items: children.into_iter().map(to_child_item).collect(),
            error_code: None,
        },
        Err(err) => ChildListResponse {
            ok: false,
            items: Vec::new(),
            error_code: Some(err.code().to_string()),
            message: format!("child_list failed: {err}"),
        },
    }
}

/// Submits one memory with optional photo and voice recording.
///
/// # FFI contract
/// - Sync call; uploads media then inserts the row (all-or-nothing).
/// - Empty `Some(vec![])` media is a validation error, not "no media".
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn memory_submit(
    user_id: String,
    child_id: String,
    original_word: String,
    translated_word: String,
    photo_bytes: Option<Vec<u8>>,
    photo_extension: Option<String>,
    audio_bytes: Option<Vec<u8>>,
) -> ActionResponse {
    let session = session_for(&user_id);
    let draft = MemoryDraft {
        // Unparseable IDs cannot belong to anyone; treat them as unselected.
        child_id: Uuid::parse_str(child_id.trim()).ok(),
        original_word,
        translated_word,
        photo: photo_bytes.map(|bytes| PhotoInput {
            bytes,
            extension: photo_extension.unwrap_or_default(),
        }),
        audio: audio_bytes.map(AudioBlob::new),
    };

    match with_memory_service(|service| service.submit_memory(&session, &draft)) {
        Ok(entry) => ActionResponse::success("Memory saved.", entry.id.to_string()),
        Err(err) => ActionResponse::failure("memory_submit", &err),
    }
}

/// Deletes one memory of `user_id` and its media.
#[flutter_rust_bridge::frb(sync)]
pub fn memory_delete(user_id: String, memory_id: String) -> ActionResponse {
    let Ok(id) = Uuid::parse_str(memory_id.trim()) else {
        let err = CoreError::NotFound(Uuid::nil());
        return ActionResponse::failure("memory_delete", &err);
    };
    let session = session_for(&user_id);
    match with_memory_service(|service| service.delete_memory(&session, id)) {
        Ok(()) => ActionResponse::success("Memory deleted.", id.to_string()),
        Err(err) => ActionResponse::failure("memory_delete", &err),
    }
}

/// Fetches the feed of `user_id` and filters it by `query`.
///
/// # FFI contract
/// - Blank `query` shows the recent head unless `show_all` is set.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn feed_search(user_id: String, query: String, show_all: bool) -> FeedResponse {
    let session = session_for(&user_id);
    let entries = match with_memory_service(|service| service.list_memories(&session)) {
        Ok(entries) => entries,
        Err(err) => return FeedResponse::failure(&err),
    };

    let feed_query = FeedQuery {
        text: query,
        show_all,
        head_size: resolve_config().feed_head_size,
    };
    let projection = project_feed(&entries, &feed_query);
    let now_ms = now_epoch_ms();
    let message = if projection.items.is_empty() {
        "No memories.".to_string()
    } else {
        format!("Showing {} of {}.", projection.items.len(), projection.total)
    };

    FeedResponse {
        ok: true,
        total: saturating_u32(projection.total),
        hidden: saturating_u32(projection.hidden),
        heading: projection.heading.as_str().to_string(),
        items: projection
            .items
            .into_iter()
            .map(|entry| to_memory_item(entry, now_ms))
            .collect(),
        error_code: None,
        message,
    }
}

/// Reports change-log activity after `after_seq`.
///
/// Pass `0` on first call; the response carries the cursor for the next one.
#[flutter_rust_bridge::frb(sync)]
pub fn feed_changes_since(after_seq: i64) -> FeedChangesResponse {
    let result = open_db(&resolve_config().db_path)
        .map_err(|err| err.to_string())
        .and_then(|conn| {
            let latest = latest_change_seq(&conn).map_err(|err| err.to_string())?;
            let events = load_changes_after(&conn, after_seq).map_err(|err| err.to_string())?;
            Ok((latest, events))
        });

    match result {
        Ok((latest_seq, events)) => {
            let memory_changes = events
                .iter()
                .filter(|event| event.table == WatchedTable::MemoryEntries)
                .count();
            let child_changes = events.len() - memory_changes;
            FeedChangesResponse {
                ok: true,
                latest_seq,
                memory_changes: saturating_u32(memory_changes),
                child_changes: saturating_u32(child_changes),
                message: format!("{} change(s).", events.len()),
            }
        }
        Err(message) => {
            warn!("event=feed_changes module=ffi status=error");
            FeedChangesResponse {
                ok: false,
                latest_seq: after_seq,
                memory_changes: 0,
                child_changes: 0,
                message: format!("feed_changes_since failed: {message}"),
            }
        }
    }
}

fn resolve_config() -> &'static CoreConfig {
    CORE_CONFIG.get_or_init(CoreConfig::from_env)
}

fn session_for(user_id: &str) -> SessionContext {
    match UserId::parse(user_id) {
        Ok(user) => SessionContext::signed_in(user),
        Err(_) => SessionContext::anonymous(),
    }
}

fn with_connection<T>(
    f: impl FnOnce(&Connection) -> Result<T, CoreError>,
) -> Result<T, CoreError> {
    let conn = open_db(&resolve_config().db_path)
        .map_err(|err| CoreError::TransientNetwork(format!("DB open failed: {err}")))?;
    f(&conn)
}

fn with_memory_service<T>(
    f: impl FnOnce(
        &MemoryService<SqliteChildRepository<'_>, SqliteMemoryRepository<'_>>,
    ) -> Result<T, CoreError>,
) -> Result<T, CoreError> {
    let config = resolve_config();
    let storage = FsObjectStorage::open(&config.storage_root, &config.public_base_url)
        .map_err(|err| CoreError::TransientNetwork(format!("storage open failed: {err}")))?;
    with_connection(|conn| {
        let service = MemoryService::new(
            SqliteChildRepository::try_new(conn)?,
            SqliteMemoryRepository::try_new(conn)?,
            MediaUploader::new(Arc::new(storage)),
        );
        f(&service)
    })
}

fn to_child_item(child: Child) -> ChildItem {
    ChildItem {
        child_id: child.id.to_string(),
        name: child.name,
        gender: child.gender.as_str().to_string(),
        color_preference: child.color_preference,
        created_at_ms: child.created_at,
    }
}

fn to_memory_item(entry: MemoryEntry, now_ms: i64) -> MemoryItem {
    MemoryItem {
        memory_id: entry.id.to_string(),
        child_id: entry.child_id.to_string(),
        child_name: entry.child_name,
        original_word: entry.original_word,
        translated_word: entry.translated_word,
        image_url: entry.image_ref.map(|asset| asset.resolved_url),
        audio_url: entry.audio_ref.map(|asset| asset.resolved_url),
        created_at_ms: entry.created_at,
        day_label: relative_day_label(entry.created_at, now_ms),
    }
}

fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::{
        child_add, child_list, core_version, feed_changes_since, feed_search, init_logging,
        memory_delete, memory_submit, ping, resolve_config, CORE_CONFIG,
    };
    use kidspeak_core::CoreConfig;
    use std::sync::OnceLock;
    use uuid::Uuid;

    static TEST_ROOT: OnceLock<tempfile::TempDir> = OnceLock::new();

    /// Points the cached config at a per-run temp directory.
    fn use_temp_store() {
        let root = TEST_ROOT
            .get_or_init(|| tempfile::tempdir().expect("create ffi test dir"))
            .path();
        CORE_CONFIG.get_or_init(|| CoreConfig {
            db_path: root.join("kidspeak.sqlite3"),
            storage_root: root.join("storage"),
            ..CoreConfig::default()
        });
    }

    fn unique_user(prefix: &str) -> String {
        use_temp_store();
        format!("{prefix}-{}", Uuid::new_v4())
    }

    #[test]
    fn tests_use_a_private_store() {
        use_temp_store();
        let root = TEST_ROOT.get().expect("test root").path();
        assert!(resolve_config().db_path.starts_with(root));
        assert!(resolve_config().storage_root.starts_with(root));
    }

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        let error = init_logging("info".to_string(), String::new());
        assert!(!error.is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn blank_user_is_unauthenticated() {
        use_temp_store();
        let response = child_add("  ".to_string(), "Phoebe".to_string(), "girl".to_string());
        assert!(!response.ok);
        assert_eq!(response.error_code.as_deref(), Some("unauthenticated"));
    }

    #[test]
    fn unknown_gender_is_a_validation_error() {
        let response = child_add(unique_user("ffi"), "Phoebe".to_string(), "cat".to_string());
        assert!(!response.ok);
        assert_eq!(response.error_code.as_deref(), Some("validation_error"));
    }

    #[test]
    fn child_add_then_memory_submit_appears_in_feed() {
        let user = unique_user("ffi-feed");
        let child = child_add(user.clone(), "Phoebe".to_string(), "Girl".to_string());
        assert!(child.ok, "{}", child.message);
        let child_id = child.id.expect("child add should return id");

        let listed = child_list(user.clone());
        assert!(listed.ok, "{}", listed.message);
        assert_eq!(listed.items.len(), 1);
        assert_eq!(listed.items[0].color_preference, "#FFC0CB");

        let saved = memory_submit(
            user.clone(),
            child_id,
            "Titties".to_string(),
            "Sweets".to_string(),
            Some(vec![1, 2, 3]),
            Some("png".to_string()),
            None,
        );
        assert!(saved.ok, "{}", saved.message);

        let feed = feed_search(user.clone(), "sweet".to_string(), false);
        assert!(feed.ok, "{}", feed.message);
        assert_eq!(feed.heading, "search_results");
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].child_name.as_deref(), Some("Phoebe"));
        assert_eq!(feed.items[0].day_label, "Today");
        let image_url = feed.items[0].image_url.clone().expect("photo url");
        assert!(image_url.ends_with(".png"));

        let other = feed_search(unique_user("ffi-other"), String::new(), true);
        assert!(other.ok);
        assert!(other.items.is_empty());
    }

    #[test]
    fn memory_delete_by_other_user_is_forbidden() {
        let owner = unique_user("ffi-owner");
        let child = child_add(owner.clone(), "Noah".to_string(), "boy".to_string());
        let child_id = child.id.expect("child id");
        let saved = memory_submit(
            owner.clone(),
            child_id,
            "Baba".to_string(),
            "Bottle".to_string(),
            None,
            None,
            None,
        );
        let memory_id = saved.id.expect("memory id");

        let denied = memory_delete(unique_user("ffi-intruder"), memory_id.clone());
        assert_eq!(denied.error_code.as_deref(), Some("forbidden"));

        let deleted = memory_delete(owner, memory_id.clone());
        assert!(deleted.ok, "{}", deleted.message);
        let again = memory_delete(unique_user("ffi-any"), memory_id);
        assert_eq!(again.error_code.as_deref(), Some("not_found"));
    }

    #[test]
    fn feed_changes_since_reports_memory_activity() {
        use_temp_store();
        let baseline = feed_changes_since(0);
        assert!(baseline.ok, "{}", baseline.message);

        let user = unique_user("ffi-changes");
        let child = child_add(user.clone(), "Mia".to_string(), "girl".to_string());
        let saved = memory_submit(
            user,
            child.id.expect("child id"),
            "Nana".to_string(),
            "Banana".to_string(),
            None,
            None,
            None,
        );
        assert!(saved.ok, "{}", saved.message);

        let changes = feed_changes_since(baseline.latest_seq);
        assert!(changes.ok, "{}", changes.message);
        assert!(changes.latest_seq > baseline.latest_seq);
        assert!(changes.memory_changes >= 1);
        assert!(changes.child_changes >= 1);
    }
}

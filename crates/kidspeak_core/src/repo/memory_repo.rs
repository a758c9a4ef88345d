//! Memory repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist memory rows with owner-scoped reads and deletes.
//! - Guard the child/owner link atomically at insert time.
//!
//! # Invariants
//! - An insert whose child is not owned by the same owner writes nothing.
//! - Deletes require `id` and `owner_id` to match.
//! - Feed listing is `created_at DESC, rowid DESC` (newest insert first on
//!   equal timestamps).

use crate::model::child::ChildId;
use crate::model::memory::{MemoryId, NewMemory};
use crate::repo::{ensure_tables, parse_uuid, RepoError, RepoResult};
use crate::session::UserId;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const MEMORY_SELECT_SQL: &str = "SELECT
    m.id AS id,
    m.owner_id AS owner_id,
    m.child_id AS child_id,
    c.name AS child_name,
    m.original_word AS original_word,
    m.translated_word AS translated_word,
    m.image_path AS image_path,
    m.audio_path AS audio_path,
    m.created_at AS created_at
FROM memory_entries m
LEFT JOIN children c ON c.id = m.child_id";

/// Stored memory row with asset paths (URLs not yet derived).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub owner_id: UserId,
    pub child_id: ChildId,
    pub child_name: Option<String>,
    pub original_word: String,
    pub translated_word: String,
    pub image_path: Option<String>,
    pub audio_path: Option<String>,
    pub created_at: i64,
}

/// Repository interface for memory entries.
pub trait MemoryRepository {
    /// Inserts one memory; fails with `ChildNotOwned` on a foreign child.
    fn insert_memory(&self, memory: &NewMemory) -> RepoResult<MemoryId>;
    /// Loads one memory visible to `owner_id`.
    fn get_memory(&self, id: MemoryId, owner_id: &UserId) -> RepoResult<Option<MemoryRecord>>;
    /// Lists every memory of `owner_id`, newest first.
    fn list_memories(&self, owner_id: &UserId) -> RepoResult<Vec<MemoryRecord>>;
    /// Deletes one memory and returns the removed row.
    ///
    /// Fails with `NotFound` when no row has `id`, and with `Forbidden` when
    /// the row belongs to another owner.
    fn delete_memory(&self, id: MemoryId, owner_id: &UserId) -> RepoResult<MemoryRecord>;
}

/// SQLite-backed memory repository.
pub struct SqliteMemoryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMemoryRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["children", "memory_entries"])?;
        Ok(Self { conn })
    }
}

impl MemoryRepository for SqliteMemoryRepository<'_> {
    fn insert_memory(&self, memory: &NewMemory) -> RepoResult<MemoryId> {
        memory.validate()?;

        let inserted = self.conn.execute(
            "INSERT INTO memory_entries (
                id,
                owner_id,
                child_id,
                original_word,
                translated_word,
                image_path,
                audio_path,
                created_at
            )
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
            WHERE EXISTS (
                SELECT 1 FROM children WHERE id = ?3 AND owner_id = ?2
            );",
            params![
                memory.id.to_string(),
                memory.owner_id.as_str(),
                memory.child_id.to_string(),
                memory.original_word.as_str(),
                memory.translated_word.as_str(),
                memory.image_path.as_deref(),
                memory.audio_path.as_deref(),
                memory.created_at,
            ],
        )?;

        if inserted == 0 {
            return Err(RepoError::ChildNotOwned(memory.child_id));
        }
        Ok(memory.id)
    }

    fn get_memory(&self, id: MemoryId, owner_id: &UserId) -> RepoResult<Option<MemoryRecord>> {
        load_memory(self.conn, id, owner_id)
    }

    fn list_memories(&self, owner_id: &UserId) -> RepoResult<Vec<MemoryRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{MEMORY_SELECT_SQL}
             WHERE m.owner_id = ?1
             ORDER BY m.created_at DESC, m.rowid DESC;"
        ))?;
        let mut rows = stmt.query([owner_id.as_str()])?;
        let mut memories = Vec::new();
        while let Some(row) = rows.next()? {
            memories.push(parse_memory_row(row)?);
        }
        Ok(memories)
    }

    fn delete_memory(&self, id: MemoryId, owner_id: &UserId) -> RepoResult<MemoryRecord> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let stored_owner: Option<String> = tx
            .query_row(
                "SELECT owner_id FROM memory_entries WHERE id = ?1;",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match stored_owner {
            None => return Err(RepoError::NotFound(id)),
            Some(stored) if stored != owner_id.as_str() => return Err(RepoError::Forbidden(id)),
            Some(_) => {}
        }

        let record = load_memory(&tx, id, owner_id)?.ok_or(RepoError::NotFound(id))?;
        let deleted = tx.execute(
            "DELETE FROM memory_entries WHERE id = ?1 AND owner_id = ?2;",
            params![id.to_string(), owner_id.as_str()],
        )?;
        if deleted == 0 {
            return Err(RepoError::NotFound(id));
        }
        tx.commit()?;

        Ok(record)
    }
}

fn load_memory(
    conn: &Connection,
    id: MemoryId,
    owner_id: &UserId,
) -> RepoResult<Option<MemoryRecord>> {
    let mut stmt = conn.prepare(&format!(
        "{MEMORY_SELECT_SQL}
         WHERE m.id = ?1 AND m.owner_id = ?2;"
    ))?;
    let mut rows = stmt.query(params![id.to_string(), owner_id.as_str()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_memory_row(row)?));
    }
    Ok(None)
}

fn parse_memory_row(row: &Row<'_>) -> RepoResult<MemoryRecord> {
    let id_text: String = row.get("id")?;
    let child_text: String = row.get("child_id")?;
    let owner_text: String = row.get("owner_id")?;
    let owner_id = UserId::parse(owner_text).map_err(|_| {
        RepoError::InvalidData("blank owner_id in memory_entries.owner_id".to_string())
    })?;

    Ok(MemoryRecord {
        id: parse_uuid(&id_text, "memory_entries.id")?,
        owner_id,
        child_id: parse_uuid(&child_text, "memory_entries.child_id")?,
        child_name: row.get("child_name")?,
        original_word: row.get("original_word")?,
        translated_word: row.get("translated_word")?,
        image_path: row.get("image_path")?,
        audio_path: row.get("audio_path")?,
        created_at: row.get("created_at")?,
    })
}

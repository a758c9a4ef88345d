//! Child repository contracts and SQLite implementation.
//!
//! # Invariants
//! - `create_child` validates before SQL mutation.
//! - Child listing is deterministic: `name COLLATE NOCASE ASC, id ASC`.
//! - Rows never cross owners: every lookup that serves a user filters by
//!   `owner_id`.

use crate::model::child::{Child, ChildId, Gender};
use crate::repo::{ensure_tables, parse_uuid, RepoError, RepoResult};
use crate::session::UserId;
use rusqlite::{params, Connection, OptionalExtension, Row};

const CHILD_SELECT_SQL: &str = "SELECT
    id,
    owner_id,
    name,
    gender,
    color_preference,
    created_at
FROM children";

/// Repository interface for child profiles.
pub trait ChildRepository {
    fn create_child(&self, child: &Child) -> RepoResult<ChildId>;
    fn get_child(&self, id: ChildId) -> RepoResult<Option<Child>>;
    /// Lists one owner's children ordered by name.
    fn list_children(&self, owner_id: &UserId) -> RepoResult<Vec<Child>>;
    /// Returns `true` only when `child_id` exists and is owned by `owner_id`.
    fn verify_child_ownership(&self, child_id: ChildId, owner_id: &UserId) -> RepoResult<bool>;
}

/// SQLite-backed child repository.
pub struct SqliteChildRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteChildRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["children"])?;
        Ok(Self { conn })
    }
}

impl ChildRepository for SqliteChildRepository<'_> {
    fn create_child(&self, child: &Child) -> RepoResult<ChildId> {
        child.validate()?;

        self.conn.execute(
            "INSERT INTO children (
                id,
                owner_id,
                name,
                gender,
                color_preference,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                child.id.to_string(),
                child.owner_id.as_str(),
                child.name.as_str(),
                child.gender.as_str(),
                child.color_preference.as_str(),
                child.created_at,
            ],
        )?;

        Ok(child.id)
    }

    fn get_child(&self, id: ChildId) -> RepoResult<Option<Child>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CHILD_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_child_row(row)?));
        }
        Ok(None)
    }

    fn list_children(&self, owner_id: &UserId) -> RepoResult<Vec<Child>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CHILD_SELECT_SQL}
             WHERE owner_id = ?1
             ORDER BY name COLLATE NOCASE ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([owner_id.as_str()])?;
        let mut children = Vec::new();
        while let Some(row) = rows.next()? {
            children.push(parse_child_row(row)?);
        }
        Ok(children)
    }

    fn verify_child_ownership(&self, child_id: ChildId, owner_id: &UserId) -> RepoResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM children WHERE id = ?1 AND owner_id = ?2;",
                params![child_id.to_string(), owner_id.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn parse_child_row(row: &Row<'_>) -> RepoResult<Child> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "children.id")?;

    let owner_text: String = row.get("owner_id")?;
    let owner_id = UserId::parse(owner_text)
        .map_err(|_| RepoError::InvalidData("blank owner_id in children.owner_id".to_string()))?;

    let gender_text: String = row.get("gender")?;
    let gender = Gender::parse(&gender_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid gender `{gender_text}` in children.gender"))
    })?;

    let child = Child {
        id,
        owner_id,
        name: row.get("name")?,
        gender,
        color_preference: row.get("color_preference")?,
        created_at: row.get("created_at")?,
    };
    child.validate()?;
    Ok(child)
}

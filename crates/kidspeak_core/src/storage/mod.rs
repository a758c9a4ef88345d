//! Object storage contract for photo and voice assets.
//!
//! # Responsibility
//! - Store and fetch binary assets by bucket + path.
//! - Derive public URLs from bucket + path (URLs are never persisted).
//!
//! # Invariants
//! - Object paths are relative, `/`-separated, and every segment matches
//!   `[A-Za-z0-9._-]+` without being `.` or `..`.
//! - `resolve_url(public_url(b, p)) == Some((b, p))`.

use crate::model::AssetBucket;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod fs;

pub use fs::FsObjectStorage;

static PATH_SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid path segment regex"));

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug)]
pub enum StorageError {
    InvalidPath(String),
    NotFound { bucket: AssetBucket, path: String },
    /// URL does not point into this storage.
    UnknownUrl(String),
    Io(std::io::Error),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPath(path) => write!(f, "invalid object path `{path}`"),
            Self::NotFound { bucket, path } => {
                write!(f, "object not found: {}/{path}", bucket.as_str())
            }
            Self::UnknownUrl(url) => write!(f, "url is not served by this storage: {url}"),
            Self::Io(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Bucketed binary object store with public URLs.
pub trait ObjectStorage: Send + Sync {
    /// Writes `bytes` at `bucket/path` and returns the stored path.
    fn put(&self, bucket: AssetBucket, path: &str, bytes: &[u8]) -> StorageResult<String>;
    fn get(&self, bucket: AssetBucket, path: &str) -> StorageResult<Vec<u8>>;
    /// Removes an object; removing a missing object is not an error.
    fn remove(&self, bucket: AssetBucket, path: &str) -> StorageResult<()>;
    fn public_url(&self, bucket: AssetBucket, path: &str) -> String;
    /// Maps a public URL back to its bucket and path.
    fn resolve_url(&self, url: &str) -> Option<(AssetBucket, String)>;
}

/// Fetches the bytes behind a public asset URL.
pub fn fetch_url(storage: &dyn ObjectStorage, url: &str) -> StorageResult<Vec<u8>> {
    let (bucket, path) = storage
        .resolve_url(url)
        .ok_or_else(|| StorageError::UnknownUrl(url.to_string()))?;
    storage.get(bucket, &path)
}

/// Validates a relative object path.
pub fn validate_object_path(path: &str) -> StorageResult<()> {
    if path.is_empty() || path.starts_with('/') {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    for segment in path.split('/') {
        if segment == "." || segment == ".." || !PATH_SEGMENT_RE.is_match(segment) {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
    }
    Ok(())
}

/// Maps an arbitrary owner id onto one safe path segment.
///
/// Characters outside `[A-Za-z0-9._-]` become `_`; the result is never `.`
/// or `..`.
pub fn owner_namespace(owner_id: &str) -> String {
    let mapped = owner_id
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>();
    match mapped.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => mapped,
    }
}

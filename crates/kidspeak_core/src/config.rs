//! Runtime configuration resolved from the environment.
//!
//! # Invariants
//! - Blank variables fall back to defaults; resolution never fails.
//! - `public_base_url` never ends with `/`.

use crate::search::filter::DEFAULT_HEAD_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DB_PATH_ENV: &str = "KIDSPEAK_DB_PATH";
pub const STORAGE_DIR_ENV: &str = "KIDSPEAK_STORAGE_DIR";
pub const PUBLIC_BASE_URL_ENV: &str = "KIDSPEAK_PUBLIC_BASE_URL";
pub const FEED_HEAD_ENV: &str = "KIDSPEAK_FEED_HEAD";

const DEFAULT_DB_FILE_NAME: &str = "kidspeak.sqlite3";
const DEFAULT_STORAGE_DIR_NAME: &str = "kidspeak-storage";
const DEFAULT_PUBLIC_BASE_URL: &str = "file:///kidspeak";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    pub db_path: PathBuf,
    pub storage_root: PathBuf,
    pub public_base_url: String,
    pub feed_head_size: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl CoreConfig {
    /// Reads configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let temp_dir = std::env::temp_dir();
        Self {
            db_path: value(DB_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| temp_dir.join(DEFAULT_DB_FILE_NAME)),
            storage_root: value(STORAGE_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| temp_dir.join(DEFAULT_STORAGE_DIR_NAME)),
            public_base_url: value(PUBLIC_BASE_URL_ENV)
                .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            feed_head_size: value(FEED_HEAD_ENV)
                .and_then(|raw| raw.parse::<usize>().ok())
                .unwrap_or(DEFAULT_HEAD_SIZE),
        }
    }
}

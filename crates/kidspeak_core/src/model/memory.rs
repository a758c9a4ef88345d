//! Memory entry model.
//!
//! # Responsibility
//! - Define the write model (`NewMemory`) persisted by the store.
//! - Define the read model (`MemoryEntry`) mirrored into feed caches.
//!
//! # Invariants
//! - Asset references keep bucket + path only in storage; `resolved_url` is
//!   derived when an entry is read.
//! - A memory never outlives the child it references.

use crate::model::child::ChildId;
use crate::model::ValidationError;
use crate::session::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a memory entry.
pub type MemoryId = Uuid;

/// Object storage bucket an asset lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetBucket {
    /// Photo assets.
    Photos,
    /// Voice recordings.
    Voices,
}

impl AssetBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Photos => "photos",
            Self::Voices => "voices",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "photos" => Some(Self::Photos),
            "voices" => Some(Self::Voices),
            _ => None,
        }
    }
}

/// Reference to an uploaded photo or voice recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub bucket: AssetBucket,
    /// Owner-namespaced object path, e.g. `{owner_id}/{epoch_ms}-{uuid}.webm`.
    pub path: String,
    /// Public URL derived from `bucket` + `path`.
    pub resolved_url: String,
}

/// Memory as shown in a family feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: MemoryId,
    pub owner_id: UserId,
    pub child_id: ChildId,
    /// Joined from `children.name` at read time.
    pub child_name: Option<String>,
    pub original_word: String,
    pub translated_word: String,
    pub image_ref: Option<AssetRef>,
    pub audio_ref: Option<AssetRef>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

/// Row about to be inserted by the memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMemory {
    pub id: MemoryId,
    pub owner_id: UserId,
    pub child_id: ChildId,
    pub original_word: String,
    pub translated_word: String,
    pub image_path: Option<String>,
    pub audio_path: Option<String>,
    pub created_at: i64,
}

impl NewMemory {
    /// Builds a text-only memory with a fresh id; words are trimmed.
    pub fn new(
        owner_id: UserId,
        child_id: ChildId,
        original_word: &str,
        translated_word: &str,
        created_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            child_id,
            original_word: original_word.trim().to_string(),
            translated_word: translated_word.trim().to_string(),
            image_path: None,
            audio_path: None,
            created_at,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.original_word.trim().is_empty() {
            return Err(ValidationError::BlankOriginalWord);
        }
        if self.translated_word.trim().is_empty() {
            return Err(ValidationError::BlankTranslatedWord);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{AssetBucket, NewMemory};
    use crate::model::ValidationError;
    use crate::session::UserId;
    use uuid::Uuid;

    #[test]
    fn bucket_names_are_stable() {
        assert_eq!(AssetBucket::Photos.as_str(), "photos");
        assert_eq!(AssetBucket::parse("voices"), Some(AssetBucket::Voices));
        assert_eq!(AssetBucket::parse("memories"), None);
    }

    #[test]
    fn new_memory_trims_words_and_rejects_blank_ones() {
        let owner = UserId::parse("user-a").expect("valid user id");
        let memory = NewMemory::new(owner.clone(), Uuid::new_v4(), " Titties ", "Sweets", 1);
        assert_eq!(memory.original_word, "Titties");
        assert!(memory.validate().is_ok());

        let blank = NewMemory::new(owner, Uuid::new_v4(), "Titties", "  ", 1);
        assert_eq!(
            blank.validate().expect_err("blank translation"),
            ValidationError::BlankTranslatedWord
        );
    }
}

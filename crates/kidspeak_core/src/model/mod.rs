//! Domain model for children and their word memories.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Own field-level validation shared by repositories and services.
//!
//! # Invariants
//! - Every child and memory is identified by a stable UUID.
//! - `owner_id` is set once at creation and never rewritten.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod child;
pub mod memory;

pub use child::{Child, ChildId, Gender};
pub use memory::{AssetBucket, AssetRef, MemoryEntry, MemoryId, NewMemory};

/// Field-level validation failures raised before any store or network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Child name is empty after trimming.
    BlankChildName,
    /// No child was selected for a memory.
    ChildNotSelected,
    /// The word as the child said it is empty.
    BlankOriginalWord,
    /// The meaning of the word is empty.
    BlankTranslatedWord,
    /// Attached photo/audio has zero bytes.
    EmptyMedia(AssetBucket),
    /// User identifier from the identity provider is empty.
    BlankUserId,
    /// Gender text is neither `girl` nor `boy`.
    UnknownGender(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankChildName => write!(f, "child name must not be empty"),
            Self::ChildNotSelected => write!(f, "a child must be selected"),
            Self::BlankOriginalWord => write!(f, "original word must not be empty"),
            Self::BlankTranslatedWord => write!(f, "translated word must not be empty"),
            Self::EmptyMedia(bucket) => {
                write!(f, "attached {} media is empty", bucket.as_str())
            }
            Self::BlankUserId => write!(f, "user id must not be empty"),
            Self::UnknownGender(value) => write!(f, "unsupported gender `{value}`"),
        }
    }
}

impl Error for ValidationError {}

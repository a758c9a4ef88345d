//! Child profile model.
//!
//! # Invariants
//! - `name` is stored trimmed and is never empty.
//! - `color_preference` is derived from `gender` once, at creation time.
//! - `color_preference` is display-only; it carries no authorization meaning.

use crate::db::now_epoch_ms;
use crate::model::ValidationError;
use crate::session::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a child profile.
pub type ChildId = Uuid;

/// Light pink, the default color for girls.
pub const GIRL_COLOR: &str = "#FFC0CB";
/// Light blue, the default color for boys.
pub const BOY_COLOR: &str = "#ADD8E6";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Girl,
    Boy,
}

impl Gender {
    /// Fixed two-color policy used when a child is created.
    pub fn default_color(self) -> &'static str {
        match self {
            Self::Girl => GIRL_COLOR,
            Self::Boy => BOY_COLOR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Girl => "girl",
            Self::Boy => "boy",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "girl" => Some(Self::Girl),
            "boy" => Some(Self::Boy),
            _ => None,
        }
    }
}

/// Child profile owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Child {
    pub id: ChildId,
    pub owner_id: UserId,
    pub name: String,
    pub gender: Gender,
    pub color_preference: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

impl Child {
    /// Creates a child profile for `owner_id` with the default color.
    ///
    /// # Errors
    /// - `BlankChildName` when `name` is empty after trimming.
    pub fn new(
        owner_id: UserId,
        name: impl Into<String>,
        gender: Gender,
    ) -> Result<Self, ValidationError> {
        let child = Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into().trim().to_string(),
            gender,
            color_preference: gender.default_color().to_string(),
            created_at: now_epoch_ms(),
        };
        child.validate()?;
        Ok(child)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::BlankChildName);
        }
        Ok(())
    }

    pub fn is_owned_by(&self, owner_id: &UserId) -> bool {
        &self.owner_id == owner_id
    }
}

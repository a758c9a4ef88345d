//! Use-case level error taxonomy.
//!
//! # Invariants
//! - `Unauthenticated` and `Validation` are raised before any store,
//!   storage or microphone access.
//! - Store transport failures surface as `TransientNetwork`; nothing is
//!   retried automatically.

use crate::model::{AssetBucket, ValidationError};
use crate::repo::RepoError;
use crate::storage::StorageError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug)]
pub enum CoreError {
    /// No signed-in user.
    Unauthenticated,
    /// Missing or malformed required input.
    Validation(ValidationError),
    /// Microphone refused or unavailable.
    CapabilityDenied(String),
    /// Asset upload to object storage failed.
    MediaUploadFailed {
        bucket: AssetBucket,
        message: String,
    },
    /// Row exists but belongs to another owner.
    Forbidden(Uuid),
    /// Row does not exist.
    NotFound(Uuid),
    /// Store read/write failure.
    TransientNetwork(String),
}

impl CoreError {
    /// Stable machine-readable code used in log lines and FFI envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Validation(_) => "validation_error",
            Self::CapabilityDenied(_) => "capability_denied",
            Self::MediaUploadFailed { .. } => "media_upload_failed",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::TransientNetwork(_) => "transient_network_error",
        }
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "you must be signed in"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::CapabilityDenied(message) => write!(f, "microphone unavailable: {message}"),
            Self::MediaUploadFailed { bucket, message } => {
                write!(f, "{} upload failed: {message}", bucket.as_str())
            }
            Self::Forbidden(id) => write!(f, "not allowed to access {id}"),
            Self::NotFound(id) => write!(f, "not found: {id}"),
            Self::TransientNetwork(message) => write!(f, "store unavailable: {message}"),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for CoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for CoreError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::Forbidden(id) | RepoError::ChildNotOwned(id) => Self::Forbidden(id),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::TransientNetwork(other.to_string()),
        }
    }
}

impl CoreError {
    pub(crate) fn upload_failed(bucket: AssetBucket, err: &StorageError) -> Self {
        Self::MediaUploadFailed {
            bucket,
            message: err.to_string(),
        }
    }
}

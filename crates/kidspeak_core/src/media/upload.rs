//! Photo/voice upload orchestration.
//!
//! # Responsibility
//! - Turn captured bytes into owner-namespaced, publicly resolvable assets.
//! - Map storage failures to `MediaUploadFailed` without touching caller
//!   input.
//!
//! # Invariants
//! - Object paths are `{owner}/{epoch_ms}-{uuid}.{ext}`.
//! - Zero-length media is rejected before any storage call.
//! - Returned URLs are derived from bucket + path by the storage.

use crate::db::now_epoch_ms;
use crate::error::{CoreError, CoreResult};
use crate::media::recorder::AUDIO_EXTENSION;
use crate::model::{AssetBucket, AssetRef, ValidationError};
use crate::service::require_user;
use crate::session::{IdentityProvider, UserId};
use crate::storage::{owner_namespace, ObjectStorage};
use log::{error, info, warn};
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_PHOTO_EXTENSION: &str = "jpg";
const MAX_EXTENSION_CHARS: usize = 8;

/// Uploads photo and voice assets to object storage.
#[derive(Clone)]
pub struct MediaUploader {
    storage: Arc<dyn ObjectStorage>,
}

impl MediaUploader {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.storage
    }

    /// Uploads a photo for the signed-in user.
    ///
    /// `suggested_ext` is sanitized; unusable values fall back to `jpg`.
    pub fn upload_photo(
        &self,
        session: &dyn IdentityProvider,
        bytes: &[u8],
        suggested_ext: &str,
    ) -> CoreResult<AssetRef> {
        let owner = require_user(session)?;
        self.upload_for(&owner, AssetBucket::Photos, bytes, &sanitize_extension(suggested_ext))
    }

    /// Uploads a finished voice recording for the signed-in user.
    pub fn upload_audio(&self, session: &dyn IdentityProvider, bytes: &[u8]) -> CoreResult<AssetRef> {
        let owner = require_user(session)?;
        self.upload_for(&owner, AssetBucket::Voices, bytes, AUDIO_EXTENSION)
    }

    pub(crate) fn upload_for(
        &self,
        owner: &UserId,
        bucket: AssetBucket,
        bytes: &[u8],
        extension: &str,
    ) -> CoreResult<AssetRef> {
        if bytes.is_empty() {
            return Err(ValidationError::EmptyMedia(bucket).into());
        }

        let path = object_path(owner, now_epoch_ms(), extension);
        match self.storage.put(bucket, &path, bytes) {
            Ok(stored_path) => {
                info!(
                    "event=media_upload module=media status=ok bucket={} bytes={}",
                    bucket.as_str(),
                    bytes.len()
                );
                Ok(self.resolve(bucket, stored_path))
            }
            Err(err) => {
                error!(
                    "event=media_upload module=media status=error bucket={} error_code=media_upload_failed error={}",
                    bucket.as_str(),
                    err
                );
                Err(CoreError::upload_failed(bucket, &err))
            }
        }
    }

    /// Builds an asset reference with a freshly derived public URL.
    pub fn resolve(&self, bucket: AssetBucket, path: impl Into<String>) -> AssetRef {
        let path = path.into();
        AssetRef {
            resolved_url: self.storage.public_url(bucket, &path),
            bucket,
            path,
        }
    }

    /// Best-effort removal of an asset that will not be referenced.
    pub fn discard(&self, asset: &AssetRef) {
        if let Err(err) = self.storage.remove(asset.bucket, &asset.path) {
            warn!(
                "event=media_discard module=media status=error bucket={} error={}",
                asset.bucket.as_str(),
                err
            );
        }
    }
}

/// Collision-resistant object path namespaced by owner.
pub fn object_path(owner: &UserId, epoch_ms: i64, extension: &str) -> String {
    format!(
        "{}/{}-{}.{}",
        owner_namespace(owner.as_str()),
        epoch_ms,
        Uuid::new_v4().simple(),
        extension
    )
}

/// Normalizes a caller-suggested file extension.
///
/// Keeps lowercase ASCII alphanumerics, strips a leading dot, and falls back
/// to `jpg` when nothing usable (or something too long) remains.
pub fn sanitize_extension(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('.').to_ascii_lowercase();
    let valid = !trimmed.is_empty()
        && trimmed.len() <= MAX_EXTENSION_CHARS
        && trimmed.chars().all(|ch| ch.is_ascii_alphanumeric());
    if valid {
        trimmed
    } else {
        DEFAULT_PHOTO_EXTENSION.to_string()
    }
}

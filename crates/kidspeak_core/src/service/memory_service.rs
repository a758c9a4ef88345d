//! Memory store use-cases: submission pipeline, feed reads and deletes.
//!
//! # Responsibility
//! - Validate, upload media, and insert a memory as one all-or-nothing
//!   submission.
//! - Enforce that memories only link to children of the same owner.
//! - Delete memories owned by the caller and drop their assets.
//!
//! # Invariants
//! - `owner_id` on every inserted row is the session's user.
//! - Child ownership is checked before any upload and again atomically by
//!   the insert statement.
//! - A failed submission leaves no row and no uploaded asset behind.

use crate::db::now_epoch_ms;
use crate::error::{CoreError, CoreResult};
use crate::media::recorder::{AudioBlob, AUDIO_EXTENSION};
use crate::media::upload::{sanitize_extension, MediaUploader};
use crate::model::child::ChildId;
use crate::model::memory::{AssetBucket, AssetRef, MemoryEntry, MemoryId, NewMemory};
use crate::model::ValidationError;
use crate::repo::child_repo::ChildRepository;
use crate::repo::memory_repo::{MemoryRecord, MemoryRepository};
use crate::service::require_user;
use crate::service::submission::SubmissionState;
use crate::session::{IdentityProvider, UserId};
use log::{error, info, warn};

/// Photo attached to a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoInput {
    pub bytes: Vec<u8>,
    /// Caller-suggested extension such as `png`; sanitized on upload.
    pub extension: String,
}

/// User input for one memory submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryDraft {
    pub child_id: Option<ChildId>,
    pub original_word: String,
    pub translated_word: String,
    pub photo: Option<PhotoInput>,
    pub audio: Option<AudioBlob>,
}

impl MemoryDraft {
    pub fn text_only(child_id: ChildId, original_word: &str, translated_word: &str) -> Self {
        Self {
            child_id: Some(child_id),
            original_word: original_word.to_string(),
            translated_word: translated_word.to_string(),
            photo: None,
            audio: None,
        }
    }

    fn media_count(&self) -> u8 {
        u8::from(self.photo.is_some()) + u8::from(self.audio.is_some())
    }
}

/// Memory store facade over repositories and the media uploader.
pub struct MemoryService<C: ChildRepository, M: MemoryRepository> {
    children: C,
    memories: M,
    uploader: MediaUploader,
}

impl<C: ChildRepository, M: MemoryRepository> MemoryService<C, M> {
    pub fn new(children: C, memories: M, uploader: MediaUploader) -> Self {
        Self {
            children,
            memories,
            uploader,
        }
    }

    pub fn uploader(&self) -> &MediaUploader {
        &self.uploader
    }

    /// Submits one memory for the signed-in user.
    pub fn submit_memory(
        &self,
        session: &dyn IdentityProvider,
        draft: &MemoryDraft,
    ) -> CoreResult<MemoryEntry> {
        self.submit_memory_observed(session, draft, &mut |_| {})
    }

    /// Submits one memory, reporting every pipeline state to `observe`.
    ///
    /// States: `Validating → UploadingMedia → Inserting → Committed`, or
    /// `Failed` from any step.
    pub fn submit_memory_observed(
        &self,
        session: &dyn IdentityProvider,
        draft: &MemoryDraft,
        observe: &mut dyn FnMut(SubmissionState),
    ) -> CoreResult<MemoryEntry> {
        match self.run_submission(session, draft, observe) {
            Ok(entry) => {
                observe(SubmissionState::Committed(entry.id));
                info!(
                    "event=memory_submit module=service status=ok has_photo={} has_audio={}",
                    entry.image_ref.is_some(),
                    entry.audio_ref.is_some()
                );
                Ok(entry)
            }
            Err(err) => {
                observe(SubmissionState::Failed { code: err.code() });
                warn!(
                    "event=memory_submit module=service status=error error_code={}",
                    err.code()
                );
                Err(err)
            }
        }
    }

    fn run_submission(
        &self,
        session: &dyn IdentityProvider,
        draft: &MemoryDraft,
        observe: &mut dyn FnMut(SubmissionState),
    ) -> CoreResult<MemoryEntry> {
        observe(SubmissionState::Validating);
        let owner = require_user(session)?;
        let child_id = validate_draft(draft)?;
        if !self.children.verify_child_ownership(child_id, &owner)? {
            warn!("event=memory_submit module=service status=rejected error_code=child_not_owned");
            return Err(CoreError::Forbidden(child_id));
        }

        let uploads = draft.media_count();
        let mut uploaded: Vec<AssetRef> = Vec::new();
        if uploads > 0 {
            observe(SubmissionState::UploadingMedia { uploads });
        }
        if let Some(photo) = draft.photo.as_ref() {
            let asset = self.uploader.upload_for(
                &owner,
                AssetBucket::Photos,
                &photo.bytes,
                &sanitize_extension(&photo.extension),
            )?;
            uploaded.push(asset);
        }
        if let Some(audio) = draft.audio.as_ref() {
            match self
                .uploader
                .upload_for(&owner, AssetBucket::Voices, &audio.bytes, AUDIO_EXTENSION)
            {
                Ok(asset) => uploaded.push(asset),
                Err(err) => {
                    self.discard_all(&uploaded);
                    return Err(err);
                }
            }
        }

        observe(SubmissionState::Inserting);
        let mut memory = NewMemory::new(
            owner.clone(),
            child_id,
            &draft.original_word,
            &draft.translated_word,
            now_epoch_ms(),
        );
        for asset in &uploaded {
            match asset.bucket {
                AssetBucket::Photos => memory.image_path = Some(asset.path.clone()),
                AssetBucket::Voices => memory.audio_path = Some(asset.path.clone()),
            }
        }

        if let Err(err) = self.memories.insert_memory(&memory) {
            error!(
                "event=memory_insert module=service status=error discarded_assets={} error={}",
                uploaded.len(),
                err
            );
            self.discard_all(&uploaded);
            return Err(err.into());
        }

        // The row is committed from here on; a failed read-back must not
        // report the submission as failed.
        match self.memories.get_memory(memory.id, &owner) {
            Ok(Some(record)) => Ok(self.resolve_record(record)),
            Ok(None) => {
                warn!("event=memory_read_back module=service status=missing");
                Ok(committed_entry(memory, uploaded))
            }
            Err(err) => {
                warn!(
                    "event=memory_read_back module=service status=error error={}",
                    err
                );
                Ok(committed_entry(memory, uploaded))
            }
        }
    }

    /// Deletes one memory of the signed-in user and removes its assets.
    ///
    /// # Errors
    /// - `Forbidden` when the memory belongs to another user.
    /// - `NotFound` when no memory has `id`.
    pub fn delete_memory(&self, session: &dyn IdentityProvider, id: MemoryId) -> CoreResult<()> {
        let owner = require_user(session)?;
        let record = match self.memories.delete_memory(id, &owner) {
            Ok(record) => record,
            Err(err) => {
                let err = CoreError::from(err);
                warn!(
                    "event=memory_delete module=service status=error error_code={}",
                    err.code()
                );
                return Err(err);
            }
        };

        let entry = self.resolve_record(record);
        for asset in entry.image_ref.iter().chain(entry.audio_ref.iter()) {
            self.uploader.discard(asset);
        }
        info!("event=memory_delete module=service status=ok");
        Ok(())
    }

    /// Lists the signed-in user's memories, newest first.
    pub fn list_memories(&self, session: &dyn IdentityProvider) -> CoreResult<Vec<MemoryEntry>> {
        let owner = require_user(session)?;
        self.fetch_feed(&owner)
    }

    /// Full owner-scoped feed read used by the synchronizer.
    pub fn fetch_feed(&self, owner: &UserId) -> CoreResult<Vec<MemoryEntry>> {
        let records = self.memories.list_memories(owner)?;
        Ok(records
            .into_iter()
            .map(|record| self.resolve_record(record))
            .collect())
    }

    fn resolve_record(&self, record: MemoryRecord) -> MemoryEntry {
        MemoryEntry {
            id: record.id,
            owner_id: record.owner_id,
            child_id: record.child_id,
            child_name: record.child_name,
            original_word: record.original_word,
            translated_word: record.translated_word,
            image_ref: record
                .image_path
                .map(|path| self.uploader.resolve(AssetBucket::Photos, path)),
            audio_ref: record
                .audio_path
                .map(|path| self.uploader.resolve(AssetBucket::Voices, path)),
            created_at: record.created_at,
        }
    }

    fn discard_all(&self, assets: &[AssetRef]) {
        for asset in assets {
            self.uploader.discard(asset);
        }
    }
}

/// Entry for a committed row, built without reading it back.
fn committed_entry(memory: NewMemory, uploaded: Vec<AssetRef>) -> MemoryEntry {
    let mut entry = MemoryEntry {
        id: memory.id,
        owner_id: memory.owner_id,
        child_id: memory.child_id,
        child_name: None,
        original_word: memory.original_word,
        translated_word: memory.translated_word,
        image_ref: None,
        audio_ref: None,
        created_at: memory.created_at,
    };
    for asset in uploaded {
        match asset.bucket {
            AssetBucket::Photos => entry.image_ref = Some(asset),
            AssetBucket::Voices => entry.audio_ref = Some(asset),
        }
    }
    entry
}

fn validate_draft(draft: &MemoryDraft) -> Result<ChildId, ValidationError> {
    let child_id = draft.child_id.ok_or(ValidationError::ChildNotSelected)?;
    if draft.original_word.trim().is_empty() {
        return Err(ValidationError::BlankOriginalWord);
    }
    if draft.translated_word.trim().is_empty() {
        return Err(ValidationError::BlankTranslatedWord);
    }
    if draft.photo.as_ref().is_some_and(|photo| photo.bytes.is_empty()) {
        return Err(ValidationError::EmptyMedia(AssetBucket::Photos));
    }
    if draft.audio.as_ref().is_some_and(AudioBlob::is_empty) {
        return Err(ValidationError::EmptyMedia(AssetBucket::Voices));
    }
    Ok(child_id)
}

//! Memory form state machine.
//!
//! # Responsibility
//! - Hold the user's draft across attempts.
//! - Track `Idle → Validating → UploadingMedia → Inserting → Committed|Failed`.
//!
//! # Invariants
//! - A failed submission never clears or alters the draft.
//! - A committed submission clears words and media but keeps the selected
//!   child, so the next memory for the same child needs one tap less.
//! - `submit_to_feed` shows a committed memory in the feed before its change
//!   notification arrives.

use crate::error::CoreResult;
use crate::media::recorder::AudioBlob;
use crate::model::child::ChildId;
use crate::model::memory::{MemoryEntry, MemoryId};
use crate::repo::child_repo::ChildRepository;
use crate::repo::memory_repo::MemoryRepository;
use crate::service::memory_service::{MemoryDraft, MemoryService, PhotoInput};
use crate::session::IdentityProvider;
use crate::sync::feed::LiveFeed;
use log::debug;

/// Submission pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Validating,
    /// Uploading `uploads` media items (1 or 2).
    UploadingMedia { uploads: u8 },
    Inserting,
    Committed(MemoryId),
    /// Failed with the stable error code of the reported error.
    Failed { code: &'static str },
}

impl SubmissionState {
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            Self::Validating | Self::UploadingMedia { .. } | Self::Inserting
        )
    }
}

/// Draft plus pipeline state for one "add memory" form.
#[derive(Debug)]
pub struct SubmissionForm {
    draft: MemoryDraft,
    state: SubmissionState,
    transitions: Vec<SubmissionState>,
}

impl Default for SubmissionForm {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionForm {
    pub fn new() -> Self {
        Self {
            draft: MemoryDraft::default(),
            state: SubmissionState::Idle,
            transitions: Vec::new(),
        }
    }

    pub fn draft(&self) -> &MemoryDraft {
        &self.draft
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    /// States visited by the most recent `submit` call, in order.
    pub fn transitions(&self) -> &[SubmissionState] {
        &self.transitions
    }

    pub fn select_child(&mut self, child_id: ChildId) {
        self.draft.child_id = Some(child_id);
    }

    pub fn set_original_word(&mut self, value: impl Into<String>) {
        self.draft.original_word = value.into();
    }

    pub fn set_translated_word(&mut self, value: impl Into<String>) {
        self.draft.translated_word = value.into();
    }

    pub fn attach_photo(&mut self, bytes: Vec<u8>, extension: impl Into<String>) {
        self.draft.photo = Some(PhotoInput {
            bytes,
            extension: extension.into(),
        });
    }

    pub fn attach_audio(&mut self, blob: AudioBlob) {
        self.draft.audio = Some(blob);
    }

    pub fn clear_photo(&mut self) {
        self.draft.photo = None;
    }

    pub fn clear_audio(&mut self) {
        self.draft.audio = None;
    }

    /// Runs the submission pipeline for the current draft.
    pub fn submit<C: ChildRepository, M: MemoryRepository>(
        &mut self,
        service: &MemoryService<C, M>,
        session: &dyn IdentityProvider,
    ) -> CoreResult<MemoryEntry> {
        self.transitions.clear();
        let draft = &self.draft;
        let state = &mut self.state;
        let transitions = &mut self.transitions;
        let result = service.submit_memory_observed(session, draft, &mut |next| {
            debug!("event=submission_state module=service state={next:?}");
            *state = next;
            transitions.push(next);
        });

        if result.is_ok() {
            let child_id = self.draft.child_id;
            self.draft = MemoryDraft {
                child_id,
                ..MemoryDraft::default()
            };
        }
        result
    }

    /// Runs `submit` and pushes the committed memory into `feed`.
    pub fn submit_to_feed<C: ChildRepository, M: MemoryRepository>(
        &mut self,
        service: &MemoryService<C, M>,
        session: &dyn IdentityProvider,
        feed: &LiveFeed<'_>,
    ) -> CoreResult<MemoryEntry> {
        let entry = self.submit(service, session)?;
        feed.apply_committed(entry.clone());
        Ok(entry)
    }
}

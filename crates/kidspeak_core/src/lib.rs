//! Core domain logic for KidSpeak.
//! This crate is the single source of truth for business invariants.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod media;
pub mod model;
pub mod repo;
pub mod search;
pub mod service;
pub mod session;
pub mod storage;
pub mod sync;

pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use media::{AudioBlob, AudioRecorder, MediaUploader, Microphone, Recording};
pub use model::{
    AssetBucket, AssetRef, Child, ChildId, Gender, MemoryEntry, MemoryId, ValidationError,
};
pub use repo::child_repo::{ChildRepository, SqliteChildRepository};
pub use repo::memory_repo::{MemoryRepository, SqliteMemoryRepository};
pub use repo::{RepoError, RepoResult};
pub use search::{
    filter_entries, project_feed, relative_day_label, FeedHeading, FeedProjection, FeedQuery,
};
pub use service::child_service::ChildService;
pub use service::memory_service::{MemoryDraft, MemoryService, PhotoInput};
pub use service::submission::{SubmissionForm, SubmissionState};
pub use session::{
    AuthError, IdentityProvider, LocalIdentityProvider, SessionContext, UserId,
};
pub use storage::{FsObjectStorage, ObjectStorage, StorageError, StorageResult};
pub use sync::{ChangeStream, FeedSource, FeedSynchronizer, LiveFeed, Subscription};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}

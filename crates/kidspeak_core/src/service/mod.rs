//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository, storage and identity calls into use-case APIs.
//! - Keep UI/FFI layers decoupled from storage details.
//!
//! # Invariants
//! - Every service call resolves the owner from the session it is given, at
//!   call time, never from caller-supplied ids.

use crate::error::{CoreError, CoreResult};
use crate::session::{IdentityProvider, UserId};

pub mod child_service;
pub mod memory_service;
pub mod submission;

/// Resolves the signed-in user or fails with `Unauthenticated`.
pub fn require_user(session: &dyn IdentityProvider) -> CoreResult<UserId> {
    session.current_user().ok_or(CoreError::Unauthenticated)
}

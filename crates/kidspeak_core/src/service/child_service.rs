//! Child registry use-cases.
//!
//! # Invariants
//! - A child is always owned by the user of the session that created it.
//! - A successful add is visible to the next `list_children` of that user.

use crate::error::CoreResult;
use crate::model::child::{Child, Gender};
use crate::repo::child_repo::ChildRepository;
use crate::service::require_user;
use crate::session::IdentityProvider;
use log::{error, info};

/// Child registry facade over repository implementations.
pub struct ChildService<R: ChildRepository> {
    repo: R,
}

impl<R: ChildRepository> ChildService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Adds a child for the signed-in user.
    ///
    /// # Errors
    /// - `Unauthenticated` without a session.
    /// - `Validation` when `name` is blank.
    pub fn add_child(
        &self,
        session: &dyn IdentityProvider,
        name: &str,
        gender: Gender,
    ) -> CoreResult<Child> {
        let owner = require_user(session)?;
        let child = Child::new(owner, name, gender)?;

        if let Err(err) = self.repo.create_child(&child) {
            error!(
                "event=child_add module=service status=error error={}",
                err
            );
            return Err(err.into());
        }

        info!(
            "event=child_add module=service status=ok gender={}",
            child.gender.as_str()
        );
        Ok(child)
    }

    /// Lists the signed-in user's children ordered by name.
    pub fn list_children(&self, session: &dyn IdentityProvider) -> CoreResult<Vec<Child>> {
        let owner = require_user(session)?;
        Ok(self.repo.list_children(&owner)?)
    }
}

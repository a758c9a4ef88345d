//! Identity provider contract and session context.
//!
//! # Responsibility
//! - Define the opaque user identifier used as the only tenant key.
//! - Let callers pass the session explicitly into every core operation.
//! - Provide a local email/password provider for single-family installs.
//!
//! # Invariants
//! - Core code never caches a user id across operations; it asks the
//!   provider at call time.
//! - Passwords are kept only as salted SHA-256 digests.
//! - Emails and passwords are never logged.

use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

use crate::model::ValidationError;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

const MIN_PASSWORD_CHARS: usize = 6;

/// Opaque, non-blank user identifier issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::BlankUserId);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

/// Source of the currently signed-in user.
pub trait IdentityProvider {
    /// Returns the signed-in user, or `None` when there is no session.
    fn current_user(&self) -> Option<UserId>;
}

/// Fixed session, used by bridges that already know the signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    user: Option<UserId>,
}

impl SessionContext {
    pub fn signed_in(user: UserId) -> Self {
        Self { user: Some(user) }
    }

    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

impl IdentityProvider for SessionContext {
    fn current_user(&self) -> Option<UserId> {
        self.user.clone()
    }
}

/// Errors from the local identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    InvalidEmail,
    PasswordTooShort { min_chars: usize },
    EmailAlreadyRegistered,
    InvalidCredentials,
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEmail => write!(f, "email address is not valid"),
            Self::PasswordTooShort { min_chars } => {
                write!(f, "password must be at least {min_chars} characters")
            }
            Self::EmailAlreadyRegistered => write!(f, "email is already registered"),
            Self::InvalidCredentials => write!(f, "invalid login credentials"),
        }
    }
}

impl Error for AuthError {}

#[derive(Debug, Clone)]
struct Account {
    user_id: UserId,
    salt: String,
    password_digest: String,
}

/// In-process email/password identity provider.
///
/// Accounts live for the lifetime of the provider; this is enough for a CLI
/// or a single-device install and keeps ownership tests independent of a
/// hosted provider.
#[derive(Debug, Default)]
pub struct LocalIdentityProvider {
    accounts: RefCell<BTreeMap<String, Account>>,
    current: RefCell<Option<UserId>>,
}

impl LocalIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new account and signs it in.
    pub fn sign_up(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AuthError::PasswordTooShort {
                min_chars: MIN_PASSWORD_CHARS,
            });
        }

        let mut accounts = self.accounts.borrow_mut();
        if accounts.contains_key(&email) {
            warn!("event=auth_sign_up module=session status=error error_code=email_taken");
            return Err(AuthError::EmailAlreadyRegistered);
        }

        let user_id = UserId(Uuid::new_v4().to_string());
        let salt = Uuid::new_v4().simple().to_string();
        let password_digest = digest_password(&salt, password);
        accounts.insert(
            email,
            Account {
                user_id: user_id.clone(),
                salt,
                password_digest,
            },
        );
        drop(accounts);

        *self.current.borrow_mut() = Some(user_id.clone());
        info!("event=auth_sign_up module=session status=ok");
        Ok(user_id)
    }

    /// Signs in an existing account, replacing any active session.
    pub fn sign_in(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        let email = normalize_email(email)?;
        let accounts = self.accounts.borrow();
        let account = accounts.get(&email).ok_or(AuthError::InvalidCredentials)?;
        if digest_password(&account.salt, password) != account.password_digest {
            warn!("event=auth_sign_in module=session status=error error_code=invalid_credentials");
            return Err(AuthError::InvalidCredentials);
        }

        let user_id = account.user_id.clone();
        drop(accounts);
        *self.current.borrow_mut() = Some(user_id.clone());
        info!("event=auth_sign_in module=session status=ok");
        Ok(user_id)
    }

    pub fn sign_out(&self) {
        if self.current.borrow_mut().take().is_some() {
            info!("event=auth_sign_out module=session status=ok");
        }
    }
}

impl IdentityProvider for LocalIdentityProvider {
    fn current_user(&self) -> Option<UserId> {
        self.current.borrow().clone()
    }
}

fn normalize_email(raw: &str) -> Result<String, AuthError> {
    let email = raw.trim().to_lowercase();
    if !EMAIL_RE.is_match(&email) {
        return Err(AuthError::InvalidEmail);
    }
    Ok(email)
}

fn digest_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

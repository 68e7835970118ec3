//! User accounts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Entity;
use crate::error::EntityKind;

pub type UserId = String;

/// Trims and lower-cases a user id so lookups are case-insensitive.
pub fn normalize_user_id(raw: &str) -> UserId {
    raw.trim().to_lowercase()
}

// == User Role ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Owner,
    Admin,
    Teacher,
    Student,
}

// == Secret ==
/// A raw credential on its way to the store. Never printed.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

// == User ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub user_id: UserId,
    pub full_name: String,
    pub email: String,
    pub role: UserRole,
    pub is_banned: bool,
    pub ban_reason: Option<String>,
    /// Set once the owner confirmed the account from the emailed link
    pub setup_completed: bool,
    /// Rotated on every password change to invalidate issued sessions
    #[serde(skip_serializing)]
    pub auth_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UserDraft {
    pub user_id: UserId,
    pub full_name: String,
    pub email: String,
    pub password: Secret,
    pub role: UserRole,
}

#[derive(Debug, Clone)]
pub enum UserPatch {
    Profile { full_name: String, email: String },
    /// The store hashes the password and rotates the auth hash
    Password(Secret),
    /// Sets the first password and marks the account as set up
    ConfirmAccount(Secret),
    Ban { reason: Option<String> },
    Unban,
}

impl Entity for User {
    type Id = UserId;
    type Draft = UserDraft;
    type Patch = UserPatch;

    const KIND: EntityKind = EntityKind::User;

    fn id(&self) -> UserId {
        self.user_id.clone()
    }
}

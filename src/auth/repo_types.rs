use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,                     // unique user ID
    pub username: String,             // unique handle, exact match
    pub email: String,                // unique, compared case-insensitively
    #[serde(skip_serializing)]
    pub password_hash: String,        // Argon2 hash, not exposed in JSON
    pub phone: String,                // may be empty
    pub full_name: String,
    pub is_active: bool,
    pub created_at: OffsetDateTime,   // creation timestamp
}

/// Validated, hashed input for a new user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub phone: String,
    pub full_name: String,
}

/// Which unique column a conflicting insert collided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    Username,
    Email,
}

impl IdentityField {
    pub fn as_str(self) -> &'static str {
        match self {
            IdentityField::Username => "username",
            IdentityField::Email => "email",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CreateUserError {
    #[error("a user with that {} already exists", .0.as_str())]
    Duplicate(IdentityField),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

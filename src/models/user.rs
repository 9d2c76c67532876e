//! User Model
//!
//! Core user account structures and role definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Account role on the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum UserRole {
    Model,
    Employer,
    Agency,
    Admin,
}

impl UserRole {
    /// Canonical lowercase name used on the wire and in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Model => "model",
            UserRole::Employer => "employer",
            UserRole::Agency => "agency",
            UserRole::Admin => "admin",
        }
    }

    /// Whether accounts with this role may self-register.
    ///
    /// Admin accounts are provisioned out of band, never through Register.
    pub fn is_registerable(&self) -> bool {
        !matches!(self, UserRole::Admin)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model" => Ok(UserRole::Model),
            "employer" => Ok(UserRole::Employer),
            "agency" => Ok(UserRole::Agency),
            "admin" => Ok(UserRole::Admin),
            _ => Err(()),
        }
    }
}

/// User representation for external API responses
///
/// This struct represents a user account without sensitive information like
/// the password hash. All datetime fields use UTC.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique identifier for the user
    pub id: Uuid,

    /// User's email address (unique, normalized)
    pub email: String,

    /// Account role
    pub role: UserRole,

    /// Whether the user's email address has been verified
    pub email_verified: bool,

    /// Convenience alias kept in sync with `email_verified`
    pub is_verified: bool,

    /// Whether the account has been banned by moderation
    pub is_banned: bool,

    /// Timestamp when the user account was created
    pub created_at: DateTime<Utc>,

    /// Timestamp when the account was last modified
    pub updated_at: DateTime<Utc>,
}

/// Internal user representation including password hash
///
/// Used for credential checks; never exposed in API responses.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserWithPassword {
    pub id: Uuid,
    pub email: String,
    /// bcrypt hashed password
    pub password_hash: String,
    pub role: UserRole,
    pub email_verified: bool,
    pub is_verified: bool,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserWithPassword> for User {
    /// Strip the password hash so it cannot leak into API responses.
    fn from(user: UserWithPassword) -> Self {
        User {
            id: user.id,
            email: user.email,
            role: user.role,
            email_verified: user.email_verified,
            is_verified: user.is_verified,
            is_banned: user.is_banned,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

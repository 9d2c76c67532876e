//! Email Verification Model
//!
//! The single active verification code per user, stored as a peppered hash
//! with an attempt counter.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Maximum confirm attempts before a code is invalidated
pub const MAX_CODE_ATTEMPTS: i32 = 5;

/// Verification-code lifetime in minutes
pub const CODE_TTL_MINUTES: i64 = 5;

/// Active verification code for a user
///
/// Upserted on every request; a new code replaces any prior one. The raw
/// code is never stored, only `SHA256(code || pepper)`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VerificationCode {
    /// Owning user (one active code per user)
    pub user_id: Uuid,

    /// Peppered SHA-256 hex hash of the 6-digit code
    pub code_hash: String,

    /// Number of failed confirm attempts against this code
    pub attempts: i32,

    /// Expiration timestamp for the code
    pub expires_at: DateTime<Utc>,

    /// When the code was consumed or invalidated
    pub used_at: Option<DateTime<Utc>>,

    /// When the code was generated
    pub created_at: DateTime<Utc>,
}

impl VerificationCode {
    /// Check if the code has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Check if the code has been consumed or invalidated
    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    /// Check if the attempt ceiling has been reached
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= MAX_CODE_ATTEMPTS
    }
}

/// Outcome of a verification-code operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// A fresh code was generated and queued for delivery
    Sent,
    /// The account is already verified; no code was created
    AlreadyVerified,
    /// The code matched and the account is now verified
    Verified,
}

impl VerificationStatus {
    /// Wire representation of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Sent => "sent",
            VerificationStatus::AlreadyVerified => "already_verified",
            VerificationStatus::Verified => "verified",
        }
    }
}

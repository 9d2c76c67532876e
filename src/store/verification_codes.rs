//! Verification Code Store
//!
//! One active code per user. Attempt increments and the used marker are
//! single conditional updates so the attempt ceiling stays exact under
//! concurrent confirm calls.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::verification::VerificationCode;

/// Postgres-backed store for email verification codes
#[derive(Clone)]
pub struct VerificationCodeStore {
    pool: PgPool,
}

impl VerificationCodeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or replace the active code for a user.
    ///
    /// Requesting a new code invalidates any prior one: the attempt counter
    /// resets and the used marker clears.
    pub async fn upsert(
        &self,
        user_id: Uuid,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO email_verification_codes (user_id, code_hash, expires_at) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO UPDATE \
             SET code_hash = EXCLUDED.code_hash, \
                 attempts = 0, \
                 expires_at = EXCLUDED.expires_at, \
                 used_at = NULL, \
                 created_at = NOW()",
        )
        .bind(user_id)
        .bind(code_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch the active code record for a user
    pub async fn get_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<VerificationCode>, sqlx::Error> {
        sqlx::query_as::<_, VerificationCode>(
            "SELECT user_id, code_hash, attempts, expires_at, used_at, created_at \
             FROM email_verification_codes \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Atomically increment the attempt counter of a live code.
    ///
    /// Returns the new count, or None when no live code exists.
    pub async fn increment_attempts(&self, user_id: Uuid) -> Result<Option<i32>, sqlx::Error> {
        let row: Option<(i32,)> = sqlx::query_as(
            "UPDATE email_verification_codes \
             SET attempts = attempts + 1 \
             WHERE user_id = $1 AND used_at IS NULL \
             RETURNING attempts",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.0))
    }

    /// Mark the active code as used/invalidated.
    ///
    /// Conditional update; returns false when the code was already dead.
    pub async fn mark_used(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE email_verification_codes \
             SET used_at = NOW() \
             WHERE user_id = $1 AND used_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

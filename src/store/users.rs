//! User Store
//!
//! Credential-record access: lookup, creation, and the two mutations the
//! auth core performs (password updates and verification flags).

use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::user::{UserRole, UserWithPassword};

/// Storage-level error for user creation
#[derive(Error, Debug)]
pub enum CreateUserError {
    /// The email is already registered
    #[error("Email already exists")]
    EmailTaken,

    /// Any other database failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Maps backend-specific conflict signals onto domain-level outcomes.
///
/// Postgres reports unique violations with the constraint name; keeping the
/// inspection here means the rest of the core never sees driver error shapes.
pub(crate) struct PgErrorClassifier;

impl PgErrorClassifier {
    const USERS_EMAIL_KEY: &'static str = "users_email_key";

    pub fn is_unique_email_violation(err: &sqlx::Error) -> bool {
        matches!(
            err,
            sqlx::Error::Database(db_err) if db_err.constraint() == Some(Self::USERS_EMAIL_KEY)
        )
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, role, email_verified, is_verified, \
     is_banned, created_at, updated_at";

/// Postgres-backed store for user credential records
#[derive(Clone)]
pub struct UserStore {
    pool: PgPool,
}

impl UserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new user record.
    ///
    /// A unique violation on the email key is classified as `EmailTaken`
    /// so callers never depend on driver error shapes.
    pub async fn create(
        &self,
        email: &str,
        password_hash: &str,
        role: UserRole,
    ) -> Result<UserWithPassword, CreateUserError> {
        let query = format!(
            "INSERT INTO users (email, password_hash, role) \
             VALUES ($1, $2, $3) \
             RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, UserWithPassword>(&query)
            .bind(email)
            .bind(password_hash)
            .bind(role)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if PgErrorClassifier::is_unique_email_violation(&e) {
                    CreateUserError::EmailTaken
                } else {
                    CreateUserError::Database(e)
                }
            })
    }

    /// Look up a user by normalized email address
    pub async fn get_by_email(&self, email: &str) -> Result<Option<UserWithPassword>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");

        sqlx::query_as::<_, UserWithPassword>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    /// Look up a user by id
    pub async fn get_by_id(&self, user_id: Uuid) -> Result<Option<UserWithPassword>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        sqlx::query_as::<_, UserWithPassword>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Replace the stored password hash.
    ///
    /// Returns whether a row was updated.
    pub async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark the user's email as verified (both flags kept in sync)
    pub async fn mark_email_verified(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserWithPassword>, sqlx::Error> {
        let query = format!(
            "UPDATE users \
             SET email_verified = TRUE, is_verified = TRUE, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, UserWithPassword>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }
}

//! Refresh Session Store
//!
//! Persistence for opaque refresh-token records. All state transitions are
//! conditional updates with row-count checks so rotation stays linearizable
//! per token hash without application-level locks.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::session::{NewRefreshSession, RefreshSession};

const SESSION_COLUMNS: &str = "id, user_id, token_hash, jti, expires_at, used_at, revoked_at, \
     created_at, user_agent, ip_address";

/// Postgres-backed store for refresh-token records
#[derive(Clone)]
pub struct RefreshSessionStore {
    pool: PgPool,
}

impl RefreshSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new live record
    pub async fn create(&self, session: &NewRefreshSession) -> Result<RefreshSession, sqlx::Error> {
        let query = format!(
            "INSERT INTO refresh_sessions \
                 (user_id, token_hash, jti, expires_at, user_agent, ip_address) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {SESSION_COLUMNS}"
        );

        sqlx::query_as::<_, RefreshSession>(&query)
            .bind(session.user_id)
            .bind(&session.token_hash)
            .bind(session.jti)
            .bind(session.expires_at)
            .bind(&session.user_agent)
            .bind(session.ip_address)
            .fetch_one(&self.pool)
            .await
    }

    /// Look up a record by token hash
    pub async fn get_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshSession>, sqlx::Error> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM refresh_sessions WHERE token_hash = $1");

        sqlx::query_as::<_, RefreshSession>(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
    }

    /// Mark a live record as used (rotated away).
    ///
    /// Single conditional update; returns false when the record was already
    /// used or revoked, which callers treat as a reuse signal. Concurrent
    /// presentations of the same token therefore succeed at most once.
    pub async fn mark_used(&self, token_hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE refresh_sessions \
             SET used_at = NOW() \
             WHERE token_hash = $1 AND used_at IS NULL AND revoked_at IS NULL",
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Revoke one record by token hash; idempotent, a no-op on dead rows
    pub async fn revoke_by_token_hash(&self, token_hash: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE refresh_sessions \
             SET revoked_at = NOW() \
             WHERE token_hash = $1 AND revoked_at IS NULL AND used_at IS NULL",
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Revoke every live record of a user (reuse detection, password reset)
    pub async fn revoke_all_by_user(&self, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE refresh_sessions \
             SET revoked_at = NOW() \
             WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Retention cleanup: delete rows past their expiry
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_sessions WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::users::UserStore;
    use crate::models::user::UserRole;
    use chrono::{Duration, Utc};

    async fn seed_user(pool: &PgPool) -> Uuid {
        UserStore::new(pool.clone())
            .create("session-user@example.com", "hash", UserRole::Model)
            .await
            .unwrap()
            .id
    }

    fn new_session(user_id: Uuid, token_hash: &str) -> NewRefreshSession {
        NewRefreshSession {
            user_id,
            token_hash: token_hash.to_string(),
            jti: Uuid::new_v4(),
            expires_at: Utc::now() + Duration::hours(168),
            user_agent: Some("tests".to_string()),
            ip_address: None,
        }
    }

    #[sqlx::test]
    async fn test_create_and_lookup(pool: PgPool) {
        let store = RefreshSessionStore::new(pool.clone());
        let user_id = seed_user(&pool).await;

        let created = store
            .create(&new_session(user_id, &"a".repeat(64)))
            .await
            .unwrap();
        assert!(created.is_live());

        let found = store
            .get_by_token_hash(&"a".repeat(64))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);

        let missing = store.get_by_token_hash(&"b".repeat(64)).await.unwrap();
        assert!(missing.is_none());
    }

    #[sqlx::test]
    async fn test_mark_used_succeeds_exactly_once(pool: PgPool) {
        let store = RefreshSessionStore::new(pool.clone());
        let user_id = seed_user(&pool).await;
        let hash = "c".repeat(64);

        store.create(&new_session(user_id, &hash)).await.unwrap();

        assert!(store.mark_used(&hash).await.unwrap());
        // Second attempt hits a dead row and reports it
        assert!(!store.mark_used(&hash).await.unwrap());
    }

    #[sqlx::test]
    async fn test_revoke_is_idempotent(pool: PgPool) {
        let store = RefreshSessionStore::new(pool.clone());
        let user_id = seed_user(&pool).await;
        let hash = "d".repeat(64);

        store.create(&new_session(user_id, &hash)).await.unwrap();

        store.revoke_by_token_hash(&hash).await.unwrap();
        store.revoke_by_token_hash(&hash).await.unwrap();

        let session = store.get_by_token_hash(&hash).await.unwrap().unwrap();
        assert!(session.is_revoked());
        assert!(!store.mark_used(&hash).await.unwrap());
    }

    #[sqlx::test]
    async fn test_revoke_all_by_user(pool: PgPool) {
        let store = RefreshSessionStore::new(pool.clone());
        let user_id = seed_user(&pool).await;

        store
            .create(&new_session(user_id, &"e".repeat(64)))
            .await
            .unwrap();
        store
            .create(&new_session(user_id, &"f".repeat(64)))
            .await
            .unwrap();

        let revoked = store.revoke_all_by_user(user_id).await.unwrap();
        assert_eq!(revoked, 2);

        for hash in [&"e".repeat(64), &"f".repeat(64)] {
            let session = store.get_by_token_hash(hash).await.unwrap().unwrap();
            assert!(session.is_revoked());
        }
    }
}

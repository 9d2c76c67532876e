//! Password Reset Store
//!
//! Ephemeral single-use reset tokens in a volatile keyed store, mapped as
//! `reset:<token> -> user_id` with a TTL. Entries disappear on first use or
//! natural expiry.

use log::warn;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::utils::security::generate_opaque_token;

/// Default reset-token lifetime in seconds (1 hour)
pub const DEFAULT_RESET_TTL_SECONDS: u64 = 3600;

const KEY_PREFIX: &str = "reset:";

/// Redis-backed store for password reset tokens
#[derive(Clone)]
pub struct PasswordResetStore {
    conn: ConnectionManager,
    ttl_seconds: u64,
}

impl PasswordResetStore {
    /// Connect to the keyed store at the given URL
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self::new(conn))
    }

    /// Wrap an existing connection with the default TTL
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            ttl_seconds: DEFAULT_RESET_TTL_SECONDS,
        }
    }

    /// Override the token lifetime
    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    /// Generate and store a fresh reset token for a user.
    ///
    /// The raw token is returned to the caller exactly once.
    pub async fn create(&self, user_id: Uuid) -> Result<String, redis::RedisError> {
        let token = generate_opaque_token();
        let key = format!("{KEY_PREFIX}{token}");

        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, user_id.to_string(), self.ttl_seconds)
            .await?;

        Ok(token)
    }

    /// Resolve a token to its user id; None when absent or expired
    pub async fn lookup(&self, token: &str) -> Result<Option<Uuid>, redis::RedisError> {
        let key = format!("{KEY_PREFIX}{token}");

        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;

        Ok(value.and_then(|v| Uuid::parse_str(&v).ok()))
    }

    /// Best-effort delete after a successful password change so the token
    /// cannot be replayed within its TTL window.
    pub async fn invalidate(&self, token: &str) {
        let key = format!("{KEY_PREFIX}{token}");

        let mut conn = self.conn.clone();
        if let Err(e) = conn.del::<_, ()>(key).await {
            warn!("failed to invalidate password reset token: {}", e);
        }
    }
}

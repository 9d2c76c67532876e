//! Refresh Session Model
//!
//! Persistent refresh-token records. A record moves from issued to used
//! (rotated away) or revoked; expiry is time-based. No transition leaves
//! `used` or `revoked`.

use chrono::{DateTime, Utc};
use sqlx::types::ipnetwork::IpNetwork;
use uuid::Uuid;

/// Refresh-token record keyed by the SHA-256 hash of the raw token
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshSession {
    /// Unique identifier for the record
    pub id: Uuid,

    /// Reference to the user who owns this session
    pub user_id: Uuid,

    /// SHA-256 hex hash of the raw refresh token (unique)
    pub token_hash: String,

    /// Token identifier, matched against legacy claims during migration
    pub jti: Uuid,

    /// Timestamp when the token expires
    pub expires_at: DateTime<Utc>,

    /// Set when the token was rotated away; terminal
    pub used_at: Option<DateTime<Utc>>,

    /// Set when the token was revoked; terminal
    pub revoked_at: Option<DateTime<Utc>>,

    /// Timestamp when the record was created
    pub created_at: DateTime<Utc>,

    /// Optional client user agent string
    pub user_agent: Option<String>,

    /// Optional client IP address
    pub ip_address: Option<IpNetwork>,
}

impl RefreshSession {
    /// Check if the token is past its expiry
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Check if the token has been rotated away
    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    /// Check if the token has been revoked
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// A record is live iff it is neither used nor revoked nor expired
    pub fn is_live(&self) -> bool {
        !self.is_used() && !self.is_revoked() && !self.is_expired()
    }
}

/// Fields for inserting a new refresh-token record
#[derive(Debug, Clone)]
pub struct NewRefreshSession {
    pub user_id: Uuid,
    pub token_hash: String,
    pub jti: Uuid,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<IpNetwork>,
}

/// Optional client metadata recorded on token issuance
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub user_agent: Option<String>,
    pub ip_address: Option<IpNetwork>,
}

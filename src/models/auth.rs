//! Authentication Models
//!
//! Claim structures for access tokens, the legacy refresh-token format, and
//! the token pair returned to clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::UserRole;

/// JWT token pair containing an access token and an opaque refresh token
///
/// Returned when a user successfully authenticates or rotates their tokens.
/// The refresh token is handed out raw exactly once; only its hash is kept
/// server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived access token for API authentication
    pub access_token: String,

    /// Opaque refresh token for obtaining new access tokens
    pub refresh_token: String,

    /// Token type (always "Bearer")
    pub token_type: String,

    /// Access token expiration time in seconds
    pub expires_in: i64,
}

impl TokenPair {
    /// Create a new token pair
    pub fn new(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

/// JWT claims structure for access tokens
///
/// Validity is purely cryptographic plus expiry; claims are never checked
/// against a store. `is_banned` is embedded so resource servers can reject
/// banned accounts without a database round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject - user ID
    pub sub: String,

    /// Account role at issuance time
    pub role: UserRole,

    /// Ban flag at issuance time
    pub is_banned: bool,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// JWT ID - unique token identifier
    pub jti: String,

    /// Token type (always "access" for access tokens)
    #[serde(rename = "type")]
    pub token_type: String,
}

impl AccessTokenClaims {
    /// Create new access token claims with a fresh random `jti`
    pub fn new(
        user_id: Uuid,
        role: UserRole,
        is_banned: bool,
        expires_at: DateTime<Utc>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sub: user_id.to_string(),
            role,
            is_banned,
            exp: expires_at.timestamp(),
            iat: issued_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: "access".to_string(),
        }
    }
}

/// Claims of the legacy self-contained refresh JWT format.
///
/// Only decoded when the legacy fallback flag is enabled, for backward
/// compatibility during the opaque-token migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyRefreshTokenClaims {
    /// Subject - user ID
    pub sub: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// JWT ID, must match the stored session record
    pub jti: String,

    /// Token type (always "refresh" for legacy refresh tokens)
    #[serde(rename = "type")]
    pub token_type: String,
}

/// User context extracted from a validated access token
///
/// Used by the consuming HTTP layer for authorization decisions.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// User ID extracted from the token subject
    pub user_id: Uuid,

    /// Account role at issuance time
    pub role: UserRole,

    /// Ban flag at issuance time
    pub is_banned: bool,

    /// Token ID for tracking
    pub token_id: String,

    /// Token expiration time
    pub expires_at: DateTime<Utc>,
}

impl AuthContext {
    /// Create auth context from access token claims
    pub fn from_access_claims(claims: &AccessTokenClaims) -> Result<Self, uuid::Error> {
        Ok(Self {
            user_id: Uuid::parse_str(&claims.sub)?,
            role: claims.role,
            is_banned: claims.is_banned,
            token_id: claims.jti.clone(),
            expires_at: DateTime::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now),
        })
    }
}

//! Token Service
//!
//! Stateless construction and validation of access tokens, generation of
//! opaque refresh tokens, and the legacy signed-refresh compatibility path.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use uuid::Uuid;

use crate::models::auth::{AccessTokenClaims, AuthContext, LegacyRefreshTokenClaims};
use crate::models::user::UserRole;
use crate::utils::security::generate_opaque_token;

/// Token-level error type
#[derive(Error, Debug)]
pub enum TokenError {
    /// Bad signature, malformed token, or wrong token type
    #[error("Invalid token")]
    InvalidToken,

    /// Structurally valid token past its expiry
    #[error("Token has expired")]
    ExpiredToken,

    /// Signing failed
    #[error("Token generation error: {0}")]
    Generation(String),
}

/// A freshly generated opaque refresh token.
///
/// The raw value leaves the server exactly once; stores only ever see its
/// hash.
#[derive(Debug, Clone)]
pub struct RefreshTokenGrant {
    /// Raw 64-character hex token handed to the client
    pub token: String,

    /// Token identifier persisted with the session record
    pub jti: Uuid,

    /// Expiry of the grant
    pub expires_at: DateTime<Utc>,
}

/// Stateless issuer and validator for platform tokens
#[derive(Clone)]
pub struct TokenService {
    /// Symmetric signing secret
    signing_secret: String,
    /// Access token lifetime (default: 15 minutes)
    access_ttl: Duration,
    /// Refresh token lifetime (default: 168 hours)
    refresh_ttl: Duration,
}

impl TokenService {
    /// Create a token service with default lifetimes
    pub fn new(signing_secret: String) -> Self {
        Self {
            signing_secret,
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::hours(168),
        }
    }

    /// Create a token service with custom lifetimes
    pub fn with_ttls(signing_secret: String, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            signing_secret,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Access token lifetime in seconds, for client-facing responses
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Sign a short-lived access token for the user.
    ///
    /// No side effects beyond signing; a fresh `jti` is embedded per call.
    pub fn issue_access_token(
        &self,
        user_id: Uuid,
        role: UserRole,
        is_banned: bool,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = AccessTokenClaims::new(user_id, role, is_banned, now + self.access_ttl, now);

        let header = Header::new(Algorithm::HS256);
        let encoding_key = EncodingKey::from_secret(self.signing_secret.as_ref());

        encode(&header, &claims, &encoding_key).map_err(|e| TokenError::Generation(e.to_string()))
    }

    /// Generate an opaque refresh token grant.
    ///
    /// Not a JWT: 32 bytes of secure randomness, hex-encoded, so the token
    /// carries no forgeable claims. Its only authority comes from matching a
    /// stored hash.
    pub fn issue_refresh_token(&self) -> RefreshTokenGrant {
        RefreshTokenGrant {
            token: generate_opaque_token(),
            jti: Uuid::new_v4(),
            expires_at: Utc::now() + self.refresh_ttl,
        }
    }

    /// Validate an access token and extract the auth context.
    ///
    /// Rejects tokens whose `type` claim is not "access" to defend against
    /// token-type confusion.
    pub fn validate_access_token(&self, token: &str) -> Result<AuthContext, TokenError> {
        let claims = self.decode_claims::<AccessTokenClaims>(token)?;

        if claims.token_type != "access" {
            return Err(TokenError::InvalidToken);
        }

        AuthContext::from_access_claims(&claims).map_err(|_| TokenError::InvalidToken)
    }

    /// Whether the presented string is shaped like a signed JWT rather than
    /// an opaque hex token.
    pub fn looks_like_jwt(token: &str) -> bool {
        token.contains('.')
    }

    /// Decode a legacy self-contained refresh JWT.
    ///
    /// Compatibility path for tokens issued before the opaque scheme; only
    /// called when the legacy fallback flag is enabled.
    pub fn decode_legacy_refresh_token(
        &self,
        token: &str,
    ) -> Result<LegacyRefreshTokenClaims, TokenError> {
        let claims = self.decode_claims::<LegacyRefreshTokenClaims>(token)?;

        if claims.token_type != "refresh" {
            return Err(TokenError::InvalidToken);
        }

        Ok(claims)
    }

    fn decode_claims<C: serde::de::DeserializeOwned>(&self, token: &str) -> Result<C, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;

        let decoding_key = DecodingKey::from_secret(self.signing_secret.as_ref());

        decode::<C>(token, &decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::ExpiredToken,
                _ => TokenError::InvalidToken,
            })
    }
}

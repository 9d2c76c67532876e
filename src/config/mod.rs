//! Configuration Module
//!
//! Environment-sourced configuration for the auth core. Collaborator-specific
//! settings (database, SMTP, identity sync) live next to their components;
//! this module holds the shared helpers and the auth settings themselves.

/// Environment variable helpers
pub mod env {
    use std::env;

    /// Get environment variable as string with default
    pub fn get_string(key: &str, default: &str) -> String {
        env::var(key).unwrap_or_else(|_| default.to_string())
    }

    /// Get environment variable as boolean with default
    pub fn get_bool(key: &str, default: bool) -> bool {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get environment variable as u32 with default
    pub fn get_u32(key: &str, default: u32) -> u32 {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get environment variable as u64 with default
    pub fn get_u64(key: &str, default: u64) -> u64 {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get environment variable as i64 with default
    pub fn get_i64(key: &str, default: i64) -> i64 {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get environment variable as usize with default
    pub fn get_usize(key: &str, default: usize) -> usize {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Check if environment variable is set
    pub fn is_set(key: &str) -> bool {
        env::var(key).is_ok()
    }

    /// Get required environment variable or panic
    pub fn get_required(key: &str) -> String {
        env::var(key).unwrap_or_else(|_| panic!("Required environment variable {} is not set", key))
    }
}

/// Auth core configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Symmetric secret for signing access tokens
    pub jwt_secret: String,

    /// Access token lifetime in minutes
    pub access_ttl_minutes: i64,

    /// Refresh token lifetime in hours
    pub refresh_ttl_hours: i64,

    /// Server-side pepper mixed into verification-code hashes
    pub verification_pepper: String,

    /// Accept legacy self-contained refresh JWTs during migration
    pub legacy_refresh_fallback: bool,

    /// Permit logging generated verification codes for local testing only
    pub dev_mode: bool,

    /// bcrypt cost factor for password hashing
    pub bcrypt_cost: u32,
}

impl AuthConfig {
    /// Load auth configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            jwt_secret: env::get_required("JWT_SECRET"),
            access_ttl_minutes: env::get_i64("JWT_ACCESS_TTL_MINUTES", 15),
            refresh_ttl_hours: env::get_i64("REFRESH_TTL_HOURS", 168),
            verification_pepper: env::get_required("VERIFICATION_PEPPER"),
            legacy_refresh_fallback: env::get_bool("LEGACY_REFRESH_FALLBACK", false),
            dev_mode: env::get_bool("DEV_MODE", false),
            bcrypt_cost: env::get_u32("BCRYPT_COST", crate::utils::security::DEFAULT_BCRYPT_COST),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.jwt_secret.is_empty() {
            return Err("JWT secret cannot be empty".to_string());
        }

        if self.verification_pepper.is_empty() {
            return Err("Verification pepper cannot be empty".to_string());
        }

        if self.access_ttl_minutes <= 0 || self.refresh_ttl_hours <= 0 {
            return Err("Token lifetimes must be positive".to_string());
        }

        Ok(())
    }
}

//! mwork Auth Core
//!
//! The session and identity-verification core of the mwork platform backend:
//! credential authentication, JWT access-token issuance, refresh-token
//! rotation with reuse detection, numeric email-verification codes, password
//! reset tokens, and a best-effort asynchronous identity sync to a dependent
//! service.
//!
//! # Features
//!
//! - **Opaque refresh tokens**: 32 random bytes, stored only as SHA-256
//!   hashes; rotation consumes the presented token and reuse of a dead token
//!   revokes every session of that user
//! - **Attempt-limited verification codes**: peppered hashes, 5-minute TTL,
//!   atomic 5-attempt ceiling
//! - **Failure isolation**: the external identity sync runs on detached,
//!   bounded tasks and can never block or fail registration
//! - **Stable error contract**: storage conflicts are classified into domain
//!   errors; security-sensitive failures stay generic to avoid oracle leakage
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mwork_auth::{
//!     config::AuthConfig,
//!     database::DatabaseConfig,
//!     models::{ClientMeta, LoginRequest, RegisterRequest},
//!     service::AuthService,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = DatabaseConfig::from_env()?.create_pool().await?;
//!     let config = AuthConfig::from_env();
//!     config.validate()?;
//!
//!     let auth = AuthService::new(pool, &config);
//!
//!     let user = auth
//!         .register(RegisterRequest {
//!             email: "user@example.com".to_string(),
//!             password: "password123".to_string(),
//!             role: "model".to_string(),
//!         })
//!         .await?;
//!     println!("registered {} ({})", user.email, user.id);
//!
//!     // Login succeeds once the email is verified
//!     let (user, tokens) = auth
//!         .login(
//!             LoginRequest {
//!                 email: "user@example.com".to_string(),
//!                 password: "password123".to_string(),
//!             },
//!             ClientMeta::default(),
//!         )
//!         .await?;
//!     println!("issued tokens for {}: {}s access", user.email, tokens.expires_in);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Service layer**: `AuthService` orchestrates the flows; `TokenService`
//!   signs and validates tokens; `IdentitySyncDispatcher` notifies the
//!   dependent service; `MailQueue` abstracts outbound email
//! - **Store layer**: Postgres-backed user, refresh-session, and
//!   verification-code stores built on conditional updates; a Redis-backed
//!   password-reset store
//! - **Models**: account, claim, session, and request/response structures
//! - **Utils**: error mapping, hashing and token generation, validation

/// Configuration management
pub mod config;

/// Database connection management
pub mod database;

/// Data models and request/response structures
pub mod models;

/// Business logic: orchestrator, tokens, mail, identity sync
pub mod service;

/// Persistence layer
pub mod store;

/// Shared utilities for security, validation, and error handling
pub mod utils;

// Re-export commonly used types for convenient access
pub use models::{
    auth::{AccessTokenClaims, AuthContext, TokenPair},
    requests::{
        ConfirmVerificationCodeRequest, ForgotPasswordRequest, LoginRequest,
        RefreshTokenRequest, RegisterRequest, RequestVerificationCodeRequest,
        ResetPasswordRequest,
    },
    session::ClientMeta,
    user::{User, UserRole},
    verification::VerificationStatus,
};
pub use service::{
    AuthService, AuthServiceError, IdentitySyncDispatcher, MailQueue, SmtpMailer, TokenService,
};
pub use store::{
    EmployerProfileRepository, ModelProfileRepository, PasswordResetStore, RefreshSessionStore,
    UserStore, VerificationCodeStore,
};
pub use utils::error::{AppError, AppResult, ErrorResponse};

// Re-export database utilities for configuration
pub use database::{DatabaseConfig, DatabasePool};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

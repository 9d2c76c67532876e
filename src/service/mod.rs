//! Service Layer
//!
//! Business logic for the auth core: the orchestrator, the token service,
//! the mail queue, and the identity sync dispatcher.

pub mod auth;
pub mod identity_sync;
pub mod mailer;
pub mod token;

// Re-export services
pub use auth::{AuthResult, AuthService, AuthServiceError};
pub use identity_sync::{IdentitySyncConfig, IdentitySyncDispatcher, IdentitySyncPayload};
pub use mailer::{MailQueue, MailerConfig, SmtpMailer};
pub use token::{RefreshTokenGrant, TokenError, TokenService};

//! Store Layer
//!
//! Persistence for the auth core: user credentials and refresh sessions and
//! verification codes in Postgres, password reset tokens in a volatile keyed
//! store, plus the narrow profile-repository capabilities.

pub mod password_resets;
pub mod profiles;
pub mod refresh_sessions;
pub mod users;
pub mod verification_codes;

// Re-export store types
pub use password_resets::PasswordResetStore;
pub use profiles::{EmployerProfileRepository, ModelProfileRepository};
pub use refresh_sessions::RefreshSessionStore;
pub use users::{CreateUserError, UserStore};
pub use verification_codes::VerificationCodeStore;

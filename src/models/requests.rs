//! Request and Response Models
//!
//! Payload structures for the auth operations, with validation.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::user::User;
use crate::models::verification::VerificationStatus;
use crate::utils::validation::{email_validator, verification_code_validator};

/// Request payload for creating a new account
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    /// User's email address (must be unique and valid format)
    #[validate(custom(function = "email_validator"))]
    pub email: String,

    /// User's password (8-128 characters)
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password must be between 8 and 128 characters"
    ))]
    pub password: String,

    /// Requested account role ("model", "employer" or "agency")
    #[validate(length(min = 1, message = "Role is required"))]
    pub role: String,
}

/// Request payload for credential login
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    /// Account email address
    #[validate(custom(function = "email_validator"))]
    pub email: String,

    /// Account password (cannot be empty)
    #[validate(length(min = 1, message = "Password cannot be empty"))]
    pub password: String,
}

/// Request payload for rotating refresh tokens
#[derive(Debug, Deserialize, Validate)]
pub struct RefreshTokenRequest {
    /// Refresh token to exchange for a new token pair
    pub refresh_token: String,
}

/// Request payload for asking for a new email verification code
#[derive(Debug, Deserialize, Validate)]
pub struct RequestVerificationCodeRequest {
    /// Email address of the account to verify
    #[validate(custom(function = "email_validator"))]
    pub email: String,
}

/// Request payload for confirming an email verification code
#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmVerificationCodeRequest {
    /// Email address of the account to verify
    #[validate(custom(function = "email_validator"))]
    pub email: String,

    /// 6-digit verification code
    #[validate(custom(function = "verification_code_validator"))]
    pub code: String,
}

/// Request payload for starting a password reset
#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    /// Email address; the response never reveals whether it exists
    #[validate(custom(function = "email_validator"))]
    pub email: String,
}

/// Request payload for completing a password reset
#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    /// Single-use reset token from the email link
    #[validate(length(min = 1, message = "Reset token is required"))]
    pub token: String,

    /// New password (8-128 characters)
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password must be between 8 and 128 characters"
    ))]
    pub new_password: String,
}

/// Response for a successful login or registration-free token issuance
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    /// Authenticated user profile
    pub user: User,
    /// Issued access and refresh tokens
    #[serde(flatten)]
    pub tokens: crate::models::auth::TokenPair,
}

/// Response for verification-code operations
#[derive(Debug, Serialize)]
pub struct VerificationResponse {
    /// "sent", "already_verified" or "verified"
    pub status: VerificationStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_validation() {
        let valid = RegisterRequest {
            email: "user@example.com".to_string(),
            password: "password123".to_string(),
            role: "model".to_string(),
        };
        assert!(valid.validate().is_ok());

        let bad_email = RegisterRequest {
            email: "not-an-email".to_string(),
            password: "password123".to_string(),
            role: "model".to_string(),
        };
        assert!(bad_email.validate().is_err());

        let short_password = RegisterRequest {
            email: "user@example.com".to_string(),
            password: "short".to_string(),
            role: "model".to_string(),
        };
        assert!(short_password.validate().is_err());
    }

    #[test]
    fn test_confirm_request_rejects_malformed_code() {
        let request = ConfirmVerificationCodeRequest {
            email: "user@example.com".to_string(),
            code: "12ab56".to_string(),
        };
        assert!(request.validate().is_err());

        let request = ConfirmVerificationCodeRequest {
            email: "user@example.com".to_string(),
            code: "123456".to_string(),
        };
        assert!(request.validate().is_ok());
    }
}

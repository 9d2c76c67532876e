//! Authentication Service
//!
//! The orchestrator for credential authentication, token rotation, email
//! verification, and the password-reset flow. Composes the stores, the token
//! service, the mail queue, and the identity-sync dispatcher.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{debug, error, warn};
use serde_json::json;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::config::AuthConfig;
use crate::models::auth::{AuthContext, TokenPair};
use crate::models::requests::{
    ConfirmVerificationCodeRequest, ForgotPasswordRequest, LoginRequest, RegisterRequest,
    ResetPasswordRequest,
};
use crate::models::session::{ClientMeta, NewRefreshSession};
use crate::models::user::{User, UserRole, UserWithPassword};
use crate::models::verification::{VerificationStatus, CODE_TTL_MINUTES, MAX_CODE_ATTEMPTS};
use crate::service::identity_sync::{IdentitySyncDispatcher, IdentitySyncPayload};
use crate::service::mailer::{
    MailQueue, TEMPLATE_PASSWORD_RESET, TEMPLATE_VERIFICATION_CODE, TEMPLATE_WELCOME,
};
use crate::service::token::{TokenError, TokenService};
use crate::store::password_resets::PasswordResetStore;
use crate::store::profiles::{EmployerProfileRepository, ModelProfileRepository};
use crate::store::refresh_sessions::RefreshSessionStore;
use crate::store::users::{CreateUserError, UserStore};
use crate::store::verification_codes::VerificationCodeStore;
use crate::utils::error::AppError;
use crate::utils::security::{
    constant_time_compare, generate_numeric_code, hash_password_with_cost,
    hash_refresh_token, hash_verification_code, verify_password,
};
use crate::utils::validation::normalize_email;

/// Domain-level error types for auth operations
#[derive(Error, Debug)]
pub enum AuthServiceError {
    /// Attempted to create a user with an email that already exists
    #[error("Email already exists")]
    EmailAlreadyExists,

    /// Invalid login credentials provided.
    ///
    /// Deliberately covers both unknown email and wrong password so the
    /// response is not an account-existence oracle.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The requested role is unknown or not self-registerable
    #[error("Invalid role")]
    InvalidRole,

    /// The account has been banned
    #[error("Account is banned")]
    UserBanned,

    /// The account email has not been verified yet
    #[error("Email not verified")]
    EmailNotVerified,

    /// User with the specified identifier was not found
    #[error("User not found")]
    UserNotFound,

    /// No refresh token was presented
    #[error("Refresh token required")]
    RefreshTokenRequired,

    /// The refresh token is unknown, dead, expired, or malformed
    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    /// Verification code not found, wrong, expired, or already used
    #[error("Invalid verification code")]
    InvalidVerificationCode,

    /// Too many verification attempts against the active code
    #[error("Too many verification attempts")]
    TooManyAttempts,

    /// The password reset token is unknown or expired
    #[error("Invalid or expired reset token")]
    InvalidResetToken,

    /// Input validation failed with detailed error message
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Keyed-store operation failed
    #[error("Key-value store error: {0}")]
    KeyValue(#[from] redis::RedisError),

    /// Password hashing operation failed
    #[error("Password hashing error: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    /// Token signing or validation failed
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// Unexpected internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AuthServiceError> for AppError {
    fn from(err: AuthServiceError) -> Self {
        match err {
            AuthServiceError::EmailAlreadyExists => {
                AppError::Conflict("Email already exists".to_string())
            }
            AuthServiceError::InvalidCredentials => {
                AppError::Authentication("Invalid credentials".to_string())
            }
            AuthServiceError::InvalidRole => AppError::Validation("Invalid role".to_string()),
            AuthServiceError::UserBanned => AppError::Forbidden("Account is banned".to_string()),
            AuthServiceError::EmailNotVerified => {
                AppError::Forbidden("Email not verified".to_string())
            }
            AuthServiceError::UserNotFound => AppError::NotFound("User not found".to_string()),
            AuthServiceError::RefreshTokenRequired => {
                AppError::Validation("Refresh token required".to_string())
            }
            AuthServiceError::InvalidRefreshToken => {
                AppError::Authentication("Invalid refresh token".to_string())
            }
            AuthServiceError::InvalidVerificationCode => {
                AppError::Validation("Invalid verification code".to_string())
            }
            AuthServiceError::TooManyAttempts => {
                AppError::TooManyRequests("Too many verification attempts".to_string())
            }
            AuthServiceError::InvalidResetToken => {
                AppError::Authentication("Invalid or expired reset token".to_string())
            }
            AuthServiceError::Validation(msg) => AppError::Validation(msg),
            AuthServiceError::Database(e) => AppError::Database(e),
            AuthServiceError::KeyValue(e) => AppError::KeyValue(e),
            AuthServiceError::Hashing(e) => AppError::HashingError(e),
            AuthServiceError::Token(TokenError::Generation(msg)) => AppError::Internal(msg),
            AuthServiceError::Token(_) => {
                AppError::Authentication("Invalid token".to_string())
            }
            AuthServiceError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

/// Result type for auth service operations
pub type AuthResult<T> = Result<T, AuthServiceError>;

/// Core authentication service
#[derive(Clone)]
pub struct AuthService {
    users: UserStore,
    sessions: RefreshSessionStore,
    codes: VerificationCodeStore,
    resets: Option<PasswordResetStore>,
    tokens: TokenService,
    mailer: Option<Arc<dyn MailQueue>>,
    identity_sync: IdentitySyncDispatcher,
    model_profiles: Option<Arc<dyn ModelProfileRepository>>,
    employer_profiles: Option<Arc<dyn EmployerProfileRepository>>,
    verification_pepper: String,
    legacy_refresh_fallback: bool,
    dev_mode: bool,
    bcrypt_cost: u32,
}

impl AuthService {
    /// Create an auth service over the given pool and configuration.
    ///
    /// Optional collaborators (mailer, reset store, identity sync, profile
    /// repositories) are attached with the `with_*` builders.
    pub fn new(pool: PgPool, config: &AuthConfig) -> Self {
        let tokens = TokenService::with_ttls(
            config.jwt_secret.clone(),
            Duration::minutes(config.access_ttl_minutes),
            Duration::hours(config.refresh_ttl_hours),
        );

        Self {
            users: UserStore::new(pool.clone()),
            sessions: RefreshSessionStore::new(pool.clone()),
            codes: VerificationCodeStore::new(pool),
            resets: None,
            tokens,
            mailer: None,
            identity_sync: IdentitySyncDispatcher::disabled(),
            model_profiles: None,
            employer_profiles: None,
            verification_pepper: config.verification_pepper.clone(),
            legacy_refresh_fallback: config.legacy_refresh_fallback,
            dev_mode: config.dev_mode,
            bcrypt_cost: config.bcrypt_cost,
        }
    }

    /// Attach an outbound mail queue
    pub fn with_mailer(mut self, mailer: Arc<dyn MailQueue>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Attach the password reset store
    pub fn with_password_resets(mut self, resets: PasswordResetStore) -> Self {
        self.resets = Some(resets);
        self
    }

    /// Attach the identity sync dispatcher
    pub fn with_identity_sync(mut self, dispatcher: IdentitySyncDispatcher) -> Self {
        self.identity_sync = dispatcher;
        self
    }

    /// Attach the profile repositories used for auto-provisioning
    pub fn with_profile_repositories(
        mut self,
        model_profiles: Arc<dyn ModelProfileRepository>,
        employer_profiles: Arc<dyn EmployerProfileRepository>,
    ) -> Self {
        self.model_profiles = Some(model_profiles);
        self.employer_profiles = Some(employer_profiles);
        self
    }

    /// Register a new account.
    ///
    /// The account starts unverified; a verification code is queued for
    /// delivery, and the external identity sync is notified on a detached
    /// task that never affects the outcome.
    pub async fn register(&self, request: RegisterRequest) -> AuthResult<User> {
        request
            .validate()
            .map_err(|e| AuthServiceError::Validation(format!("Invalid registration: {}", e)))?;

        let role = UserRole::from_str(&request.role).map_err(|_| AuthServiceError::InvalidRole)?;
        if !role.is_registerable() {
            return Err(AuthServiceError::InvalidRole);
        }

        let email = normalize_email(&request.email);
        let password_hash = hash_password_with_cost(&request.password, self.bcrypt_cost)?;

        let user = self
            .users
            .create(&email, &password_hash, role)
            .await
            .map_err(|e| match e {
                CreateUserError::EmailTaken => AuthServiceError::EmailAlreadyExists,
                CreateUserError::Database(e) => {
                    error!("user insert failed for {}: {}", email, e);
                    AuthServiceError::Database(e)
                }
            })?;

        self.identity_sync.dispatch(IdentitySyncPayload {
            mwork_user_id: user.id,
            email: user.email.clone(),
            role: user.role,
        });

        // Best effort: the account exists either way and the code can be
        // re-requested, so a delivery failure must not fail registration.
        if let Err(e) = self.issue_verification_code(&user).await {
            warn!("could not queue verification code for {}: {}", user.email, e);
        }

        Ok(user.into())
    }

    /// Authenticate with email and password and issue a token pair.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    /// The ban check precedes the verification check, so a banned account is
    /// reported as banned regardless of verification state.
    pub async fn login(
        &self,
        request: LoginRequest,
        meta: ClientMeta,
    ) -> AuthResult<(User, TokenPair)> {
        request
            .validate()
            .map_err(|e| AuthServiceError::Validation(format!("Invalid login: {}", e)))?;

        let email = normalize_email(&request.email);
        let user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or(AuthServiceError::InvalidCredentials)?;

        if !verify_password(&request.password, &user.password_hash)? {
            return Err(AuthServiceError::InvalidCredentials);
        }

        if user.is_banned {
            return Err(AuthServiceError::UserBanned);
        }

        if !user.email_verified {
            return Err(AuthServiceError::EmailNotVerified);
        }

        self.ensure_profile(&user).await;

        let tokens = self.issue_session(&user, meta).await?;
        Ok((user.into(), tokens))
    }

    /// Rotate a refresh token: consume the presented token and issue a new
    /// access and refresh pair.
    ///
    /// Presenting a dead token (used, revoked, or expired) is treated as a
    /// theft signal and revokes every session of that user.
    pub async fn refresh(&self, raw_token: &str, meta: ClientMeta) -> AuthResult<TokenPair> {
        let raw_token = raw_token.trim();
        if raw_token.is_empty() {
            return Err(AuthServiceError::RefreshTokenRequired);
        }

        // Legacy self-contained refresh JWTs are only honored behind the
        // migration flag; otherwise any JWT-shaped token is rejected outright.
        let legacy_claims = if TokenService::looks_like_jwt(raw_token) {
            if !self.legacy_refresh_fallback {
                return Err(AuthServiceError::InvalidRefreshToken);
            }
            Some(
                self.tokens
                    .decode_legacy_refresh_token(raw_token)
                    .map_err(|_| AuthServiceError::InvalidRefreshToken)?,
            )
        } else {
            None
        };

        let token_hash = hash_refresh_token(raw_token);
        let session = self
            .sessions
            .get_by_token_hash(&token_hash)
            .await?
            .ok_or(AuthServiceError::InvalidRefreshToken)?;

        if let Some(claims) = &legacy_claims {
            let claims_match = claims.sub == session.user_id.to_string()
                && Uuid::parse_str(&claims.jti).map_or(false, |jti| jti == session.jti);
            if !claims_match {
                return self.reject_and_revoke_all(session.user_id).await;
            }
        }

        if !session.is_live() {
            return self.reject_and_revoke_all(session.user_id).await;
        }

        // Conditional state advance keeps rotation linearizable per token
        // hash: of N concurrent presentations exactly one marks the row.
        if !self.sessions.mark_used(&token_hash).await? {
            return self.reject_and_revoke_all(session.user_id).await;
        }

        let user = self
            .users
            .get_by_id(session.user_id)
            .await?
            .ok_or(AuthServiceError::InvalidRefreshToken)?;

        self.issue_session(&user, meta).await
    }

    /// Revoke the presented refresh token.
    ///
    /// An empty or unknown token is treated as already-logged-out.
    pub async fn logout(&self, raw_token: &str) -> AuthResult<()> {
        let raw_token = raw_token.trim();
        if raw_token.is_empty() {
            return Ok(());
        }

        let token_hash = hash_refresh_token(raw_token);
        self.sessions.revoke_by_token_hash(&token_hash).await?;
        Ok(())
    }

    /// Validate an access token and return the caller's auth context
    pub fn verify_access_token(&self, token: &str) -> AuthResult<AuthContext> {
        Ok(self.tokens.validate_access_token(token)?)
    }

    /// Generate and queue a fresh verification code for the account.
    ///
    /// Idempotent for verified accounts: returns `already_verified` without
    /// touching the code table.
    pub async fn request_verification_code(&self, email: &str) -> AuthResult<VerificationStatus> {
        let email = normalize_email(email);
        let user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or(AuthServiceError::UserNotFound)?;

        if user.email_verified {
            return Ok(VerificationStatus::AlreadyVerified);
        }

        self.issue_verification_code(&user).await?;
        Ok(VerificationStatus::Sent)
    }

    /// Confirm a verification code and mark the account verified.
    ///
    /// An unknown email is indistinguishable from a wrong code and causes no
    /// side effects; dead codes can never have their life extended.
    pub async fn confirm_verification_code(
        &self,
        request: ConfirmVerificationCodeRequest,
    ) -> AuthResult<(VerificationStatus, User)> {
        request
            .validate()
            .map_err(|e| AuthServiceError::Validation(format!("Invalid confirmation: {}", e)))?;

        let email = normalize_email(&request.email);
        let Some(user) = self.users.get_by_email(&email).await? else {
            // Nothing to increment for a nonexistent account.
            return Err(AuthServiceError::InvalidVerificationCode);
        };

        let code = self
            .codes
            .get_by_user(user.id)
            .await?
            .ok_or(AuthServiceError::InvalidVerificationCode)?;

        if code.attempts_exhausted() {
            self.codes.mark_used(user.id).await?;
            return Err(AuthServiceError::TooManyAttempts);
        }

        if code.is_used() || code.is_expired() {
            self.codes.mark_used(user.id).await?;
            return Err(AuthServiceError::InvalidVerificationCode);
        }

        let presented_hash = hash_verification_code(&request.code, &self.verification_pepper);
        if !constant_time_compare(&presented_hash, &code.code_hash) {
            // Live codes count every failure; the attempt that reaches the
            // ceiling invalidates the record on the spot.
            if let Some(attempts) = self.codes.increment_attempts(user.id).await? {
                if attempts >= MAX_CODE_ATTEMPTS {
                    self.codes.mark_used(user.id).await?;
                }
            }
            return Err(AuthServiceError::InvalidVerificationCode);
        }

        // Of concurrent confirmations of the same code, only the one that
        // flips the row wins.
        if !self.codes.mark_used(user.id).await? {
            return Err(AuthServiceError::InvalidVerificationCode);
        }

        let verified = self
            .users
            .mark_email_verified(user.id)
            .await?
            .ok_or(AuthServiceError::UserNotFound)?;

        self.queue_mail_best_effort(&verified.email, TEMPLATE_WELCOME, json!({}))
            .await;

        Ok((VerificationStatus::Verified, verified.into()))
    }

    /// Start a password reset.
    ///
    /// Never reveals whether the email exists: unknown addresses get the
    /// same silent success as known ones.
    pub async fn forgot_password(&self, request: ForgotPasswordRequest) -> AuthResult<()> {
        request
            .validate()
            .map_err(|e| AuthServiceError::Validation(format!("Invalid request: {}", e)))?;

        let resets = self.resets.as_ref().ok_or_else(|| {
            AuthServiceError::Internal("password reset store not configured".to_string())
        })?;

        let email = normalize_email(&request.email);
        let Some(user) = self.users.get_by_email(&email).await? else {
            debug!("password reset requested for unknown email");
            return Ok(());
        };

        let token = resets.create(user.id).await?;

        self.queue_mail(&user.email, TEMPLATE_PASSWORD_RESET, json!({ "token": token }))
            .await?;

        Ok(())
    }

    /// Complete a password reset with a single-use token.
    ///
    /// A successful change invalidates the token and revokes every refresh
    /// session of the user.
    pub async fn reset_password(&self, request: ResetPasswordRequest) -> AuthResult<()> {
        request
            .validate()
            .map_err(|e| AuthServiceError::Validation(format!("Invalid request: {}", e)))?;

        let resets = self.resets.as_ref().ok_or_else(|| {
            AuthServiceError::Internal("password reset store not configured".to_string())
        })?;

        let user_id = resets
            .lookup(&request.token)
            .await?
            .ok_or(AuthServiceError::InvalidResetToken)?;

        let password_hash = hash_password_with_cost(&request.new_password, self.bcrypt_cost)?;
        if !self.users.update_password(user_id, &password_hash).await? {
            return Err(AuthServiceError::UserNotFound);
        }

        self.sessions.revoke_all_by_user(user_id).await?;
        resets.invalidate(&request.token).await;

        Ok(())
    }

    /// Retention cleanup for expired refresh-session rows
    pub async fn cleanup_expired_sessions(&self) -> AuthResult<u64> {
        Ok(self.sessions.delete_expired().await?)
    }

    /// Issue an access and refresh pair and persist the refresh record
    async fn issue_session(
        &self,
        user: &UserWithPassword,
        meta: ClientMeta,
    ) -> AuthResult<TokenPair> {
        let access_token = self
            .tokens
            .issue_access_token(user.id, user.role, user.is_banned)?;
        let grant = self.tokens.issue_refresh_token();

        self.sessions
            .create(&NewRefreshSession {
                user_id: user.id,
                token_hash: hash_refresh_token(&grant.token),
                jti: grant.jti,
                expires_at: grant.expires_at,
                user_agent: meta.user_agent,
                ip_address: meta.ip_address,
            })
            .await
            .map_err(|e| {
                error!("refresh session insert failed for user {}: {}", user.id, e);
                AuthServiceError::Database(e)
            })?;

        Ok(TokenPair::new(
            access_token,
            grant.token,
            self.tokens.access_ttl_seconds(),
        ))
    }

    /// Generate, store, and queue a verification code for an unverified user
    async fn issue_verification_code(&self, user: &UserWithPassword) -> AuthResult<()> {
        let code = generate_numeric_code(6);
        let code_hash = hash_verification_code(&code, &self.verification_pepper);
        let expires_at = Utc::now() + Duration::minutes(CODE_TTL_MINUTES);

        self.codes.upsert(user.id, &code_hash, expires_at).await?;

        if self.dev_mode {
            // Local testing only; production configs keep this off.
            debug!("verification code for {}: {}", user.email, code);
        }

        self.queue_mail(
            &user.email,
            TEMPLATE_VERIFICATION_CODE,
            json!({ "code": code, "expires_minutes": CODE_TTL_MINUTES }),
        )
        .await
    }

    /// Revoke every session for the user and report an invalid token.
    ///
    /// Reuse of a dead token is treated as evidence of theft; killing the
    /// whole chain turns a silent compromise into a detectable logout.
    async fn reject_and_revoke_all<T>(&self, user_id: Uuid) -> AuthResult<T> {
        warn!("refresh token reuse detected for user {}, revoking all sessions", user_id);
        self.sessions.revoke_all_by_user(user_id).await?;
        Err(AuthServiceError::InvalidRefreshToken)
    }

    /// Provision the role-matching profile on first verified login.
    ///
    /// Failures are logged and never fatal to the login itself.
    async fn ensure_profile(&self, user: &UserWithPassword) {
        let result = match user.role {
            UserRole::Model => match &self.model_profiles {
                Some(repo) => match repo.get_by_user_id(user.id).await {
                    Ok(Some(_)) => Ok(()),
                    Ok(None) => repo.create(user.id).await,
                    Err(e) => Err(e),
                },
                None => return,
            },
            UserRole::Employer => match &self.employer_profiles {
                Some(repo) => match repo.get_by_user_id(user.id).await {
                    Ok(Some(_)) => Ok(()),
                    Ok(None) => repo.create(user.id).await,
                    Err(e) => Err(e),
                },
                None => return,
            },
            _ => return,
        };

        if let Err(e) = result {
            warn!("profile provisioning failed for user {}: {}", user.id, e);
        }
    }

    async fn queue_mail(
        &self,
        to: &str,
        template: &str,
        vars: serde_json::Value,
    ) -> AuthResult<()> {
        match &self.mailer {
            Some(mailer) => mailer
                .queue(to, template, &vars)
                .await
                .map_err(|e| AuthServiceError::Internal(format!("mail queue error: {}", e))),
            None => {
                warn!("mail queue not configured, dropping {} email", template);
                Ok(())
            }
        }
    }

    async fn queue_mail_best_effort(&self, to: &str, template: &str, vars: serde_json::Value) {
        if let Err(e) = self.queue_mail(to, template, vars).await {
            warn!("best-effort {} email failed: {}", template, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    // ============================================================================
    // Test doubles
    // ============================================================================

    /// Records queued mail instead of sending it, so tests can read back the
    /// verification codes that are otherwise only stored as hashes.
    #[derive(Default)]
    struct RecordingMailQueue {
        messages: Mutex<Vec<(String, String, serde_json::Value)>>,
    }

    impl RecordingMailQueue {
        fn last_code_for(&self, email: &str) -> Option<String> {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(to, template, _)| to == email && template == TEMPLATE_VERIFICATION_CODE)
                .and_then(|(_, _, vars)| vars["code"].as_str().map(str::to_string))
        }

        fn count_for(&self, email: &str, template: &str) -> usize {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .filter(|(to, t, _)| to == email && t == template)
                .count()
        }
    }

    #[async_trait]
    impl MailQueue for RecordingMailQueue {
        async fn queue(
            &self,
            to: &str,
            template: &str,
            vars: &serde_json::Value,
        ) -> crate::utils::error::AppResult<()> {
            self.messages
                .lock()
                .unwrap()
                .push((to.to_string(), template.to_string(), vars.clone()));
            Ok(())
        }
    }

    /// In-memory profile repository counting created rows
    #[derive(Default)]
    struct MemProfiles {
        created: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl ModelProfileRepository for MemProfiles {
        async fn create(&self, user_id: Uuid) -> anyhow::Result<()> {
            self.created.lock().unwrap().push(user_id);
            Ok(())
        }

        async fn get_by_user_id(&self, user_id: Uuid) -> anyhow::Result<Option<Uuid>> {
            let created = self.created.lock().unwrap();
            Ok(created.iter().find(|id| **id == user_id).copied())
        }
    }

    #[async_trait]
    impl EmployerProfileRepository for MemProfiles {
        async fn create(&self, user_id: Uuid) -> anyhow::Result<()> {
            self.created.lock().unwrap().push(user_id);
            Ok(())
        }

        async fn get_by_user_id(&self, user_id: Uuid) -> anyhow::Result<Option<Uuid>> {
            let created = self.created.lock().unwrap();
            Ok(created.iter().find(|id| **id == user_id).copied())
        }
    }

    // ============================================================================
    // Helpers
    // ============================================================================

    fn test_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test_signing_secret_key".to_string(),
            access_ttl_minutes: 15,
            refresh_ttl_hours: 168,
            verification_pepper: "test-pepper".to_string(),
            legacy_refresh_fallback: false,
            dev_mode: false,
            bcrypt_cost: 4, // keep test hashing fast
        }
    }

    fn build_service(pool: PgPool) -> (AuthService, Arc<RecordingMailQueue>) {
        let mailer = Arc::new(RecordingMailQueue::default());
        let service = AuthService::new(pool, &test_config()).with_mailer(mailer.clone());
        (service, mailer)
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "password123".to_string(),
            role: "model".to_string(),
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn confirm_request(email: &str, code: &str) -> ConfirmVerificationCodeRequest {
        ConfirmVerificationCodeRequest {
            email: email.to_string(),
            code: code.to_string(),
        }
    }

    /// Register and verify an account through the real code flow
    async fn register_verified(
        service: &AuthService,
        mailer: &RecordingMailQueue,
        email: &str,
    ) -> User {
        service.register(register_request(email)).await.unwrap();
        let code = mailer.last_code_for(email).unwrap();
        let (status, user) = service
            .confirm_verification_code(confirm_request(email, &code))
            .await
            .unwrap();
        assert_eq!(status, VerificationStatus::Verified);
        user
    }

    fn wrong_code(actual: &str) -> String {
        if actual == "000000" {
            "111111".to_string()
        } else {
            "000000".to_string()
        }
    }

    // ============================================================================
    // Registration
    // ============================================================================

    #[sqlx::test]
    async fn test_register_creates_unverified_user(pool: PgPool) {
        let (service, mailer) = build_service(pool);

        let user = service
            .register(register_request("user@example.com"))
            .await
            .unwrap();

        assert_eq!(user.email, "user@example.com");
        assert_eq!(user.role, UserRole::Model);
        assert!(!user.email_verified);
        assert!(!user.is_verified);
        assert!(!user.is_banned);
        // A verification code was queued for delivery
        assert!(mailer.last_code_for("user@example.com").is_some());
    }

    #[sqlx::test]
    async fn test_register_normalizes_email(pool: PgPool) {
        let (service, _) = build_service(pool);

        let user = service
            .register(register_request("  USER@Example.COM "))
            .await
            .unwrap();

        assert_eq!(user.email, "user@example.com");
    }

    #[sqlx::test]
    async fn test_register_duplicate_email(pool: PgPool) {
        let (service, _) = build_service(pool);

        service
            .register(register_request("user@example.com"))
            .await
            .unwrap();

        let result = service.register(register_request("user@example.com")).await;
        assert!(matches!(result, Err(AuthServiceError::EmailAlreadyExists)));

        // Same email, different case
        let result = service.register(register_request("USER@EXAMPLE.COM")).await;
        assert!(matches!(result, Err(AuthServiceError::EmailAlreadyExists)));
    }

    #[sqlx::test]
    async fn test_register_rejects_invalid_roles(pool: PgPool) {
        let (service, _) = build_service(pool);

        let mut request = register_request("admin@example.com");
        request.role = "admin".to_string();
        assert!(matches!(
            service.register(request).await,
            Err(AuthServiceError::InvalidRole)
        ));

        let mut request = register_request("other@example.com");
        request.role = "superuser".to_string();
        assert!(matches!(
            service.register(request).await,
            Err(AuthServiceError::InvalidRole)
        ));
    }

    // ============================================================================
    // Verification codes
    // ============================================================================

    #[sqlx::test]
    async fn test_confirm_with_correct_code_verifies(pool: PgPool) {
        let (service, mailer) = build_service(pool);

        service
            .register(register_request("user@example.com"))
            .await
            .unwrap();
        let code = mailer.last_code_for("user@example.com").unwrap();
        assert_eq!(code.len(), 6);

        let (status, user) = service
            .confirm_verification_code(confirm_request("user@example.com", &code))
            .await
            .unwrap();

        assert_eq!(status, VerificationStatus::Verified);
        assert!(user.email_verified);
        assert!(user.is_verified);
        // Welcome email queued best-effort
        assert_eq!(mailer.count_for("user@example.com", TEMPLATE_WELCOME), 1);
    }

    #[sqlx::test]
    async fn test_confirm_survives_a_few_wrong_attempts(pool: PgPool) {
        let (service, mailer) = build_service(pool);

        service
            .register(register_request("user@example.com"))
            .await
            .unwrap();
        let code = mailer.last_code_for("user@example.com").unwrap();
        let bad = wrong_code(&code);

        for _ in 0..3 {
            let result = service
                .confirm_verification_code(confirm_request("user@example.com", &bad))
                .await;
            assert!(matches!(
                result,
                Err(AuthServiceError::InvalidVerificationCode)
            ));
        }

        // Three failures leave the code confirmable
        let (status, _) = service
            .confirm_verification_code(confirm_request("user@example.com", &code))
            .await
            .unwrap();
        assert_eq!(status, VerificationStatus::Verified);
    }

    #[sqlx::test]
    async fn test_attempt_ceiling_invalidates_code(pool: PgPool) {
        let (service, mailer) = build_service(pool);

        service
            .register(register_request("user@example.com"))
            .await
            .unwrap();
        let code = mailer.last_code_for("user@example.com").unwrap();
        let bad = wrong_code(&code);

        // The fifth wrong attempt reaches the ceiling and invalidates
        for _ in 0..5 {
            let result = service
                .confirm_verification_code(confirm_request("user@example.com", &bad))
                .await;
            assert!(matches!(
                result,
                Err(AuthServiceError::InvalidVerificationCode)
            ));
        }

        // Even the correct code is rejected afterwards
        let result = service
            .confirm_verification_code(confirm_request("user@example.com", &code))
            .await;
        assert!(matches!(result, Err(AuthServiceError::TooManyAttempts)));

        // Requesting a new code resets the counter and works
        let status = service
            .request_verification_code("user@example.com")
            .await
            .unwrap();
        assert_eq!(status, VerificationStatus::Sent);

        let fresh = mailer.last_code_for("user@example.com").unwrap();
        let (status, _) = service
            .confirm_verification_code(confirm_request("user@example.com", &fresh))
            .await
            .unwrap();
        assert_eq!(status, VerificationStatus::Verified);
    }

    #[sqlx::test]
    async fn test_used_code_cannot_be_replayed(pool: PgPool) {
        let (service, mailer) = build_service(pool);

        service
            .register(register_request("user@example.com"))
            .await
            .unwrap();
        let code = mailer.last_code_for("user@example.com").unwrap();

        service
            .confirm_verification_code(confirm_request("user@example.com", &code))
            .await
            .unwrap();

        let result = service
            .confirm_verification_code(confirm_request("user@example.com", &code))
            .await;
        assert!(matches!(
            result,
            Err(AuthServiceError::InvalidVerificationCode)
        ));
    }

    #[sqlx::test]
    async fn test_expired_code_rejected_without_counting(pool: PgPool) {
        let (service, mailer) = build_service(pool.clone());

        let user = service
            .register(register_request("user@example.com"))
            .await
            .unwrap();
        let code = mailer.last_code_for("user@example.com").unwrap();

        sqlx::query(
            "UPDATE email_verification_codes SET expires_at = NOW() - INTERVAL '1 minute' \
             WHERE user_id = $1",
        )
        .bind(user.id)
        .execute(&pool)
        .await
        .unwrap();

        let result = service
            .confirm_verification_code(confirm_request("user@example.com", &code))
            .await;
        assert!(matches!(
            result,
            Err(AuthServiceError::InvalidVerificationCode)
        ));

        // Expired codes never increment attempts; the record was invalidated
        let (attempts, used): (i32, bool) = sqlx::query_as::<_, (i32, Option<chrono::DateTime<Utc>>)>(
            "SELECT attempts, used_at FROM email_verification_codes WHERE user_id = $1",
        )
        .bind(user.id)
        .fetch_one(&pool)
        .await
        .map(|(a, u)| (a, u.is_some()))
        .unwrap();
        assert_eq!(attempts, 0);
        assert!(used);
    }

    #[sqlx::test]
    async fn test_request_code_idempotent_for_verified_user(pool: PgPool) {
        let (service, mailer) = build_service(pool.clone());

        let user = register_verified(&service, &mailer, "user@example.com").await;
        let sent_before = mailer.count_for("user@example.com", TEMPLATE_VERIFICATION_CODE);

        let status = service
            .request_verification_code("user@example.com")
            .await
            .unwrap();
        assert_eq!(status, VerificationStatus::AlreadyVerified);

        // No new code was generated or queued
        assert_eq!(
            mailer.count_for("user@example.com", TEMPLATE_VERIFICATION_CODE),
            sent_before
        );
        let used: (bool,) = sqlx::query_as(
            "SELECT used_at IS NOT NULL FROM email_verification_codes WHERE user_id = $1",
        )
        .bind(user.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(used.0);
    }

    #[sqlx::test]
    async fn test_request_code_unknown_email(pool: PgPool) {
        let (service, _) = build_service(pool);

        let result = service.request_verification_code("ghost@example.com").await;
        assert!(matches!(result, Err(AuthServiceError::UserNotFound)));
    }

    #[sqlx::test]
    async fn test_confirm_unknown_email_is_silent(pool: PgPool) {
        let (service, mailer) = build_service(pool.clone());

        let user = service
            .register(register_request("real@example.com"))
            .await
            .unwrap();
        let code = mailer.last_code_for("real@example.com").unwrap();

        // Unknown email fails exactly like a wrong code
        let result = service
            .confirm_verification_code(confirm_request("ghost@example.com", "123456"))
            .await;
        assert!(matches!(
            result,
            Err(AuthServiceError::InvalidVerificationCode)
        ));

        // ...with zero attempt-counter side effects anywhere
        let attempts: (i32,) =
            sqlx::query_as("SELECT attempts FROM email_verification_codes WHERE user_id = $1")
                .bind(user.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(attempts.0, 0);

        // The real user's code still works
        let (status, _) = service
            .confirm_verification_code(confirm_request("real@example.com", &code))
            .await
            .unwrap();
        assert_eq!(status, VerificationStatus::Verified);
    }

    // ============================================================================
    // Login
    // ============================================================================

    #[sqlx::test]
    async fn test_login_unverified_user_blocked(pool: PgPool) {
        let (service, _) = build_service(pool);

        service
            .register(register_request("user@example.com"))
            .await
            .unwrap();

        let result = service
            .login(
                login_request("user@example.com", "password123"),
                ClientMeta::default(),
            )
            .await;
        assert!(matches!(result, Err(AuthServiceError::EmailNotVerified)));
    }

    #[sqlx::test]
    async fn test_login_wrong_password_and_unknown_email_look_alike(pool: PgPool) {
        let (service, mailer) = build_service(pool);

        register_verified(&service, &mailer, "user@example.com").await;

        let wrong_password = service
            .login(
                login_request("user@example.com", "not-the-password"),
                ClientMeta::default(),
            )
            .await;
        assert!(matches!(
            wrong_password,
            Err(AuthServiceError::InvalidCredentials)
        ));

        let unknown_email = service
            .login(
                login_request("ghost@example.com", "password123"),
                ClientMeta::default(),
            )
            .await;
        assert!(matches!(
            unknown_email,
            Err(AuthServiceError::InvalidCredentials)
        ));
    }

    #[sqlx::test]
    async fn test_login_banned_user_blocked_regardless_of_verification(pool: PgPool) {
        let (service, _) = build_service(pool.clone());

        // Still unverified, then banned
        let user = service
            .register(register_request("banned@example.com"))
            .await
            .unwrap();
        sqlx::query("UPDATE users SET is_banned = TRUE WHERE id = $1")
            .bind(user.id)
            .execute(&pool)
            .await
            .unwrap();

        let result = service
            .login(
                login_request("banned@example.com", "password123"),
                ClientMeta::default(),
            )
            .await;
        assert!(matches!(result, Err(AuthServiceError::UserBanned)));
    }

    #[sqlx::test]
    async fn test_login_success_issues_token_pair(pool: PgPool) {
        let (service, mailer) = build_service(pool);

        register_verified(&service, &mailer, "user@example.com").await;

        let (user, tokens) = service
            .login(
                login_request("user@example.com", "password123"),
                ClientMeta {
                    user_agent: Some("tests/1.0".to_string()),
                    ip_address: None,
                },
            )
            .await
            .unwrap();

        assert!(user.email_verified);
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_in, 900);
        assert_eq!(tokens.refresh_token.len(), 64);

        // The issued access token validates and carries the right identity
        let context = service.verify_access_token(&tokens.access_token).unwrap();
        assert_eq!(context.user_id, user.id);
        assert_eq!(context.role, UserRole::Model);
        assert!(!context.is_banned);
    }

    #[sqlx::test]
    async fn test_login_provisions_profile_once(pool: PgPool) {
        let mailer = Arc::new(RecordingMailQueue::default());
        let profiles = Arc::new(MemProfiles::default());
        let service = AuthService::new(pool, &test_config())
            .with_mailer(mailer.clone())
            .with_profile_repositories(profiles.clone(), Arc::new(MemProfiles::default()));

        let user = register_verified(&service, &mailer, "user@example.com").await;

        for _ in 0..2 {
            service
                .login(
                    login_request("user@example.com", "password123"),
                    ClientMeta::default(),
                )
                .await
                .unwrap();
        }

        let created = profiles.created.lock().unwrap().clone();
        assert_eq!(created, vec![user.id]);
    }

    // ============================================================================
    // Refresh rotation and revocation
    // ============================================================================

    #[sqlx::test]
    async fn test_empty_refresh_token_required(pool: PgPool) {
        let (service, _) = build_service(pool);

        let result = service.refresh("", ClientMeta::default()).await;
        assert!(matches!(result, Err(AuthServiceError::RefreshTokenRequired)));

        let result = service.refresh("   ", ClientMeta::default()).await;
        assert!(matches!(result, Err(AuthServiceError::RefreshTokenRequired)));
    }

    #[sqlx::test]
    async fn test_unknown_refresh_token_rejected(pool: PgPool) {
        let (service, _) = build_service(pool);

        let result = service
            .refresh(&"a".repeat(64), ClientMeta::default())
            .await;
        assert!(matches!(result, Err(AuthServiceError::InvalidRefreshToken)));
    }

    #[sqlx::test]
    async fn test_rotation_invalidates_predecessor(pool: PgPool) {
        let (service, mailer) = build_service(pool);

        register_verified(&service, &mailer, "user@example.com").await;
        let (_, tokens) = service
            .login(
                login_request("user@example.com", "password123"),
                ClientMeta::default(),
            )
            .await
            .unwrap();

        let rotated = service
            .refresh(&tokens.refresh_token, ClientMeta::default())
            .await
            .unwrap();
        assert_ne!(rotated.refresh_token, tokens.refresh_token);

        // Re-presenting the consumed token fails
        let result = service
            .refresh(&tokens.refresh_token, ClientMeta::default())
            .await;
        assert!(matches!(result, Err(AuthServiceError::InvalidRefreshToken)));
    }

    #[sqlx::test]
    async fn test_reuse_triggers_mass_revocation(pool: PgPool) {
        let (service, mailer) = build_service(pool);

        register_verified(&service, &mailer, "user@example.com").await;
        let (_, tokens_a) = service
            .login(
                login_request("user@example.com", "password123"),
                ClientMeta::default(),
            )
            .await
            .unwrap();

        let tokens_b = service
            .refresh(&tokens_a.refresh_token, ClientMeta::default())
            .await
            .unwrap();

        // Replaying A is a theft signal...
        let result = service
            .refresh(&tokens_a.refresh_token, ClientMeta::default())
            .await;
        assert!(matches!(result, Err(AuthServiceError::InvalidRefreshToken)));

        // ...which kills the whole chain: B no longer works either
        let result = service
            .refresh(&tokens_b.refresh_token, ClientMeta::default())
            .await;
        assert!(matches!(result, Err(AuthServiceError::InvalidRefreshToken)));
    }

    #[sqlx::test]
    async fn test_logout_is_terminal(pool: PgPool) {
        let (service, mailer) = build_service(pool);

        register_verified(&service, &mailer, "user@example.com").await;
        let (_, tokens) = service
            .login(
                login_request("user@example.com", "password123"),
                ClientMeta::default(),
            )
            .await
            .unwrap();

        service.logout(&tokens.refresh_token).await.unwrap();

        let result = service
            .refresh(&tokens.refresh_token, ClientMeta::default())
            .await;
        assert!(matches!(result, Err(AuthServiceError::InvalidRefreshToken)));
    }

    #[sqlx::test]
    async fn test_logout_tolerates_empty_and_unknown_tokens(pool: PgPool) {
        let (service, _) = build_service(pool);

        // Already-logged-out is not an error
        service.logout("").await.unwrap();
        service.logout(&"f".repeat(64)).await.unwrap();
    }

    #[sqlx::test]
    async fn test_expired_refresh_token_rejected(pool: PgPool) {
        let (service, mailer) = build_service(pool.clone());

        let user = register_verified(&service, &mailer, "user@example.com").await;
        let (_, tokens) = service
            .login(
                login_request("user@example.com", "password123"),
                ClientMeta::default(),
            )
            .await
            .unwrap();

        sqlx::query(
            "UPDATE refresh_sessions SET expires_at = NOW() - INTERVAL '1 hour' \
             WHERE user_id = $1",
        )
        .bind(user.id)
        .execute(&pool)
        .await
        .unwrap();

        let result = service
            .refresh(&tokens.refresh_token, ClientMeta::default())
            .await;
        assert!(matches!(result, Err(AuthServiceError::InvalidRefreshToken)));
    }

    #[sqlx::test]
    async fn test_legacy_shaped_token_rejected_when_fallback_disabled(pool: PgPool) {
        let (service, _) = build_service(pool);

        // Anything JWT-shaped is refused outright with the flag off
        let result = service
            .refresh("aaa.bbb.ccc", ClientMeta::default())
            .await;
        assert!(matches!(result, Err(AuthServiceError::InvalidRefreshToken)));
    }

    // ============================================================================
    // Example scenario
    // ============================================================================

    #[sqlx::test]
    async fn test_full_registration_to_login_scenario(pool: PgPool) {
        let (service, mailer) = build_service(pool);

        // Register as role model: user created unverified
        let user = service
            .register(RegisterRequest {
                email: "user@example.com".to_string(),
                password: "password123".to_string(),
                role: "model".to_string(),
            })
            .await
            .unwrap();
        assert!(!user.email_verified);

        // Login is gated until verification
        let gated = service
            .login(
                login_request("user@example.com", "password123"),
                ClientMeta::default(),
            )
            .await;
        assert!(matches!(gated, Err(AuthServiceError::EmailNotVerified)));

        // Request a code (one already queued by register; a fresh one is fine)
        let status = service
            .request_verification_code("user@example.com")
            .await
            .unwrap();
        assert_eq!(status, VerificationStatus::Sent);

        let code = mailer.last_code_for("user@example.com").unwrap();
        let bad = wrong_code(&code);

        // Three wrong attempts leave the code alive
        for _ in 0..3 {
            let result = service
                .confirm_verification_code(confirm_request("user@example.com", &bad))
                .await;
            assert!(result.is_err());
        }

        // Correct code verifies
        let (status, verified) = service
            .confirm_verification_code(confirm_request("user@example.com", &code))
            .await
            .unwrap();
        assert_eq!(status, VerificationStatus::Verified);
        assert!(verified.email_verified);

        // Login now succeeds with both tokens
        let (_, tokens) = service
            .login(
                login_request("user@example.com", "password123"),
                ClientMeta::default(),
            )
            .await
            .unwrap();
        assert!(!tokens.access_token.is_empty());
        assert_eq!(tokens.refresh_token.len(), 64);
    }
}

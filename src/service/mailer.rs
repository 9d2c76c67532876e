//! Mail Queue
//!
//! Outbound email as a capability: the auth core hands `(to, template, vars)`
//! to a `MailQueue` and never learns how delivery happens. The bundled
//! implementation renders embedded templates and sends over SMTP.

use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use log::info;
use tera::{Context, Tera};

use crate::utils::error::{AppError, AppResult};

/// Template name for the email verification code message
pub const TEMPLATE_VERIFICATION_CODE: &str = "verification_code";

/// Template name for the password reset message
pub const TEMPLATE_PASSWORD_RESET: &str = "password_reset";

/// Template name for the post-verification welcome message
pub const TEMPLATE_WELCOME: &str = "welcome";

/// Capability to queue an outbound email
#[async_trait]
pub trait MailQueue: Send + Sync {
    /// Queue a templated message to the recipient
    async fn queue(&self, to: &str, template: &str, vars: &serde_json::Value) -> AppResult<()>;
}

/// SMTP mailer configuration
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP username
    pub smtp_username: String,
    /// SMTP password
    pub smtp_password: String,
    /// From email address
    pub from_email: String,
    /// From name (display name)
    pub from_name: String,
}

impl MailerConfig {
    /// Create mailer configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            smtp_host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            smtp_port: std::env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse()
                .unwrap_or(587),
            smtp_username: std::env::var("SMTP_USERNAME")
                .map_err(|_| anyhow::anyhow!("SMTP_USERNAME environment variable is required"))?,
            smtp_password: std::env::var("SMTP_PASSWORD")
                .map_err(|_| anyhow::anyhow!("SMTP_PASSWORD environment variable is required"))?,
            from_email: std::env::var("FROM_EMAIL")
                .map_err(|_| anyhow::anyhow!("FROM_EMAIL environment variable is required"))?,
            from_name: std::env::var("FROM_NAME").unwrap_or_else(|_| "mwork".to_string()),
        })
    }
}

/// SMTP-backed mail queue with embedded plain-text templates
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    templates: Tera,
    config: MailerConfig,
}

impl SmtpMailer {
    /// Create a new SMTP mailer
    pub fn new(config: MailerConfig) -> AppResult<Self> {
        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| AppError::Configuration(format!("Failed to configure SMTP relay: {}", e)))?
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        let mut templates = Tera::default();
        Self::add_embedded_templates(&mut templates)?;

        Ok(Self {
            transport,
            templates,
            config,
        })
    }

    /// Add embedded email templates
    fn add_embedded_templates(tera: &mut Tera) -> AppResult<()> {
        let verification_txt = r#"Hello,

Your {{ app_name }} verification code is:

    {{ code }}

The code expires in {{ expires_minutes }} minutes. If you didn't create an
account, you can safely ignore this email.

The {{ app_name }} Team
"#;

        let password_reset_txt = r#"Hello,

We received a request to reset your {{ app_name }} password. Use the token
below within the next hour:

    {{ token }}

If you didn't request a reset, you can safely ignore this email; your
password has not changed.

The {{ app_name }} Team
"#;

        let welcome_txt = r#"Hello,

Your email address is verified and your {{ app_name }} account is ready.
You can now sign in and complete your profile.

The {{ app_name }} Team
"#;

        for (name, body) in [
            (TEMPLATE_VERIFICATION_CODE, verification_txt),
            (TEMPLATE_PASSWORD_RESET, password_reset_txt),
            (TEMPLATE_WELCOME, welcome_txt),
        ] {
            tera.add_raw_template(name, body)
                .map_err(|e| AppError::Configuration(format!("Failed to add template: {}", e)))?;
        }

        Ok(())
    }

    fn subject_for(template: &str) -> &'static str {
        match template {
            TEMPLATE_VERIFICATION_CODE => "Your verification code",
            TEMPLATE_PASSWORD_RESET => "Reset your password",
            TEMPLATE_WELCOME => "Welcome to mwork",
            _ => "Notification",
        }
    }
}

#[async_trait]
impl MailQueue for SmtpMailer {
    async fn queue(&self, to: &str, template: &str, vars: &serde_json::Value) -> AppResult<()> {
        info!("queueing {} email to {}", template, to);

        let mut context = Context::from_serialize(vars)
            .map_err(|e| AppError::Internal(format!("Failed to build template context: {}", e)))?;
        context.insert("app_name", &self.config.from_name);

        let body = self
            .templates
            .render(template, &context)
            .map_err(|e| AppError::Internal(format!("Failed to render template: {}", e)))?;

        let message = Message::builder()
            .from(
                format!("{} <{}>", self.config.from_name, self.config.from_email)
                    .parse()
                    .map_err(|e| AppError::Configuration(format!("Invalid from address: {}", e)))?,
            )
            .to(to
                .parse()
                .map_err(|e| AppError::Validation(format!("Invalid recipient address: {}", e)))?)
            .subject(Self::subject_for(template))
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AppError::Internal(format!("Failed to build message: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to send email: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_templates_render() {
        let mut tera = Tera::default();
        SmtpMailer::add_embedded_templates(&mut tera).unwrap();

        let mut context = Context::new();
        context.insert("app_name", "mwork");
        context.insert("code", "123456");
        context.insert("expires_minutes", &5);

        let rendered = tera.render(TEMPLATE_VERIFICATION_CODE, &context).unwrap();
        assert!(rendered.contains("123456"));
        assert!(rendered.contains("5 minutes"));

        context.insert("token", "abcdef");
        let rendered = tera.render(TEMPLATE_PASSWORD_RESET, &context).unwrap();
        assert!(rendered.contains("abcdef"));
    }

    #[test]
    fn test_subjects() {
        assert_eq!(
            SmtpMailer::subject_for(TEMPLATE_VERIFICATION_CODE),
            "Your verification code"
        );
        assert_eq!(
            SmtpMailer::subject_for(TEMPLATE_PASSWORD_RESET),
            "Reset your password"
        );
    }
}

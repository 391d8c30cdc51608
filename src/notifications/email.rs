//! Transactional email: account verification and password reset.
//!
//! Handlers build an [`EmailMessage`] with the render helpers below and hand
//! it to whatever [`EmailSender`] the app state carries. In production that
//! is [`SystemEmailService`], which talks SMTP through lettre.

use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::EmailConfig;

/// A rendered email ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<()>;
}

/// Why a verification link is being sent; only the greeting differs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationKind {
    /// First registration
    Welcome,
    /// Someone registered again with an unverified address
    Reregistration,
    /// Explicit resend request
    Reminder,
}

impl VerificationKind {
    fn heading(&self) -> &'static str {
        match self {
            VerificationKind::Welcome => "Welcome to DealDrop!",
            VerificationKind::Reregistration => "Email Verification Required",
            VerificationKind::Reminder => "Verification Reminder",
        }
    }

    fn intro(&self) -> &'static str {
        match self {
            VerificationKind::Welcome => "Please click the button below to verify your email address:",
            VerificationKind::Reregistration => {
                "It seems you previously tried to register with this email but haven't verified it yet. Please click the button below to verify your email address and activate your account:"
            }
            VerificationKind::Reminder => {
                "You requested a new verification link for your DealDrop account. Please click the button below to verify your email address:"
            }
        }
    }
}

/// Render the verification email
pub fn verification_email(
    to: &str,
    verify_url: &str,
    ttl_hours: i64,
    kind: VerificationKind,
) -> EmailMessage {
    let html = render_action_html(
        kind.heading(),
        kind.intro(),
        verify_url,
        "Verify Email",
        "#007bff",
        &format!("This link will expire in {} hours.", ttl_hours),
    );
    let text = format!(
        "{}\n\n{}\n\n{}\n\nThis link will expire in {} hours.",
        kind.heading(),
        kind.intro(),
        verify_url,
        ttl_hours
    );

    EmailMessage {
        to: to.to_string(),
        subject: "Email Verification - DealDrop".to_string(),
        html,
        text,
    }
}

/// Render the password reset email
pub fn password_reset_email(to: &str, reset_url: &str, ttl_minutes: i64) -> EmailMessage {
    let intro = "You requested a password reset for your DealDrop account. Please click the button below to reset your password:";
    let footer = format!(
        "This link will expire in {} minutes. If you didn't request this, please ignore this email.",
        ttl_minutes
    );

    EmailMessage {
        to: to.to_string(),
        subject: "Password Reset - DealDrop".to_string(),
        html: render_action_html(
            "Password Reset Request",
            intro,
            reset_url,
            "Reset Password",
            "#dc3545",
            &footer,
        ),
        text: format!("Password Reset Request\n\n{}\n\n{}\n\n{}", intro, reset_url, footer),
    }
}

/// One heading, one paragraph, one button, and the raw link as a fallback
fn render_action_html(
    heading: &str,
    intro: &str,
    url: &str,
    button: &str,
    color: &str,
    footer: &str,
) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{heading}</title>
</head>
<body style="font-family: Arial, sans-serif; background-color: #f5f5f5; margin: 0; padding: 0;">
    <div style="max-width: 600px; margin: 0 auto; padding: 32px 20px; background-color: #ffffff;">
        <h2>{heading}</h2>
        <p>{intro}</p>
        <p><a href="{url}" style="background-color: {color}; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px; display: inline-block;">{button}</a></p>
        <p>If the button doesn't work, copy and paste this link into your browser:</p>
        <p>{url}</p>
        <p style="color: #6b7280; font-size: 13px;">{footer}</p>
    </div>
</body>
</html>"#,
        heading = html_escape(heading),
        intro = html_escape(intro),
        url = html_escape(url),
        button = button,
        color = color,
        footer = html_escape(footer),
    )
}

/// Escape HTML special characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// SMTP-backed sender using the `[email]` config section
pub struct SystemEmailService {
    config: EmailConfig,
}

impl SystemEmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Check if email sending is configured
    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }
}

#[async_trait]
impl EmailSender for SystemEmailService {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!(
                to = %message.to,
                subject = %message.subject,
                "Email not configured, skipping"
            );
            return Ok(());
        }

        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from: Mailbox = format!("{} <{}>", self.config.from_name, from_address).parse()?;
        let to: Mailbox = message.to.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(message.text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(message.html),
                    ),
            )?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "Email sent successfully"
        );

        Ok(())
    }
}

use crate::config::EmailConfig;
use crate::database::models::{Site, User};
use crate::errors::{ServiceError, ServiceResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::str::FromStr;

/// A rendered message ready for delivery.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to_email: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html_content: String,
    pub text_content: String,
}

/// Outbound mail transport used by the workflows.
///
/// Delivery is synchronous with the request: an `Err` means the message was
/// not handed over and the caller reports it.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> ServiceResult<()>;
}

pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    config: EmailConfig,
}

impl EmailService {
    /// Creates a new EmailService instance
    pub fn new(config: EmailConfig) -> ServiceResult<Self> {
        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| ServiceError::external_service(format!("Invalid SMTP host: {e}")))?
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        Ok(Self { mailer, config })
    }
}

#[async_trait]
impl Mailer for EmailService {
    async fn send(&self, email: OutgoingEmail) -> ServiceResult<()> {
        let from_mailbox = Mailbox::from_str(&format!(
            "{} <{}>",
            self.config.from_name, self.config.from_email
        ))
        .map_err(|e| ServiceError::external_service(format!("Invalid from email: {e}")))?;

        let to_address = match &email.to_name {
            Some(name) => format!("{} <{}>", name, email.to_email),
            None => email.to_email.clone(),
        };
        let to_mailbox = Mailbox::from_str(&to_address)
            .or_else(|_| Mailbox::from_str(&email.to_email))
            .map_err(|e| ServiceError::external_service(format!("Invalid recipient email: {e}")))?;

        let message = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(email.subject)
            .multipart(
                lettre::message::MultiPart::alternative()
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text_content),
                    )
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html_content),
                    ),
            )
            .map_err(|e| ServiceError::external_service(format!("Failed to build email: {e}")))?;

        self.mailer
            .send(message)
            .await
            .map_err(|e| ServiceError::external_service(format!("Failed to send email: {e}")))?;

        Ok(())
    }
}

/// Stand-in used when no SMTP server is configured. Every send fails.
pub struct UnconfiguredMailer;

#[async_trait]
impl Mailer for UnconfiguredMailer {
    async fn send(&self, email: OutgoingEmail) -> ServiceResult<()> {
        tracing::warn!(
            "Email service not configured. Email \"{}\" not sent to {}",
            email.subject,
            email.to_email
        );
        Err(ServiceError::external_service(
            "Email service is not configured",
        ))
    }
}

/// Installation details interpolated into every message.
#[derive(Debug, Clone, Copy)]
pub struct MessageContext<'a> {
    pub base_url: &'a str,
    pub installation_title: &'a str,
    pub site: Option<&'a Site>,
}

impl MessageContext<'_> {
    fn site_title(&self) -> &str {
        self.site
            .map(|site| site.title.as_str())
            .unwrap_or(self.installation_title)
    }

    fn link(&self, path: &str, token: &str) -> String {
        format!("{}/guest/{}?token={}", self.base_url, path, token)
    }
}

/// Escapes text interpolated into HTML bodies.
fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Registration confirmation. Without a token the address is already
/// trusted and the message is a plain welcome.
pub fn confirm_email_message(
    ctx: MessageContext<'_>,
    user: &User,
    token: Option<&str>,
) -> OutgoingEmail {
    let site_title = ctx.site_title();
    let subject = format!("Your registration on {site_title}");

    let (html_action, text_action) = match token {
        Some(token) => {
            let url = ctx.link("confirm", token);
            (
                format!(
                    r#"<p>Confirm your email address by following this link:</p>
                    <p><a href="{url}">{url}</a></p>"#
                ),
                format!("Confirm your email address by following this link:\n{url}"),
            )
        }
        None => (
            "<p>Your account is ready.</p>".to_string(),
            "Your account is ready.".to_string(),
        ),
    };

    let html_content = format!(
        r#"<!DOCTYPE html>
        <html>
        <body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
            <p>Hi {name},</p>
            <p>Thanks for joining {title} with the email {email}.</p>
            {html_action}
        </body>
        </html>"#,
        name = escape_html(&user.name),
        title = escape_html(site_title),
        email = escape_html(&user.email),
    );

    let text_content = format!(
        "Hi {},\n\nThanks for joining {} with the email {}.\n\n{}\n",
        user.name, site_title, user.email, text_action
    );

    OutgoingEmail {
        to_email: user.email.clone(),
        to_name: Some(user.name.clone()),
        subject,
        html_content,
        text_content,
    }
}

/// Sent to the new address when a user asks to change their email.
pub fn update_email_message(
    ctx: MessageContext<'_>,
    user: &User,
    new_email: &str,
    token: &str,
) -> OutgoingEmail {
    let site_title = ctx.site_title();
    let url = ctx.link("validate-email", token);
    let subject = format!("Update email on {site_title}");

    let html_content = format!(
        r#"<!DOCTYPE html>
        <html>
        <body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
            <p>Hi {name},</p>
            <p>You asked to use {new_email} as your email on {title}.</p>
            <p>Confirm it by following this link: <a href="{url}">{url}</a></p>
            <p style="font-size: 12px; color: #7f8c8d;">If you did not ask for this change, you can ignore this email.</p>
        </body>
        </html>"#,
        name = escape_html(&user.name),
        new_email = escape_html(new_email),
        title = escape_html(site_title),
    );

    let text_content = format!(
        "Hi {},\n\nYou asked to use {} as your email on {}.\n\nConfirm it by following this link:\n{}\n\nIf you did not ask for this change, you can ignore this email.\n",
        user.name, new_email, site_title, url
    );

    OutgoingEmail {
        to_email: new_email.to_string(),
        to_name: Some(user.name.clone()),
        subject,
        html_content,
        text_content,
    }
}

/// Carries the raw reset code and its expiry.
pub fn reset_code_message(
    ctx: MessageContext<'_>,
    user: &User,
    code: &str,
    expires_at: DateTime<Utc>,
) -> OutgoingEmail {
    let title = ctx.installation_title;
    let date = expires_at.format("%Y-%m-%d %H:%M:%S UTC");
    let subject = format!("User token for {title}");

    let text_content = format!(
        "Greetings!\n\nTo reset your password on {title}, fill this token in the app: {code}.\n\nYour token will expire on {date}.\n"
    );
    let html_content = format!(
        r#"<!DOCTYPE html>
        <html>
        <body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
            <p>Greetings!</p>
            <p>To reset your password on {html_title}, fill this token in the app: <strong>{code}</strong>.</p>
            <p>Your token will expire on {date}.</p>
        </body>
        </html>"#,
        html_title = escape_html(title),
    );

    OutgoingEmail {
        to_email: user.email.clone(),
        to_name: Some(user.name.clone()),
        subject,
        html_content,
        text_content,
    }
}

/// Operator notice of a new registration.
pub fn registration_notice_message(
    ctx: MessageContext<'_>,
    user: &User,
    operator_email: &str,
) -> OutgoingEmail {
    let text_content = format!(
        "A new user is registering: {} ({}/users/{}).\n",
        user.email, ctx.base_url, user.id
    );

    OutgoingEmail {
        to_email: operator_email.to_string(),
        to_name: None,
        subject: format!("[{}] New registration", ctx.installation_title),
        html_content: format!("<p>{}</p>", escape_html(text_content.trim_end())),
        text_content,
    }
}

//! Central module for application-wide configuration settings.
//!
//! This module handles loading and managing configuration parameters such as
//! database URLs, server port, SMTP settings and the guest registration
//! policy that drives the account workflows.

use anyhow::{Context, Result, anyhow};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub jwt_secret: String,
    pub jwt_expires_in_seconds: u64,
    pub server_port: u16,
    /// Public URL used to build confirmation links in emails.
    pub base_url: String,
    pub installation_title: String,
    pub email: Option<EmailConfig>,
    pub guest: GuestPolicy,
}

/// SMTP settings for outgoing mail.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_email: String,
    pub from_name: String,
}

/// How self-registered accounts become usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationMode {
    /// Accounts are active as soon as the email is confirmed.
    Open,
    /// Accounts wait for an operator after confirmation.
    Moderate,
    /// Registration is refused.
    Closed,
}

impl FromStr for RegistrationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(RegistrationMode::Open),
            "moderate" => Ok(RegistrationMode::Moderate),
            "closed" => Ok(RegistrationMode::Closed),
            other => Err(anyhow!("Invalid registration mode: {}", other)),
        }
    }
}

/// Operator settings for the guest account tier.
#[derive(Debug, Clone)]
pub struct GuestPolicy {
    pub mode: RegistrationMode,
    /// Skip the confirmation token: the submitted email is trusted.
    pub email_is_valid: bool,
    /// Registration must name an existing site.
    pub register_site: bool,
    /// Site slugs granted to every new account when no site is requested.
    pub default_sites: Vec<String>,
    /// Operators notified of each registration.
    pub notify_register: Vec<String>,
    /// Allowed CORS origins, `*` allows any.
    pub cors_origins: Vec<String>,
    pub login_roles: Vec<String>,
    /// Open a cookie session on login in addition to the session credential.
    pub login_session: bool,
    pub message_confirm_register: Option<String>,
    /// Delay applied before answering security-sensitive failures.
    pub security_delay: Duration,
    /// Enables the companion username records.
    pub usernames: bool,
}

impl Default for GuestPolicy {
    fn default() -> Self {
        Self {
            mode: RegistrationMode::Moderate,
            email_is_valid: false,
            register_site: false,
            default_sites: Vec::new(),
            notify_register: Vec::new(),
            cors_origins: vec!["*".to_string()],
            login_roles: vec!["guest".to_string()],
            login_session: true,
            message_confirm_register: None,
            security_delay: Duration::from_millis(1000),
            usernames: false,
        }
    }
}

impl GuestPolicy {
    pub fn is_open(&self) -> bool {
        self.mode == RegistrationMode::Open
    }

    /// Loads the guest policy from `GUEST_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let mode = match env::var("GUEST_OPEN") {
            Ok(value) => value.parse::<RegistrationMode>()?,
            Err(_) => defaults.mode,
        };

        let security_delay = env::var("GUEST_SECURITY_DELAY_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse::<u64>()
            .context("GUEST_SECURITY_DELAY_MS must be a valid number")?;

        let cors_origins = split_list(env::var("GUEST_CORS").ok());
        let login_roles = split_list(env::var("GUEST_LOGIN_ROLES").ok());

        Ok(GuestPolicy {
            mode,
            email_is_valid: env_flag("GUEST_REGISTER_EMAIL_IS_VALID", false)?,
            register_site: env_flag("GUEST_REGISTER_SITE", false)?,
            default_sites: split_list(env::var("GUEST_DEFAULT_SITES").ok()),
            notify_register: split_list(env::var("GUEST_NOTIFY_REGISTER").ok()),
            cors_origins: if cors_origins.is_empty() {
                defaults.cors_origins
            } else {
                cors_origins
            },
            login_roles: if login_roles.is_empty() {
                defaults.login_roles
            } else {
                login_roles
            },
            login_session: env_flag("GUEST_LOGIN_SESSION", true)?,
            message_confirm_register: env::var("GUEST_MESSAGE_CONFIRM_REGISTER")
                .ok()
                .filter(|message| !message.trim().is_empty()),
            security_delay: Duration::from_millis(security_delay),
            usernames: env_flag("GUEST_USERNAMES", false)?,
        })
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL not set")?;

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u32>()
            .context("DB_MAX_CONNECTIONS must be a valid number")?;

        let acquire_timeout_seconds = env::var("DB_ACQUIRE_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u64>()
            .context("DB_ACQUIRE_TIMEOUT_SECONDS must be a valid number")?;

        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET not set")?;

        let jwt_expires_in_seconds = env::var("JWT_EXPIRES_IN_SECONDS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse::<u64>()
            .context("JWT_EXPIRES_IN_SECONDS must be a valid number")?;

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("SERVER_PORT must be a valid number")?;

        let base_url = env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", server_port))
            .trim_end_matches('/')
            .to_string();

        let installation_title =
            env::var("INSTALLATION_TITLE").unwrap_or_else(|_| "Guest".to_string());

        Ok(Config {
            database_url,
            max_connections,
            acquire_timeout_seconds,
            jwt_secret,
            jwt_expires_in_seconds,
            server_port,
            base_url,
            installation_title,
            email: Self::email_from_env()?,
            guest: GuestPolicy::from_env()?,
        })
    }

    /// SMTP settings, present only when `SMTP_HOST` is set.
    fn email_from_env() -> Result<Option<EmailConfig>> {
        let Ok(smtp_host) = env::var("SMTP_HOST") else {
            return Ok(None);
        };

        let smtp_port = env::var("SMTP_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse::<u16>()
            .context("SMTP_PORT must be a valid number")?;

        Ok(Some(EmailConfig {
            smtp_host,
            smtp_port,
            smtp_username: env::var("SMTP_USERNAME").unwrap_or_default(),
            smtp_password: env::var("SMTP_PASSWORD").unwrap_or_default(),
            from_email: env::var("FROM_EMAIL").context("FROM_EMAIL not set")?,
            from_name: env::var("FROM_NAME").unwrap_or_else(|_| "Guest".to_string()),
        }))
    }

    pub fn email_config(&self) -> Option<EmailConfig> {
        self.email.clone()
    }
}

#[cfg(test)]
impl Config {
    /// In-memory settings for service and router tests.
    pub fn for_tests(guest: GuestPolicy) -> Self {
        Config {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            acquire_timeout_seconds: 3,
            jwt_secret: "test-secret".to_string(),
            jwt_expires_in_seconds: 3600,
            server_port: 3000,
            base_url: "https://library.example".to_string(),
            installation_title: "Library".to_string(),
            email: None,
            guest,
        }
    }
}

fn env_flag(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(value) => parse_flag(&value).with_context(|| format!("{} must be a boolean", name)),
        Err(_) => Ok(default),
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(anyhow!("invalid flag value '{}'", other)),
    }
}

/// Splits a comma separated setting, dropping blanks.
fn split_list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_mode_parsing() {
        assert_eq!(
            "open".parse::<RegistrationMode>().unwrap(),
            RegistrationMode::Open
        );
        assert_eq!(
            " Moderate ".parse::<RegistrationMode>().unwrap(),
            RegistrationMode::Moderate
        );
        assert_eq!(
            "closed".parse::<RegistrationMode>().unwrap(),
            RegistrationMode::Closed
        );
        assert!("sometimes".parse::<RegistrationMode>().is_err());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list(Some("https://a.example, ,https://b.example".to_string())),
            vec!["https://a.example", "https://b.example"]
        );
        assert!(split_list(None).is_empty());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true").unwrap());
        assert!(parse_flag("1").unwrap());
        assert!(!parse_flag("off").unwrap());
        assert!(parse_flag("maybe").is_err());
    }

    #[test]
    fn test_default_policy_is_moderated() {
        let policy = GuestPolicy::default();
        assert!(!policy.is_open());
        assert_eq!(policy.cors_origins, vec!["*"]);
        assert_eq!(policy.login_roles, vec!["guest"]);
    }
}

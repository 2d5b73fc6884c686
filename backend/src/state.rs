//! Shared application state handed to every handler.

use crate::config::{Config, GuestPolicy};
use crate::database::models::Site;
use crate::services::email_service::{EmailService, Mailer, MessageContext, UnconfiguredMailer};
use crate::services::usernames::{NoUsernames, SqliteUsernames, UsernameRegistry};
use crate::utils::jwt::JwtUtils;
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub mailer: Arc<dyn Mailer>,
    pub usernames: Arc<dyn UsernameRegistry>,
    pub jwt: JwtUtils,
}

impl AppState {
    /// Wires the collaborators selected by the configuration.
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        let mailer: Arc<dyn Mailer> = match config.email_config() {
            Some(email_config) => match EmailService::new(email_config) {
                Ok(service) => {
                    tracing::info!("Email service initialized successfully");
                    Arc::new(service)
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to initialize email service: {}. Emails will not be sent.",
                        e
                    );
                    Arc::new(UnconfiguredMailer)
                }
            },
            None => {
                tracing::warn!("Email configuration not found. Emails will not be sent.");
                Arc::new(UnconfiguredMailer)
            }
        };

        let usernames: Arc<dyn UsernameRegistry> = if config.guest.usernames {
            Arc::new(SqliteUsernames::new(pool.clone()))
        } else {
            Arc::new(NoUsernames)
        };

        let jwt = JwtUtils::new(&config.jwt_secret, config.jwt_expires_in_seconds);

        Self {
            pool,
            config: Arc::new(config),
            mailer,
            usernames,
            jwt,
        }
    }

    pub fn policy(&self) -> &GuestPolicy {
        &self.config.guest
    }

    pub fn message_context<'a>(&'a self, site: Option<&'a Site>) -> MessageContext<'a> {
        MessageContext {
            base_url: &self.config.base_url,
            installation_title: &self.config.installation_title,
            site,
        }
    }

    /// Slows down answers to guessable failures.
    pub async fn security_delay(&self) {
        tokio::time::sleep(self.config.guest.security_delay).await;
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::database::test_pool;
    use crate::services::email_service::testing::RecordingMailer;
    use std::time::Duration;

    /// Default policy without the security delay.
    pub fn test_policy() -> GuestPolicy {
        GuestPolicy {
            security_delay: Duration::ZERO,
            ..GuestPolicy::default()
        }
    }

    /// Fresh database, recording mailer and the given policy.
    pub async fn test_state(policy: GuestPolicy) -> (AppState, Arc<RecordingMailer>) {
        let pool = test_pool().await;
        let mailer = Arc::new(RecordingMailer::default());
        let mut state = AppState::new(pool, Config::for_tests(policy));
        state.mailer = mailer.clone();
        (state, mailer)
    }
}

//! Self-service registration of guest accounts.
//!
//! Creates a pending account, issues a confirmation token and sends the
//! confirmation email. Partial results are kept: if the email cannot be
//! sent the account stays in place.

use crate::config::RegistrationMode;
use crate::database::models::{
    CreateUser, ROLE_GUEST, RegisterRequest, SITE_ROLE_VIEWER, Site, User,
};
use crate::errors::{ServiceError, ServiceResult, is_unique_violation};
use crate::repositories::site_repository::SiteRepository;
use crate::repositories::user_repository::UserRepository;
use crate::repositories::user_setting_repository::UserSettingRepository;
use crate::services::email_service::{confirm_email_message, registration_notice_message};
use crate::services::token_store::TokenStore;
use crate::state::AppState;
use crate::utils::password::{hash_password, validate_new_password};
use crate::utils::{is_valid_email, non_blank};
use serde_json::Value;
use std::collections::HashMap;

/// Setting recording the site an account registered on.
pub const GUEST_SITE_SETTING: &str = "guest_site";

#[derive(Debug)]
pub struct Registration {
    pub user: User,
    pub message: String,
}

pub struct RegistrationService<'a> {
    state: &'a AppState,
}

impl<'a> RegistrationService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Registers a new guest account.
    ///
    /// # Arguments
    /// * `request` - Submitted registration data
    /// * `caller` - Identity of the current request, if any
    ///
    /// # Errors
    /// Returns `ServiceError` for:
    /// - Closed registration or an already logged caller
    /// - Missing or invalid email, missing or unknown site
    /// - An email that is already registered or waiting for confirmation
    /// - Email delivery failures, after the account was created
    pub async fn register(
        &self,
        request: RegisterRequest,
        caller: Option<&User>,
    ) -> ServiceResult<Registration> {
        let policy = self.state.policy();

        if policy.mode == RegistrationMode::Closed {
            return Err(ServiceError::permission_denied("Access forbidden."));
        }

        if caller.is_some() {
            return Err(ServiceError::validation(
                "user",
                "User cannot register: already logged.",
            ));
        }

        let email = non_blank(request.email.as_ref())
            .ok_or_else(|| ServiceError::validation("email", "Email is required."))?
            .to_string();
        if !is_valid_email(&email) {
            return Err(ServiceError::validation("email", "Invalid email."));
        }

        let site = if policy.register_site {
            Some(self.required_site(request.site.as_ref()).await?)
        } else {
            None
        };

        self.check_not_registered(&email).await?;

        let handle = self
            .state
            .usernames
            .validate(non_blank(request.handle.as_ref()))
            .await?;

        let password_hash = match non_blank(request.password.as_ref()) {
            Some(password) => {
                validate_new_password("password", password)?;
                Some(hash_password(password)?)
            }
            None => None,
        };

        let name = non_blank(request.username.as_ref())
            .unwrap_or(email.as_str())
            .to_string();

        let user = self
            .create_account(
                CreateUser {
                    email: email.clone(),
                    name,
                    role: ROLE_GUEST.to_string(),
                    is_active: policy.is_open(),
                    password_hash,
                },
                handle.as_deref(),
            )
            .await?;

        tracing::info!("Guest account {} registered for {}", user.id, user.email);

        self.apply_settings(&user, &request.settings, site.as_ref())
            .await?;
        self.notify_operators(&user, site.as_ref()).await?;

        let token = if policy.email_is_valid {
            None
        } else {
            Some(TokenStore::new(&self.state.pool).issue(&email, &user).await?)
        };

        let message = confirm_email_message(
            self.state.message_context(site.as_ref()),
            &user,
            token.as_ref().map(|token| token.token.as_str()),
        );
        if let Err(e) = self.state.mailer.send(message).await {
            tracing::error!(
                "Failed to send confirmation email to {}: {}",
                user.email,
                e
            );
            return Err(ServiceError::external_service(
                "An error occurred when the email was sent.",
            ));
        }

        Ok(Registration {
            message: self.success_message(),
            user,
        })
    }

    async fn required_site(&self, reference: Option<&String>) -> ServiceResult<Site> {
        let reference = non_blank(reference)
            .ok_or_else(|| ServiceError::validation("site", "A site is required to register."))?;

        SiteRepository::new(&self.state.pool)
            .find_site(reference)
            .await?
            .ok_or_else(|| ServiceError::validation("site", "The site doesn’t exist."))
    }

    /// Rejects an email that already belongs to an account.
    async fn check_not_registered(&self, email: &str) -> ServiceResult<()> {
        if !UserRepository::new(&self.state.pool)
            .email_exists(email)
            .await?
        {
            return Ok(());
        }

        let tokens = TokenStore::new(&self.state.pool);
        let pending = tokens.has_pending(email).await?;

        if pending && self.state.policy().email_is_valid {
            // The policy changed since the first attempt: the address is now trusted.
            tokens.confirm_all_for_email(email).await?;
            tracing::info!("Pending tokens for {} confirmed on resubmission", email);
        } else if pending {
            return Err(ServiceError::validation(
                "user",
                "Check your email to confirm your registration.",
            ));
        }

        Err(ServiceError::conflict("user", "Already registered."))
    }

    /// Creates the account row and its companion username.
    ///
    /// Once the row exists the account counts as created, even when the
    /// username record fails.
    async fn create_account(&self, create: CreateUser, handle: Option<&str>) -> ServiceResult<User> {
        let user_repo = UserRepository::new(&self.state.pool);
        let email = create.email.clone();

        let user = user_repo.create_user(create).await.map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::conflict("user", "Already registered.")
            } else {
                ServiceError::from(e)
            }
        })?;

        let Some(handle) = handle else {
            return Ok(user);
        };

        match self.state.usernames.record(&user, handle).await {
            Ok(()) => Ok(user),
            Err(e) => {
                tracing::error!(
                    "An error occurred after creation of the guest user {}: {}",
                    user.id,
                    e
                );
                user_repo.get_user_by_email(&email).await?.ok_or_else(|| {
                    ServiceError::internal_error("Unknown error during creation of user.")
                })
            }
        }
    }

    async fn apply_settings(
        &self,
        user: &User,
        settings: &HashMap<String, Value>,
        site: Option<&Site>,
    ) -> ServiceResult<()> {
        let setting_repo = UserSettingRepository::new(&self.state.pool);
        let site_repo = SiteRepository::new(&self.state.pool);

        for (key, value) in settings {
            setting_repo.set(&user.id, key, value).await?;
        }

        match site {
            Some(site) => {
                site_repo
                    .grant_permission(site.id, &user.id, SITE_ROLE_VIEWER)
                    .await?;
                setting_repo
                    .set(&user.id, GUEST_SITE_SETTING, &Value::from(site.id))
                    .await?;
            }
            None => {
                for slug in &self.state.policy().default_sites {
                    match site_repo.get_site_by_slug(slug).await? {
                        Some(site) => {
                            site_repo
                                .grant_permission(site.id, &user.id, SITE_ROLE_VIEWER)
                                .await?
                        }
                        None => tracing::warn!("Default site \"{}\" does not exist", slug),
                    }
                }
            }
        }

        Ok(())
    }

    async fn notify_operators(&self, user: &User, site: Option<&Site>) -> ServiceResult<()> {
        for operator in &self.state.policy().notify_register {
            let message =
                registration_notice_message(self.state.message_context(site), user, operator);
            if let Err(e) = self.state.mailer.send(message).await {
                tracing::error!("Failed to notify {} of a registration: {}", operator, e);
                return Err(ServiceError::external_service(
                    "An error occurred when the notification email was sent.",
                ));
            }
        }
        Ok(())
    }

    fn success_message(&self) -> String {
        let policy = self.state.policy();
        if let Some(message) = &policy.message_confirm_register {
            return message.clone();
        }

        let message = if policy.email_is_valid {
            "Thank you for registering. You can now log in and use the library."
        } else if policy.is_open() {
            "Thank you for registering. Please check your email for a confirmation message. Once you have confirmed your request, you will be able to log in."
        } else {
            "Thank you for registering. Please check your email for a confirmation message. Once you have confirmed your request, a moderator will confirm registration."
        };
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuestPolicy;
    use crate::repositories::guest_token_repository::GuestTokenRepository;
    use crate::services::usernames::UsernameRegistry;
    use crate::state::testing::{test_policy, test_state};
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Accepts every handle but cannot store any.
    struct UnwritableUsernames;

    #[async_trait]
    impl UsernameRegistry for UnwritableUsernames {
        async fn validate(&self, handle: Option<&str>) -> ServiceResult<Option<String>> {
            Ok(handle.map(str::to_string))
        }

        async fn record(&self, _user: &User, _handle: &str) -> ServiceResult<()> {
            Err(ServiceError::internal_error("usernames table is locked"))
        }
    }

    fn request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: Some(email.to_string()),
            password: Some("secret1".to_string()),
            ..Default::default()
        }
    }

    fn fail_message(error: ServiceError) -> String {
        error
            .fail_parts()
            .map(|(_, message)| message.to_string())
            .unwrap_or_else(|| error.to_string())
    }

    #[tokio::test]
    async fn test_register_creates_pending_account_and_sends_token() {
        let (state, mailer) = test_state(test_policy()).await;

        let registration = RegistrationService::new(&state)
            .register(request("ada@example.com"), None)
            .await
            .unwrap();

        assert_eq!(registration.user.role, ROLE_GUEST);
        assert_eq!(registration.user.name, "ada@example.com");
        assert!(!registration.user.is_active);
        assert!(registration.message.contains("a moderator will confirm"));

        let token = GuestTokenRepository::new(&state.pool)
            .get_latest_by_email("ada@example.com")
            .await
            .unwrap()
            .unwrap();
        let sent = mailer.last_to("ada@example.com").unwrap();
        assert!(sent.text_content.contains(&token.token));
    }

    #[tokio::test]
    async fn test_register_validation_order() {
        let policy = GuestPolicy {
            register_site: true,
            ..test_policy()
        };
        let (state, _) = test_state(policy).await;
        let service = RegistrationService::new(&state);

        let error = service
            .register(RegisterRequest::default(), None)
            .await
            .unwrap_err();
        assert_eq!(error.fail_parts(), Some(("email", "Email is required.")));

        let error = service.register(request("nope"), None).await.unwrap_err();
        assert_eq!(error.fail_parts(), Some(("email", "Invalid email.")));

        let error = service
            .register(request("ada@example.com"), None)
            .await
            .unwrap_err();
        assert_eq!(
            error.fail_parts(),
            Some(("site", "A site is required to register."))
        );

        let mut with_site = request("ada@example.com");
        with_site.site = Some("missing".to_string());
        let error = service.register(with_site, None).await.unwrap_err();
        assert_eq!(error.fail_parts(), Some(("site", "The site doesn’t exist.")));
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let (state, _) = test_state(test_policy()).await;
        let service = RegistrationService::new(&state);

        service
            .register(request("ada@example.com"), None)
            .await
            .unwrap();

        let error = service
            .register(request("ada@example.com"), None)
            .await
            .unwrap_err();
        assert_eq!(
            fail_message(error),
            "Check your email to confirm your registration."
        );

        TokenStore::new(&state.pool)
            .confirm_all_for_email("ada@example.com")
            .await
            .unwrap();

        let error = service
            .register(request("ada@example.com"), None)
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::Conflict { .. }));
        assert_eq!(fail_message(error), "Already registered.");
    }

    #[tokio::test]
    async fn test_resubmission_under_always_valid_confirms_pending_token() {
        let (state, _) = test_state(test_policy()).await;
        RegistrationService::new(&state)
            .register(request("ada@example.com"), None)
            .await
            .unwrap();

        let mut trusting = state.clone();
        let mut config = (*state.config).clone();
        config.guest.email_is_valid = true;
        trusting.config = std::sync::Arc::new(config);

        let error = RegistrationService::new(&trusting)
            .register(request("ada@example.com"), None)
            .await
            .unwrap_err();
        assert_eq!(fail_message(error), "Already registered.");
        assert!(
            !TokenStore::new(&state.pool)
                .has_pending("ada@example.com")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_closed_and_logged_callers_are_refused() {
        let policy = GuestPolicy {
            mode: RegistrationMode::Closed,
            ..test_policy()
        };
        let (state, _) = test_state(policy).await;
        let error = RegistrationService::new(&state)
            .register(request("ada@example.com"), None)
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::PermissionDenied { .. }));

        let (state, _) = test_state(test_policy()).await;
        let service = RegistrationService::new(&state);
        let user = service
            .register(request("ada@example.com"), None)
            .await
            .unwrap()
            .user;
        let error = service
            .register(request("bob@example.com"), Some(&user))
            .await
            .unwrap_err();
        assert_eq!(
            error.fail_parts(),
            Some(("user", "User cannot register: already logged."))
        );
    }

    #[tokio::test]
    async fn test_mail_failure_keeps_the_account() {
        let (state, mailer) = test_state(test_policy()).await;
        mailer.set_failing(true);

        let error = RegistrationService::new(&state)
            .register(request("ada@example.com"), None)
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::ExternalService { .. }));
        assert!(
            UserRepository::new(&state.pool)
                .email_exists("ada@example.com")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_site_permission_and_settings() {
        let policy = GuestPolicy {
            register_site: true,
            ..test_policy()
        };
        let (state, _) = test_state(policy).await;
        let site = SiteRepository::new(&state.pool)
            .create_site("reading-room", "Reading Room")
            .await
            .unwrap();

        let mut with_site = request("ada@example.com");
        with_site.site = Some("reading-room".to_string());
        with_site
            .settings
            .insert("locale".to_string(), Value::from("fr"));

        let user = RegistrationService::new(&state)
            .register(with_site, None)
            .await
            .unwrap()
            .user;

        let role = SiteRepository::new(&state.pool)
            .get_permission_role(site.id, &user.id)
            .await
            .unwrap();
        assert_eq!(role.as_deref(), Some(SITE_ROLE_VIEWER));

        let settings = UserSettingRepository::new(&state.pool);
        assert_eq!(
            settings.get(&user.id, "locale").await.unwrap(),
            Some(Value::from("fr"))
        );
        assert_eq!(
            settings.get(&user.id, GUEST_SITE_SETTING).await.unwrap(),
            Some(Value::from(site.id))
        );
    }

    #[tokio::test]
    async fn test_always_valid_registration_sends_no_token() {
        let policy = GuestPolicy {
            email_is_valid: true,
            mode: RegistrationMode::Open,
            ..test_policy()
        };
        let (state, mailer) = test_state(policy).await;

        let registration = RegistrationService::new(&state)
            .register(request("ada@example.com"), None)
            .await
            .unwrap();
        assert!(registration.user.is_active);
        assert!(
            TokenStore::new(&state.pool)
                .latest_for_email("ada@example.com")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            !mailer
                .last_to("ada@example.com")
                .unwrap()
                .text_content
                .contains("token=")
        );
    }

    #[tokio::test]
    async fn test_operators_are_notified() {
        let policy = GuestPolicy {
            notify_register: vec!["admin@example.com".to_string()],
            ..test_policy()
        };
        let (state, mailer) = test_state(policy).await;

        RegistrationService::new(&state)
            .register(request("ada@example.com"), None)
            .await
            .unwrap();

        let notice = mailer.last_to("admin@example.com").unwrap();
        assert!(notice.text_content.contains("ada@example.com"));
    }

    #[tokio::test]
    async fn test_username_failure_after_creation_keeps_registering() {
        let (mut state, mailer) = test_state(test_policy()).await;
        state.usernames = Arc::new(UnwritableUsernames);

        let registration = RegistrationService::new(&state)
            .register(
                RegisterRequest {
                    handle: Some("ada".to_string()),
                    ..request("ada@example.com")
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(registration.user.email, "ada@example.com");

        let stored = UserRepository::new(&state.pool)
            .get_user_by_email("ada@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, registration.user.id);

        let token = GuestTokenRepository::new(&state.pool)
            .get_latest_by_email("ada@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(!token.confirmed);
        let sent = mailer.last_to("ada@example.com").unwrap();
        assert!(sent.text_content.contains(&token.token));
    }
}

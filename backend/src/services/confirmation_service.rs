//! Redemption of the links sent by email.

use crate::database::models::{GuestToken, User};
use crate::errors::{ServiceError, ServiceResult, is_unique_violation};
use crate::repositories::guest_token_repository::GuestTokenRepository;
use crate::repositories::site_repository::SiteRepository;
use crate::repositories::user_repository::UserRepository;
use crate::repositories::user_setting_repository::UserSettingRepository;
use crate::services::registration_service::GUEST_SITE_SETTING;
use crate::services::token_store::TokenStore;
use crate::state::AppState;

#[derive(Debug)]
pub struct Confirmation {
    pub user: User,
    pub message: String,
}

pub struct ConfirmationService<'a> {
    state: &'a AppState,
}

impl<'a> ConfirmationService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Redeems a registration token.
    ///
    /// The account is activated only when registration is open; under
    /// moderation an operator still has to activate it.
    pub async fn confirm_registration(&self, token: &str) -> ServiceResult<Confirmation> {
        let (guest_token, mut user) = self.redeem(token).await?;
        let site_title = self.site_title(&user).await?;

        if !self.state.policy().is_open() {
            tracing::info!(
                "Registration of user {} confirmed, waiting for moderation",
                user.id
            );
            return Ok(Confirmation {
                user,
                message: format!(
                    "Thanks for joining {}! Your registration is under moderation. See you soon!",
                    site_title
                ),
            });
        }

        if !user.is_active {
            UserRepository::new(&self.state.pool)
                .set_active(&user.id, true)
                .await?;
            user.is_active = true;
        }
        tracing::info!(
            "Registration of user {} confirmed with token {}",
            user.id,
            guest_token.id
        );

        Ok(Confirmation {
            user,
            message: format!(
                "Thanks for joining {}! You can now log in using the password you chose.",
                site_title
            ),
        })
    }

    /// Redeems the link sent after registration and stores the proven email.
    pub async fn confirm_email(&self, token: &str) -> ServiceResult<Confirmation> {
        let (user, site_title) = self.apply_email(token).await?;
        Ok(Confirmation {
            message: format!(
                "Thanks for confirming your email \"{}\" on {}.",
                user.email, site_title
            ),
            user,
        })
    }

    /// Redeems an email-change link and switches the account to the new email.
    pub async fn validate_email(&self, token: &str) -> ServiceResult<Confirmation> {
        let (user, site_title) = self.apply_email(token).await?;
        Ok(Confirmation {
            message: format!(
                "Your email \"{}\" is confirmed for {}.",
                user.email, site_title
            ),
            user,
        })
    }

    async fn apply_email(&self, token: &str) -> ServiceResult<(User, String)> {
        self.check_email_free(token).await?;
        let (guest_token, mut user) = self.redeem(token).await?;

        if user.email != guest_token.email {
            UserRepository::new(&self.state.pool)
                .set_email(&user.id, &guest_token.email)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        ServiceError::conflict(
                            "email",
                            format!("The email \"{}\" is not yours.", guest_token.email),
                        )
                    } else {
                        ServiceError::from(e)
                    }
                })?;
            tracing::info!(
                "User {} changed email from {} to {}",
                user.id,
                user.email,
                guest_token.email
            );
            user.email = guest_token.email;
        }

        let site_title = self.site_title(&user).await?;
        Ok((user, site_title))
    }

    /// Refuses a pending token whose email now belongs to another account,
    /// before the token is consumed.
    async fn check_email_free(&self, token: &str) -> ServiceResult<()> {
        let Some(pending) = GuestTokenRepository::new(&self.state.pool)
            .get_token(token.trim())
            .await?
            .filter(|pending| !pending.confirmed)
        else {
            return Ok(());
        };

        let owner = UserRepository::new(&self.state.pool)
            .get_user_by_email(&pending.email)
            .await?;
        match owner {
            Some(owner) if owner.id != pending.user_id => {
                tracing::warn!(
                    "User {} followed a link for \"{}\", used by user {}",
                    pending.user_id,
                    pending.email,
                    owner.id
                );
                Err(ServiceError::conflict(
                    "email",
                    format!("The email \"{}\" is not yours.", pending.email),
                ))
            }
            _ => Ok(()),
        }
    }

    async fn redeem(&self, token: &str) -> ServiceResult<(GuestToken, User)> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ServiceError::validation("token", "Invalid token."));
        }

        let guest_token = TokenStore::new(&self.state.pool).redeem(token).await?;
        let user = UserRepository::new(&self.state.pool)
            .get_user_by_id(&guest_token.user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", &guest_token.user_id))?;

        Ok((guest_token, user))
    }

    /// Title of the site the account registered on, else the installation.
    async fn site_title(&self, user: &User) -> ServiceResult<String> {
        let site_id = UserSettingRepository::new(&self.state.pool)
            .get(&user.id, GUEST_SITE_SETTING)
            .await?
            .and_then(|value| value.as_i64());

        if let Some(site_id) = site_id {
            if let Some(site) = SiteRepository::new(&self.state.pool)
                .get_site_by_id(site_id)
                .await?
            {
                return Ok(site.title);
            }
        }

        Ok(self.state.config.installation_title.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GuestPolicy, RegistrationMode};
    use crate::database::models::RegisterRequest;
    use crate::services::registration_service::RegistrationService;
    use crate::state::testing::{test_policy, test_state};

    async fn register(state: &AppState, email: &str) -> (User, GuestToken) {
        let user = RegistrationService::new(state)
            .register(
                RegisterRequest {
                    email: Some(email.to_string()),
                    password: Some("secret1".to_string()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap()
            .user;
        let token = GuestTokenRepository::new(&state.pool)
            .get_latest_by_email(email)
            .await
            .unwrap()
            .unwrap();
        (user, token)
    }

    #[tokio::test]
    async fn test_moderated_confirmation_leaves_account_inactive() {
        let (state, _) = test_state(test_policy()).await;
        let (_, token) = register(&state, "ada@example.com").await;

        let confirmation = ConfirmationService::new(&state)
            .confirm_registration(&token.token)
            .await
            .unwrap();

        assert!(!confirmation.user.is_active);
        assert!(confirmation.message.contains("under moderation"));
        assert!(confirmation.message.contains("Library"));
    }

    #[tokio::test]
    async fn test_open_confirmation_activates_account() {
        let policy = GuestPolicy {
            mode: RegistrationMode::Open,
            ..test_policy()
        };
        let (state, _) = test_state(policy).await;
        let (user, token) = register(&state, "ada@example.com").await;

        let confirmation = ConfirmationService::new(&state)
            .confirm_registration(&token.token)
            .await
            .unwrap();
        assert!(confirmation.user.is_active);

        let stored = UserRepository::new(&state.pool)
            .get_user_by_id(&user.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_active);
    }

    #[tokio::test]
    async fn test_invalid_and_reused_tokens() {
        let (state, _) = test_state(test_policy()).await;
        let (_, token) = register(&state, "ada@example.com").await;
        let service = ConfirmationService::new(&state);

        let error = service.confirm_registration("").await.unwrap_err();
        assert_eq!(error.fail_parts(), Some(("token", "Invalid token.")));
        let error = service.confirm_email("unknown").await.unwrap_err();
        assert_eq!(error.fail_parts(), Some(("token", "Invalid token.")));

        service.confirm_registration(&token.token).await.unwrap();
        let error = service.confirm_registration(&token.token).await.unwrap_err();
        assert_eq!(
            error.fail_parts(),
            Some(("token", "This token has already been used."))
        );
    }

    #[tokio::test]
    async fn test_validate_email_switches_address_and_confirms_siblings() {
        let (state, _) = test_state(test_policy()).await;
        let (user, _) = register(&state, "ada@example.com").await;

        let store = TokenStore::new(&state.pool);
        let first = store.issue("lovelace@example.com", &user).await.unwrap();
        let second = store.issue("lovelace@example.com", &user).await.unwrap();

        let confirmation = ConfirmationService::new(&state)
            .validate_email(&second.token)
            .await
            .unwrap();
        assert_eq!(confirmation.user.email, "lovelace@example.com");
        assert!(confirmation.message.contains("lovelace@example.com"));

        let first = GuestTokenRepository::new(&state.pool)
            .get_token(&first.token)
            .await
            .unwrap()
            .unwrap();
        assert!(first.confirmed);
    }

    #[tokio::test]
    async fn test_confirm_email_rejects_address_taken_meanwhile() {
        let (state, _) = test_state(test_policy()).await;
        let (ada, _) = register(&state, "ada@example.com").await;
        register(&state, "bob@example.com").await;

        let token = TokenStore::new(&state.pool)
            .issue("bob@example.com", &ada)
            .await
            .unwrap();

        let error = ConfirmationService::new(&state)
            .confirm_email(&token.token)
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_conflicting_link_stays_usable() {
        let (state, _) = test_state(test_policy()).await;
        let (ada, _) = register(&state, "ada@example.com").await;

        let token = TokenStore::new(&state.pool)
            .issue("new@example.com", &ada)
            .await
            .unwrap();
        let taken = register(&state, "new@example.com").await.0;

        let service = ConfirmationService::new(&state);
        let error = service.validate_email(&token.token).await.unwrap_err();
        assert_eq!(
            error.fail_parts(),
            Some(("email", "The email \"new@example.com\" is not yours."))
        );

        let tokens = GuestTokenRepository::new(&state.pool);
        let stored = tokens.get_token(&token.token).await.unwrap().unwrap();
        assert!(!stored.confirmed);
        let stored = UserRepository::new(&state.pool)
            .get_user_by_id(&ada.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.email, "ada@example.com");

        // Once the other account gives the address up, the same link works.
        UserRepository::new(&state.pool)
            .set_email(&taken.id, "elsewhere@example.com")
            .await
            .unwrap();
        let confirmation = service.validate_email(&token.token).await.unwrap();
        assert_eq!(confirmation.user.email, "new@example.com");
    }
}

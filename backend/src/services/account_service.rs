//! Account business logic service.
//!
//! Handles the partial updates a logged guest can make to their own
//! account: display name, password and email.

use crate::database::models::{ChangePassword, User};
use crate::errors::{ServiceError, ServiceResult};
use crate::repositories::site_repository::SiteRepository;
use crate::repositories::user_repository::UserRepository;
use crate::services::email_service::update_email_message;
use crate::services::token_store::TokenStore;
use crate::state::AppState;
use crate::utils::is_valid_email;
use crate::utils::password::{hash_password, verify_password};
use serde_json::{Map, Value};
use validator::Validate;

#[derive(Debug)]
pub struct ProfileUpdate {
    pub user: User,
    pub message: Option<String>,
}

pub struct AccountService<'a> {
    state: &'a AppState,
}

impl<'a> AccountService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Applies a partial update of the caller's own account.
    ///
    /// Password and email changes must be sent alone; any other key than
    /// `name` is refused.
    pub async fn update_me(
        &self,
        user: &User,
        data: Map<String, Value>,
    ) -> ServiceResult<ProfileUpdate> {
        if data.values().all(is_blank) {
            return Err(ServiceError::validation("user", "Request is empty."));
        }

        if is_present(&data, "password") || is_present(&data, "new_password") {
            return self.change_password(user, &data).await;
        }

        if is_present(&data, "email") {
            if data.len() > 1 {
                return Err(ServiceError::validation(
                    "email",
                    "You cannot update email and another data in the same time.",
                ));
            }
            return self.change_email(user, string_value(&data, "email")).await;
        }

        if data.keys().any(|key| key != "name") {
            return Err(ServiceError::validation(
                "user",
                "Your request contains metadata that cannot be updated.",
            ));
        }

        self.rename(user, string_value(&data, "name")).await
    }

    pub async fn rename(&self, user: &User, name: &str) -> ServiceResult<ProfileUpdate> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::validation("name", "The new name is empty."));
        }

        let repo = UserRepository::new(&self.state.pool);
        repo.set_name(&user.id, name).await?;

        Ok(ProfileUpdate {
            user: self.reload(user).await?,
            message: None,
        })
    }

    /// Replaces the password after checking the current one.
    pub async fn change_password(
        &self,
        user: &User,
        data: &Map<String, Value>,
    ) -> ServiceResult<ProfileUpdate> {
        if data.len() > 2 {
            return Err(ServiceError::validation(
                "password",
                "You cannot update password and another data in the same time.",
            ));
        }

        let change = ChangePassword {
            password: string_value(data, "password").to_string(),
            new_password: string_value(data, "new_password").to_string(),
        };
        if change.password.is_empty() {
            return Err(ServiceError::validation("password", "Existing password empty."));
        }
        if change.new_password.is_empty() {
            return Err(ServiceError::validation("password", "New password empty."));
        }
        change.validate()?;

        let matches = match &user.password_hash {
            Some(hash) => verify_password(&change.password, hash)?,
            None => false,
        };
        if !matches {
            self.state.security_delay().await;
            return Err(ServiceError::validation("password", "Wrong password."));
        }

        UserRepository::new(&self.state.pool)
            .set_password_hash(&user.id, Some(hash_password(&change.new_password)?.as_str()))
            .await?;
        tracing::info!("User {} changed password", user.id);

        Ok(ProfileUpdate {
            user: self.reload(user).await?,
            message: Some("Password successfully changed".to_string()),
        })
    }

    /// Starts an email change: the new address receives a confirmation link
    /// and the account keeps its current email until it is followed.
    pub async fn change_email(&self, user: &User, email: &str) -> ServiceResult<ProfileUpdate> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ServiceError::validation("email", "New email empty."));
        }
        if !is_valid_email(email) {
            return Err(ServiceError::validation(
                "email",
                format!("\"{}\" is not an email.", email),
            ));
        }
        if email == user.email {
            return Err(ServiceError::validation(
                "email",
                "The new email is the same as the current one.",
            ));
        }

        if let Some(owner) = UserRepository::new(&self.state.pool)
            .get_user_by_email(email)
            .await?
        {
            self.state.security_delay().await;
            tracing::warn!(
                "User {} wants to change email from \"{}\" to \"{}\", used by user {}",
                user.id,
                user.email,
                email,
                owner.id
            );
            return Err(ServiceError::conflict(
                "email",
                format!("The email \"{}\" is not yours.", email),
            ));
        }

        let site = if self.state.policy().register_site {
            let site = SiteRepository::new(&self.state.pool)
                .get_user_sites(&user.id)
                .await?
                .into_iter()
                .next();
            if site.is_none() {
                return Err(ServiceError::validation(
                    "email",
                    "Email cannot be updated: the user is not related to a site.",
                ));
            }
            site
        } else {
            None
        };

        let token = TokenStore::new(&self.state.pool).issue(email, user).await?;
        let message = update_email_message(
            self.state.message_context(site.as_ref()),
            user,
            email,
            &token.token,
        );
        if let Err(e) = self.state.mailer.send(message).await {
            tracing::error!("Failed to send email change link to {}: {}", email, e);
            return Err(ServiceError::external_service(
                "An error occurred when the email was sent.",
            ));
        }

        Ok(ProfileUpdate {
            user: user.clone(),
            message: Some(format!(
                "Check your email \"{}\" to confirm the change.",
                email
            )),
        })
    }

    async fn reload(&self, user: &User) -> ServiceResult<User> {
        UserRepository::new(&self.state.pool)
            .get_user_by_id(&user.id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", &user.id))
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn is_present(data: &Map<String, Value>, key: &str) -> bool {
    data.get(key).is_some_and(|value| !value.is_null())
}

fn string_value<'m>(data: &'m Map<String, Value>, key: &str) -> &'m str {
    data.get(key).and_then(Value::as_str).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuestPolicy;
    use crate::database::models::{CreateUser, ROLE_GUEST};
    use crate::services::confirmation_service::ConfirmationService;
    use crate::state::testing::{test_policy, test_state};
    use serde_json::json;

    async fn user(state: &AppState, email: &str) -> User {
        UserRepository::new(&state.pool)
            .create_user(CreateUser {
                email: email.to_string(),
                name: "Ada".to_string(),
                role: ROLE_GUEST.to_string(),
                is_active: true,
                password_hash: Some(hash_password("secret1").unwrap()),
            })
            .await
            .unwrap()
    }

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_empty_and_unknown_keys() {
        let (state, _) = test_state(test_policy()).await;
        let user = user(&state, "ada@example.com").await;
        let service = AccountService::new(&state);

        let error = service
            .update_me(&user, body(json!({"name": ""})))
            .await
            .unwrap_err();
        assert_eq!(error.fail_parts(), Some(("user", "Request is empty.")));

        let error = service
            .update_me(&user, body(json!({"name": "Lovelace", "role": "admin"})))
            .await
            .unwrap_err();
        assert_eq!(
            error.fail_parts(),
            Some(("user", "Your request contains metadata that cannot be updated."))
        );
    }

    #[tokio::test]
    async fn test_rename() {
        let (state, _) = test_state(test_policy()).await;
        let user = user(&state, "ada@example.com").await;

        let update = AccountService::new(&state)
            .update_me(&user, body(json!({"name": "Lovelace"})))
            .await
            .unwrap();
        assert_eq!(update.user.name, "Lovelace");
    }

    #[tokio::test]
    async fn test_change_password_length_and_current_password() {
        let (state, _) = test_state(test_policy()).await;
        let user = user(&state, "ada@example.com").await;
        let service = AccountService::new(&state);

        let error = service
            .update_me(
                &user,
                body(json!({"password": "secret1", "new_password": "12345"})),
            )
            .await
            .unwrap_err();
        assert_eq!(
            error.fail_parts(),
            Some((
                "new_password",
                "New password should have 6 characters or more."
            ))
        );

        let error = service
            .update_me(
                &user,
                body(json!({"password": "wrong!", "new_password": "123456"})),
            )
            .await
            .unwrap_err();
        assert_eq!(error.fail_parts(), Some(("password", "Wrong password.")));

        let error = service
            .update_me(
                &user,
                body(json!({"password": "secret1", "new_password": "123456", "name": "x"})),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::Validation { .. }));

        let update = service
            .update_me(
                &user,
                body(json!({"password": "secret1", "new_password": "123456"})),
            )
            .await
            .unwrap();
        let hash = update.user.password_hash.unwrap();
        assert!(verify_password("123456", &hash).unwrap());
    }

    #[tokio::test]
    async fn test_change_email_sends_link_to_new_address() {
        let (state, mailer) = test_state(test_policy()).await;
        let user = user(&state, "ada@example.com").await;

        let update = AccountService::new(&state)
            .update_me(&user, body(json!({"email": "lovelace@example.com"})))
            .await
            .unwrap();
        assert_eq!(update.user.email, "ada@example.com");

        let token = TokenStore::new(&state.pool)
            .latest_for_email("lovelace@example.com")
            .await
            .unwrap()
            .unwrap();
        let sent = mailer.last_to("lovelace@example.com").unwrap();
        assert!(sent.text_content.contains(&token.token));

        let confirmation = ConfirmationService::new(&state)
            .validate_email(&token.token)
            .await
            .unwrap();
        assert_eq!(confirmation.user.email, "lovelace@example.com");
    }

    #[tokio::test]
    async fn test_change_email_rules() {
        let (state, _) = test_state(test_policy()).await;
        let user = user(&state, "ada@example.com").await;
        let other = self::user(&state, "bob@example.com").await;
        let service = AccountService::new(&state);

        let error = service.change_email(&user, "nope").await.unwrap_err();
        assert_eq!(
            error.fail_parts(),
            Some(("email", "\"nope\" is not an email."))
        );

        let error = service
            .change_email(&user, "ada@example.com")
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::Validation { .. }));

        let error = service
            .change_email(&user, &other.email)
            .await
            .unwrap_err();
        assert_eq!(
            error.fail_parts(),
            Some(("email", "The email \"bob@example.com\" is not yours."))
        );

        let error = service
            .update_me(
                &user,
                body(json!({"email": "new@example.com", "name": "x"})),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_change_email_requires_site_when_scoped() {
        let policy = GuestPolicy {
            register_site: true,
            ..test_policy()
        };
        let (state, _) = test_state(policy).await;
        let user = user(&state, "ada@example.com").await;

        let error = AccountService::new(&state)
            .change_email(&user, "new@example.com")
            .await
            .unwrap_err();
        assert_eq!(
            error.fail_parts(),
            Some((
                "email",
                "Email cannot be updated: the user is not related to a site."
            ))
        );
    }
}

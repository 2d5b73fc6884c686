//! Core business logic for the authentication system.

use crate::auth::models::*;
use crate::database::models::{SessionCredential, User};
use crate::errors::{ServiceError, ServiceResult};
use crate::repositories::user_repository::UserRepository;
use crate::services::session_token_service::SessionTokenService;
use crate::services::token_store::TokenStore;
use crate::state::AppState;
use crate::utils::password::verify_password;
use crate::utils::{is_valid_email, non_blank};

/// Authentication service for handling login, logout and session credentials
pub struct AuthService<'a> {
    state: &'a AppState,
}

impl<'a> AuthService<'a> {
    /// Create a new AuthService instance
    pub fn new(state: &'a AppState) -> Self {
        AuthService { state }
    }

    /// Authenticate a guest and open their sessions.
    ///
    /// # Arguments
    /// * `login_request` - Submitted email and password
    /// * `caller` - Identity of the current request, if any
    /// * `with_credential` - Also mint a bearer session credential
    pub async fn login(
        &self,
        login_request: LoginRequest,
        caller: Option<&User>,
        with_credential: bool,
    ) -> ServiceResult<LoginOutcome> {
        if caller.is_some() {
            return Err(ServiceError::validation(
                "user",
                "User cannot login: already logged.",
            ));
        }

        let email = non_blank(login_request.email.as_ref())
            .ok_or_else(|| ServiceError::validation("email", "Email is required."))?;
        if !is_valid_email(email) {
            return Err(ServiceError::validation("email", "Invalid email."));
        }
        let password = login_request
            .password
            .as_deref()
            .filter(|password| !password.is_empty())
            .ok_or_else(|| ServiceError::validation("password", "Password is required."))?;

        let user = self.verify_credentials(email, password).await?;
        self.check_can_login(&user).await?;

        let policy = self.state.policy();
        if !policy.login_roles.iter().any(|role| role == &user.role) {
            return Err(ServiceError::validation(
                "user",
                format!("Role \"{}\" is not allowed to login via api.", user.role),
            ));
        }

        let session_cookie = if policy.login_session {
            Some(
                self.state
                    .jwt
                    .generate_token(user.id.clone(), user.role.clone(), user.session_version)?,
            )
        } else {
            None
        };

        let credential = if with_credential {
            Some(SessionTokenService::new(&self.state.pool).issue(&user).await?)
        } else {
            None
        };

        tracing::info!("User {} logged in", user.id);

        Ok(LoginOutcome {
            user,
            session_cookie,
            credential,
        })
    }

    /// Revokes the session credentials of the caller.
    pub async fn logout(&self, caller: Option<&User>) -> ServiceResult<()> {
        let user = caller.ok_or_else(|| ServiceError::validation("user", "User not logged."))?;

        let revoked = SessionTokenService::new(&self.state.pool)
            .revoke(user)
            .await?;
        UserRepository::new(&self.state.pool)
            .bump_session_version(&user.id)
            .await?;
        tracing::info!(
            "User {} logged out ({} session credential(s) revoked)",
            user.id,
            revoked
        );
        Ok(())
    }

    /// Rotates the session credential of the caller.
    pub async fn session_token(&self, caller: Option<&User>) -> ServiceResult<SessionCredential> {
        let user = caller.ok_or_else(|| ServiceError::unauthorized("Unauthorized access."))?;
        SessionTokenService::new(&self.state.pool).issue(user).await
    }

    /// Same answer, after the same delay, for an unknown email and a wrong password.
    async fn verify_credentials(&self, email: &str, password: &str) -> ServiceResult<User> {
        let user = UserRepository::new(&self.state.pool)
            .get_user_by_email(email)
            .await?;

        let verified = match user.as_ref().and_then(|user| user.password_hash.as_deref()) {
            Some(hash) => verify_password(password, hash)?,
            None => false,
        };

        match user {
            Some(user) if verified => Ok(user),
            _ => {
                self.state.security_delay().await;
                tracing::warn!("Failed login attempt for {}", email);
                Err(ServiceError::validation("user", "Wrong email or password."))
            }
        }
    }

    /// Confirmation and moderation gates.
    async fn check_can_login(&self, user: &User) -> ServiceResult<()> {
        let pending = TokenStore::new(&self.state.pool)
            .has_pending(&user.email)
            .await?;

        if pending {
            return Err(ServiceError::validation(
                "user",
                "Check your email to confirm your registration.",
            ));
        }
        if !user.is_active {
            return Err(ServiceError::validation(
                "user",
                "Your account is under moderation for opening.",
            ));
        }
        Ok(())
    }
}

//! Password reset with short numeric codes.
//!
//! The code is typed by the user in the client app, so it is short and
//! numeric. It lives for one hour and a user holds at most one.

use crate::database::models::{ForgotPasswordRequest, PasswordCreation, User};
use crate::errors::{ServiceError, ServiceResult};
use crate::repositories::password_creation_repository::PasswordCreationRepository;
use crate::repositories::user_repository::UserRepository;
use crate::services::email_service::reset_code_message;
use crate::state::AppState;
use crate::utils::generate_random_string::{
    MAX_GENERATION_ATTEMPTS, generate_numeric_code, generate_unique,
};
use crate::utils::password::{hash_password, validate_new_password};
use crate::utils::{is_valid_email, non_blank};
use chrono::{DateTime, Duration, Utc};

pub const RESET_CODE_LENGTH: usize = 8;
pub const RESET_CODE_LIFETIME_MINUTES: i64 = 60;

/// End of the validity window of a code created at `created_at`.
pub fn reset_code_expiry(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + Duration::minutes(RESET_CODE_LIFETIME_MINUTES)
}

/// A code is still valid at exactly one hour.
pub fn is_expired(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now > reset_code_expiry(created_at)
}

#[derive(Debug)]
pub enum ForgotPassword {
    /// A code was emailed to the address.
    CodeSent { email: String },
    /// The code was redeemed and the password replaced.
    PasswordReset(User),
}

pub struct PasswordResetService<'a> {
    state: &'a AppState,
}

impl<'a> PasswordResetService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Entry point of the forgot-password endpoint.
    ///
    /// Without a token a new code is sent; with a token the code is
    /// redeemed against the submitted password.
    pub async fn forgot_password(
        &self,
        request: ForgotPasswordRequest,
        caller: Option<&User>,
    ) -> ServiceResult<ForgotPassword> {
        if caller.is_some() {
            return Err(ServiceError::validation(
                "user",
                "A logged user cannot change the password with this method.",
            ));
        }

        let email = non_blank(request.email.as_ref())
            .ok_or_else(|| ServiceError::validation("email", "Email is required."))?;
        if !is_valid_email(email) {
            return Err(ServiceError::validation("email", "Invalid email."));
        }

        let user = UserRepository::new(&self.state.pool)
            .get_user_by_email(email)
            .await?
            .ok_or_else(|| ServiceError::validation("email", "Invalid email."))?;

        if !user.is_active {
            return Err(ServiceError::validation(
                "user",
                "User is not active and cannot update password.",
            ));
        }

        match non_blank(request.token.as_ref()) {
            None => {
                self.request_reset(&user).await?;
                Ok(ForgotPassword::CodeSent {
                    email: email.to_string(),
                })
            }
            Some(code) => {
                let user = self
                    .redeem_reset(&user, code, non_blank(request.password.as_ref()))
                    .await?;
                Ok(ForgotPassword::PasswordReset(user))
            }
        }
    }

    /// Replaces any pending code of the user and emails a new one.
    pub async fn request_reset(&self, user: &User) -> ServiceResult<PasswordCreation> {
        let repo = PasswordCreationRepository::new(&self.state.pool);
        let repo_ref = &repo;

        if let Some(previous) = repo.get_by_user(&user.id).await? {
            repo.delete(&previous.id).await?;
            tracing::debug!("Previous reset code of user {} discarded", user.id);
        }

        let code = generate_unique(
            MAX_GENERATION_ATTEMPTS,
            || generate_numeric_code(RESET_CODE_LENGTH),
            move |candidate| async move { repo_ref.code_exists(&candidate).await },
        )
        .await?;

        let creation = repo.create(&code, &user.id, Utc::now()).await?;

        let message = reset_code_message(
            self.state.message_context(None),
            user,
            &creation.id,
            reset_code_expiry(creation.created_at),
        );
        if let Err(e) = self.state.mailer.send(message).await {
            tracing::error!("Failed to send reset code to {}: {}", user.email, e);
            return Err(ServiceError::external_service(
                "An error occurred when the email was sent.",
            ));
        }

        tracing::info!("Password reset code sent to user {}", user.id);
        Ok(creation)
    }

    /// Redeems a code for `user` and stores the new password.
    ///
    /// # Errors
    /// - `Validation` for an unknown code, a code of another user or a
    ///   missing or short password
    /// - `Expired` when the code is older than one hour; the code is deleted
    pub async fn redeem_reset(
        &self,
        user: &User,
        code: &str,
        password: Option<&str>,
    ) -> ServiceResult<User> {
        let repo = PasswordCreationRepository::new(&self.state.pool);

        let creation = repo
            .get_by_code(code)
            .await?
            .filter(|creation| creation.user_id == user.id)
            .ok_or_else(|| ServiceError::validation("email", "Invalid token."))?;

        if is_expired(creation.created_at, Utc::now()) {
            repo.delete(&creation.id).await?;
            return Err(ServiceError::expired("token", "Password token expired."));
        }

        let password =
            password.ok_or_else(|| ServiceError::validation("password", "Password is required."))?;
        validate_new_password("password", password)?;

        let user_repo = UserRepository::new(&self.state.pool);
        user_repo
            .set_password_hash(&user.id, Some(hash_password(password)?.as_str()))
            .await?;
        if !user.is_active {
            user_repo.set_active(&user.id, true).await?;
        }
        repo.delete(&creation.id).await?;

        tracing::info!("Password reset for user {}", user.id);

        user_repo
            .get_user_by_id(&user.id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", &user.id))
    }
}

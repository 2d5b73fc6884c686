//! Single-use email confirmation tokens.
//!
//! A token ties an address to an account. Redeeming it proves control of
//! the address; tokens have no expiry and are kept once confirmed.

use crate::database::models::{GuestToken, User};
use crate::errors::{ServiceError, ServiceResult};
use crate::repositories::guest_token_repository::GuestTokenRepository;
use crate::utils::generate_random_string::{
    MAX_GENERATION_ATTEMPTS, generate_random_string, generate_unique,
};
use chrono::Utc;
use sqlx::SqlitePool;

/// Length of the random token sent in confirmation links.
pub const TOKEN_LENGTH: usize = 32;

pub struct TokenStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TokenStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Issues a fresh unconfirmed token proving `email` for `user`.
    ///
    /// The email may differ from the account email when the token backs an
    /// email change.
    pub async fn issue(&self, email: &str, user: &User) -> ServiceResult<GuestToken> {
        let repo = GuestTokenRepository::new(self.pool);
        let repo_ref = &repo;

        let token = generate_unique(
            MAX_GENERATION_ATTEMPTS,
            || generate_random_string(TOKEN_LENGTH),
            move |candidate| async move { repo_ref.token_exists(&candidate).await },
        )
        .await?;

        let guest_token = repo
            .create_token(&user.id, email, &token, Utc::now())
            .await?;

        tracing::info!(
            "Confirmation token {} issued for user {}",
            guest_token.id,
            user.id
        );
        Ok(guest_token)
    }

    /// Marks a token confirmed together with every other pending token
    /// issued for the same email.
    ///
    /// # Errors
    /// - `Validation` when the token is unknown
    /// - `Conflict` when it was already confirmed
    pub async fn redeem(&self, token: &str) -> ServiceResult<GuestToken> {
        let repo = GuestTokenRepository::new(self.pool);

        let mut guest_token = repo
            .get_token(token)
            .await?
            .ok_or_else(|| ServiceError::validation("token", "Invalid token."))?;

        if guest_token.confirmed || !repo.mark_confirmed(guest_token.id).await? {
            return Err(ServiceError::conflict(
                "token",
                "This token has already been used.",
            ));
        }
        guest_token.confirmed = true;

        let siblings = repo.confirm_all_for_email(&guest_token.email).await?;
        if siblings > 0 {
            tracing::debug!(
                "Confirmed {} other token(s) for the same email",
                siblings
            );
        }

        Ok(guest_token)
    }

    pub async fn confirm_all_for_email(&self, email: &str) -> ServiceResult<u64> {
        Ok(GuestTokenRepository::new(self.pool)
            .confirm_all_for_email(email)
            .await?)
    }

    /// Most recently issued token for an email, confirmed or not.
    pub async fn latest_for_email(&self, email: &str) -> ServiceResult<Option<GuestToken>> {
        Ok(GuestTokenRepository::new(self.pool)
            .get_latest_by_email(email)
            .await?)
    }

    /// Whether the latest token for `email` is still waiting to be redeemed.
    pub async fn has_pending(&self, email: &str) -> ServiceResult<bool> {
        Ok(self
            .latest_for_email(email)
            .await?
            .is_some_and(|token| !token.confirmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{CreateUser, ROLE_GUEST};
    use crate::database::test_pool;
    use crate::repositories::user_repository::UserRepository;

    async fn user(pool: &SqlitePool, email: &str) -> User {
        UserRepository::new(pool)
            .create_user(CreateUser {
                email: email.to_string(),
                name: email.to_string(),
                role: ROLE_GUEST.to_string(),
                is_active: false,
                password_hash: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_issued_tokens_are_unique_and_pending() {
        let pool = test_pool().await;
        let store = TokenStore::new(&pool);
        let user = user(&pool, "ada@example.com").await;

        let first = store.issue(&user.email, &user).await.unwrap();
        let second = store.issue(&user.email, &user).await.unwrap();

        assert_eq!(first.token.len(), TOKEN_LENGTH);
        assert_ne!(first.token, second.token);
        assert!(!first.confirmed);

        let latest = store.latest_for_email(&user.email).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert!(store.has_pending(&user.email).await.unwrap());
    }

    #[tokio::test]
    async fn test_redeem_confirms_siblings() {
        let pool = test_pool().await;
        let store = TokenStore::new(&pool);
        let user = user(&pool, "ada@example.com").await;

        let t1 = store.issue(&user.email, &user).await.unwrap();
        let t2 = store.issue(&user.email, &user).await.unwrap();
        let other = store.issue("new@example.com", &user).await.unwrap();

        let redeemed = store.redeem(&t1.token).await.unwrap();
        assert!(redeemed.confirmed);

        let tokens = GuestTokenRepository::new(&pool)
            .get_tokens_by_email(&user.email)
            .await
            .unwrap();
        assert!(tokens.iter().all(|token| token.confirmed));
        assert!(tokens.iter().any(|token| token.id == t2.id));

        let other = GuestTokenRepository::new(&pool)
            .get_token(&other.token)
            .await
            .unwrap()
            .unwrap();
        assert!(!other.confirmed);
    }

    #[tokio::test]
    async fn test_redeem_unknown_and_reused_tokens() {
        let pool = test_pool().await;
        let store = TokenStore::new(&pool);
        let user = user(&pool, "ada@example.com").await;

        match store.redeem("does-not-exist").await {
            Err(ServiceError::Validation { message, .. }) => assert_eq!(message, "Invalid token."),
            other => panic!("unexpected result: {:?}", other.map(|t| t.id)),
        }

        let token = store.issue(&user.email, &user).await.unwrap();
        store.redeem(&token.token).await.unwrap();

        match store.redeem(&token.token).await {
            Err(ServiceError::Conflict { message, .. }) => {
                assert_eq!(message, "This token has already been used.")
            }
            other => panic!("unexpected result: {:?}", other.map(|t| t.id)),
        }
    }
}

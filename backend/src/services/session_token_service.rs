//! Bearer session credentials for API clients.
//!
//! A credential is an identity/secret pair stored as an API key labelled
//! `guest_session`. Only the bcrypt hash of the secret is kept, so the
//! secret is readable once, in the response that issues it.

use crate::database::models::{SESSION_KEY_LABEL, SessionCredential, User};
use crate::errors::{ServiceError, ServiceResult};
use crate::repositories::api_key_repository::ApiKeyRepository;
use crate::repositories::user_repository::UserRepository;
use crate::utils::generate_random_string::{
    MAX_GENERATION_ATTEMPTS, generate_random_string, generate_unique,
};
use crate::utils::password::{hash_password, verify_password};
use sqlx::SqlitePool;

pub const KEY_IDENTITY_LENGTH: usize = 32;
pub const KEY_CREDENTIAL_LENGTH: usize = 32;

pub struct SessionTokenService<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SessionTokenService<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Replaces any session credential of the user with a new one.
    ///
    /// # Returns
    /// The identity and the raw secret
    pub async fn issue(&self, user: &User) -> ServiceResult<SessionCredential> {
        let repo = ApiKeyRepository::new(self.pool);
        let repo_ref = &repo;

        let revoked = self.revoke(user).await?;

        let key_identity = generate_unique(
            MAX_GENERATION_ATTEMPTS,
            || generate_random_string(KEY_IDENTITY_LENGTH),
            move |candidate| async move { repo_ref.key_exists(&candidate).await },
        )
        .await?;
        let key_credential = generate_random_string(KEY_CREDENTIAL_LENGTH);
        let credential_hash = hash_password(&key_credential)?;

        repo.create_key(&key_identity, &user.id, SESSION_KEY_LABEL, &credential_hash)
            .await?;

        tracing::info!(
            "Session credential issued for user {} ({} revoked)",
            user.id,
            revoked
        );

        Ok(SessionCredential {
            key_identity,
            key_credential,
        })
    }

    /// Deletes every session credential of the user.
    pub async fn revoke(&self, user: &User) -> ServiceResult<u64> {
        Ok(ApiKeyRepository::new(self.pool)
            .delete_keys_by_owner(&user.id, SESSION_KEY_LABEL)
            .await?)
    }

    /// Resolves the owner of a credential.
    ///
    /// # Errors
    /// `Unauthorized` when the identity is unknown, the secret does not match
    /// or the owner is not active
    pub async fn authenticate(&self, key_identity: &str, key_credential: &str) -> ServiceResult<User> {
        let repo = ApiKeyRepository::new(self.pool);
        let invalid = || ServiceError::unauthorized("Invalid session credential.");

        let key = repo.get_key(key_identity).await?.ok_or_else(invalid)?;
        if key.label != SESSION_KEY_LABEL || !verify_password(key_credential, &key.credential_hash)? {
            return Err(invalid());
        }

        let user = UserRepository::new(self.pool)
            .get_user_by_id(&key.owner_id)
            .await?
            .filter(|user| user.is_active)
            .ok_or_else(invalid)?;

        repo.touch(&key.id).await?;
        Ok(user)
    }
}

//! Optional username capability.
//!
//! Some installations give every account a unique public handle next to the
//! display name. The workflows only see the `UsernameRegistry` trait; the
//! implementation is chosen once at startup.

use crate::database::models::User;
use crate::errors::{ServiceError, ServiceResult};
use crate::repositories::username_repository::UsernameRepository;
use async_trait::async_trait;
use sqlx::SqlitePool;

const MAX_USERNAME_LENGTH: usize = 190;

#[async_trait]
pub trait UsernameRegistry: Send + Sync {
    /// Checks a submitted handle before any account exists.
    ///
    /// Returns the normalized handle to record, or `None` when the
    /// capability is disabled.
    async fn validate(&self, handle: Option<&str>) -> ServiceResult<Option<String>>;

    /// Stores the handle for a freshly created account.
    async fn record(&self, user: &User, handle: &str) -> ServiceResult<()>;
}

/// Registry used when the capability is disabled.
pub struct NoUsernames;

#[async_trait]
impl UsernameRegistry for NoUsernames {
    async fn validate(&self, _handle: Option<&str>) -> ServiceResult<Option<String>> {
        Ok(None)
    }

    async fn record(&self, _user: &User, _handle: &str) -> ServiceResult<()> {
        Ok(())
    }
}

/// Handles stored in the `usernames` table.
pub struct SqliteUsernames {
    pool: SqlitePool,
}

impl SqliteUsernames {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsernameRegistry for SqliteUsernames {
    async fn validate(&self, handle: Option<&str>) -> ServiceResult<Option<String>> {
        let handle = handle.map(str::trim).unwrap_or_default();
        if handle.is_empty() {
            return Err(ServiceError::validation("user", "A username is required."));
        }

        if handle.chars().count() > MAX_USERNAME_LENGTH
            || !handle
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(ServiceError::validation(
                "user",
                "The username contains invalid characters.",
            ));
        }

        let repo = UsernameRepository::new(&self.pool);
        if repo.username_exists(handle).await? {
            return Err(ServiceError::conflict(
                "user",
                format!("The username \"{}\" is already taken.", handle),
            ));
        }

        Ok(Some(handle.to_string()))
    }

    async fn record(&self, user: &User, handle: &str) -> ServiceResult<()> {
        let repo = UsernameRepository::new(&self.pool);
        if repo.get_for_user(&user.id).await?.is_some() {
            return Ok(());
        }
        repo.create(&user.id, handle).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{CreateUser, ROLE_GUEST};
    use crate::database::test_pool;
    use crate::repositories::user_repository::UserRepository;

    #[tokio::test]
    async fn test_disabled_registry_accepts_anything() {
        assert_eq!(NoUsernames.validate(None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_registry_rejects_missing_invalid_and_taken() {
        let pool = test_pool().await;
        let registry = SqliteUsernames::new(pool.clone());

        assert!(matches!(
            registry.validate(Some("  ")).await,
            Err(ServiceError::Validation { .. })
        ));
        assert!(matches!(
            registry.validate(Some("two words")).await,
            Err(ServiceError::Validation { .. })
        ));

        let user = UserRepository::new(&pool)
            .create_user(CreateUser {
                email: "ada@example.com".to_string(),
                name: "Ada".to_string(),
                role: ROLE_GUEST.to_string(),
                is_active: false,
                password_hash: None,
            })
            .await
            .unwrap();

        let handle = registry.validate(Some(" ada ")).await.unwrap().unwrap();
        assert_eq!(handle, "ada");
        registry.record(&user, &handle).await.unwrap();
        // Recording twice keeps the first handle.
        registry.record(&user, "other").await.unwrap();

        assert!(matches!(
            registry.validate(Some("ada")).await,
            Err(ServiceError::Conflict { .. })
        ));
        assert_eq!(
            UsernameRepository::new(&pool)
                .get_for_user(&user.id)
                .await
                .unwrap()
                .as_deref(),
            Some("ada")
        );
    }
}

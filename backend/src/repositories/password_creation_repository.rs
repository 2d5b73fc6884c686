//! Database repository for password reset codes.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::database::models::PasswordCreation;

/// Repository for reset code database operations.
///
/// A user owns at most one code; the table enforces it with a unique key.
pub struct PasswordCreationRepository<'a> {
    /// Shared SQLite connection pool
    pool: &'a SqlitePool,
}

impl<'a> PasswordCreationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Stores a reset code for a user.
    ///
    /// # Arguments
    /// * `code` - Numeric code, also the primary key
    /// * `user_id` - Owner of the code
    /// * `created_at` - Start of the validity window
    pub async fn create(
        &self,
        code: &str,
        user_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<PasswordCreation> {
        let creation = sqlx::query_as::<_, PasswordCreation>(
            r#"
            INSERT INTO password_creations (id, user_id, created_at)
            VALUES (?, ?, ?)
            RETURNING id, user_id, created_at
            "#,
        )
        .bind(code)
        .bind(user_id)
        .bind(created_at)
        .fetch_one(self.pool)
        .await?;

        Ok(creation)
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Option<PasswordCreation>> {
        let creation = sqlx::query_as::<_, PasswordCreation>(
            "SELECT id, user_id, created_at FROM password_creations WHERE id = ?",
        )
        .bind(code)
        .fetch_optional(self.pool)
        .await?;

        Ok(creation)
    }

    pub async fn get_by_user(&self, user_id: &str) -> Result<Option<PasswordCreation>> {
        let creation = sqlx::query_as::<_, PasswordCreation>(
            "SELECT id, user_id, created_at FROM password_creations WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(creation)
    }

    pub async fn code_exists(&self, code: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM password_creations WHERE id = ?")
            .bind(code)
            .fetch_one(self.pool)
            .await?;

        Ok(count > 0)
    }

    pub async fn delete(&self, code: &str) -> Result<bool> {
        let rows_affected = sqlx::query("DELETE FROM password_creations WHERE id = ?")
            .bind(code)
            .execute(self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected > 0)
    }
}

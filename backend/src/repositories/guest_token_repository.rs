//! Database repository for guest confirmation tokens.
//!
//! Tokens are never deleted: once redeemed they stay with `confirmed = 1`
//! as a record of which addresses were proven.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::database::models::GuestToken;

const TOKEN_COLUMNS: &str = "id, user_id, email, token, confirmed, created_at";

/// Repository for confirmation token database operations.
pub struct GuestTokenRepository<'a> {
    /// Shared SQLite connection pool
    pool: &'a SqlitePool,
}

impl<'a> GuestTokenRepository<'a> {
    /// Creates a new GuestTokenRepository instance.
    ///
    /// # Arguments
    /// * `pool` - Reference to SQLite connection pool
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates a new unconfirmed token in the database.
    ///
    /// # Arguments
    /// * `user_id` - Account the token activates or re-addresses
    /// * `email` - Address the token proves
    /// * `token` - Opaque random value sent by email
    ///
    /// # Returns
    /// The newly created GuestToken with all fields populated
    pub async fn create_token(
        &self,
        user_id: &str,
        email: &str,
        token: &str,
        created_at: DateTime<Utc>,
    ) -> Result<GuestToken> {
        let guest_token = sqlx::query_as::<_, GuestToken>(&format!(
            r#"
            INSERT INTO guest_tokens (user_id, email, token, confirmed, created_at)
            VALUES (?, ?, ?, 0, ?)
            RETURNING {TOKEN_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(email)
        .bind(token)
        .bind(created_at)
        .fetch_one(self.pool)
        .await?;

        Ok(guest_token)
    }

    /// Retrieves a token by its opaque value.
    ///
    /// # Returns
    /// `Some(GuestToken)` if found, confirmed or not, `None` otherwise
    pub async fn get_token(&self, token: &str) -> Result<Option<GuestToken>> {
        let guest_token = sqlx::query_as::<_, GuestToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM guest_tokens WHERE token = ?"
        ))
        .bind(token)
        .fetch_optional(self.pool)
        .await?;

        Ok(guest_token)
    }

    pub async fn token_exists(&self, token: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM guest_tokens WHERE token = ?")
            .bind(token)
            .fetch_one(self.pool)
            .await?;

        Ok(count > 0)
    }

    /// Retrieves the most recently issued token for an email.
    pub async fn get_latest_by_email(&self, email: &str) -> Result<Option<GuestToken>> {
        let guest_token = sqlx::query_as::<_, GuestToken>(&format!(
            r#"
            SELECT {TOKEN_COLUMNS} FROM guest_tokens
            WHERE email = ?
            ORDER BY id DESC
            LIMIT 1
            "#
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        Ok(guest_token)
    }

    #[cfg(test)]
    pub async fn get_tokens_by_email(&self, email: &str) -> Result<Vec<GuestToken>> {
        let tokens = sqlx::query_as::<_, GuestToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM guest_tokens WHERE email = ? ORDER BY id"
        ))
        .bind(email)
        .fetch_all(self.pool)
        .await?;

        Ok(tokens)
    }

    /// Marks a single token as confirmed.
    ///
    /// # Returns
    /// `true` if the token was unconfirmed and is now confirmed
    pub async fn mark_confirmed(&self, id: i64) -> Result<bool> {
        let rows_affected =
            sqlx::query("UPDATE guest_tokens SET confirmed = 1 WHERE id = ? AND confirmed = 0")
                .bind(id)
                .execute(self.pool)
                .await?
                .rows_affected();

        Ok(rows_affected > 0)
    }

    /// Confirms every pending token issued for an email.
    ///
    /// # Returns
    /// The number of tokens that changed state
    pub async fn confirm_all_for_email(&self, email: &str) -> Result<u64> {
        let rows_affected =
            sqlx::query("UPDATE guest_tokens SET confirmed = 1 WHERE email = ? AND confirmed = 0")
                .bind(email)
                .execute(self.pool)
                .await?
                .rows_affected();

        Ok(rows_affected)
    }
}

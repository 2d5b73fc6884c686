//! Database repository for the companion username records.

use anyhow::Result;
use sqlx::SqlitePool;

pub struct UsernameRepository<'a> {
    /// Shared SQLite connection pool
    pool: &'a SqlitePool,
}

impl<'a> UsernameRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user_id: &str, username: &str) -> Result<()> {
        sqlx::query("INSERT INTO usernames (user_id, username) VALUES (?, ?)")
            .bind(user_id)
            .bind(username)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM usernames WHERE username = ?")
            .bind(username)
            .fetch_one(self.pool)
            .await?;

        Ok(count > 0)
    }

    pub async fn get_for_user(&self, user_id: &str) -> Result<Option<String>> {
        let username =
            sqlx::query_scalar::<_, String>("SELECT username FROM usernames WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(self.pool)
                .await?;

        Ok(username)
    }
}

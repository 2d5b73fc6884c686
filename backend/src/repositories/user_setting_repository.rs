//! Database repository for per-user settings.

use anyhow::Result;
use serde_json::Value;
use sqlx::SqlitePool;

pub struct UserSettingRepository<'a> {
    /// Shared SQLite connection pool
    pool: &'a SqlitePool,
}

impl<'a> UserSettingRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Stores a setting as JSON text, overwriting any previous value.
    pub async fn set(&self, user_id: &str, key: &str, value: &Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_settings (user_id, key, value)
            VALUES (?, ?, ?)
            ON CONFLICT (user_id, key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(user_id)
        .bind(key)
        .bind(value.to_string())
        .execute(self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, user_id: &str, key: &str) -> Result<Option<Value>> {
        let raw = sqlx::query_scalar::<_, String>(
            "SELECT value FROM user_settings WHERE user_id = ? AND key = ?",
        )
        .bind(user_id)
        .bind(key)
        .fetch_optional(self.pool)
        .await?;

        raw.map(|raw| serde_json::from_str(&raw).map_err(anyhow::Error::from))
            .transpose()
    }
}

//! Database repository for API keys used as guest session credentials.
//!
//! Only the bcrypt hash of a key's secret is stored; the secret itself is
//! handed to the client once, when the key is minted.

use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::database::models::ApiKey;

const KEY_COLUMNS: &str = "id, owner_id, label, credential_hash, created_at, last_accessed_at";

pub struct ApiKeyRepository<'a> {
    /// Shared SQLite connection pool
    pool: &'a SqlitePool,
}

impl<'a> ApiKeyRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Persists a new key.
    ///
    /// # Arguments
    /// * `identity` - Public key identifier, primary key
    /// * `owner_id` - User the key authenticates
    /// * `label` - Purpose of the key
    /// * `credential_hash` - Hash of the secret half
    pub async fn create_key(
        &self,
        identity: &str,
        owner_id: &str,
        label: &str,
        credential_hash: &str,
    ) -> Result<ApiKey> {
        let key = sqlx::query_as::<_, ApiKey>(&format!(
            r#"
            INSERT INTO api_keys (id, owner_id, label, credential_hash, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {KEY_COLUMNS}
            "#
        ))
        .bind(identity)
        .bind(owner_id)
        .bind(label)
        .bind(credential_hash)
        .bind(Utc::now())
        .fetch_one(self.pool)
        .await?;

        Ok(key)
    }

    pub async fn get_key(&self, identity: &str) -> Result<Option<ApiKey>> {
        let key = sqlx::query_as::<_, ApiKey>(&format!(
            "SELECT {KEY_COLUMNS} FROM api_keys WHERE id = ?"
        ))
        .bind(identity)
        .fetch_optional(self.pool)
        .await?;

        Ok(key)
    }

    pub async fn key_exists(&self, identity: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_keys WHERE id = ?")
            .bind(identity)
            .fetch_one(self.pool)
            .await?;

        Ok(count > 0)
    }

    #[cfg(test)]
    pub async fn get_keys_by_owner(&self, owner_id: &str, label: &str) -> Result<Vec<ApiKey>> {
        let keys = sqlx::query_as::<_, ApiKey>(&format!(
            "SELECT {KEY_COLUMNS} FROM api_keys WHERE owner_id = ? AND label = ?"
        ))
        .bind(owner_id)
        .bind(label)
        .fetch_all(self.pool)
        .await?;

        Ok(keys)
    }

    /// Removes every key with this label owned by the user.
    ///
    /// # Returns
    /// The number of keys removed
    pub async fn delete_keys_by_owner(&self, owner_id: &str, label: &str) -> Result<u64> {
        let rows_affected = sqlx::query("DELETE FROM api_keys WHERE owner_id = ? AND label = ?")
            .bind(owner_id)
            .bind(label)
            .execute(self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    pub async fn touch(&self, identity: &str) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_accessed_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(identity)
            .execute(self.pool)
            .await?;

        Ok(())
    }
}

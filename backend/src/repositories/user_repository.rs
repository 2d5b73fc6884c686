//! Database repository for user management operations.
//!
//! Provides CRUD operations for guest accounts. This is the identity store
//! the workflows read and mutate.

use crate::database::models::{CreateUser, User};
use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, email, name, role, is_active, password_hash, session_version, created_at, updated_at";

/// Repository for user database operations.
///
/// Handles all persistence operations for the User entity.
pub struct UserRepository<'a> {
    /// Shared SQLite connection pool
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    /// Creates a new UserRepository instance.
    ///
    /// # Arguments
    /// * `pool` - Reference to SQLite connection pool
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates a new user in the database.
    ///
    /// # Arguments
    /// * `user` - CreateUser DTO containing user details
    ///
    /// # Returns
    /// The newly created User with all fields populated
    pub async fn create_user(&self, user: CreateUser) -> Result<User> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, name, role, is_active, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user.email)
        .bind(user.name)
        .bind(user.role)
        .bind(user.is_active)
        .bind(user.password_hash)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool)
        .await?;

        Ok(user)
    }

    /// Retrieves a user by their unique identifier.
    pub async fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    /// Retrieves a user by their email.
    ///
    /// # Returns
    /// `Some(User)` if found, whatever its activation state, `None` otherwise
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(self.pool)
            .await?;

        Ok(count > 0)
    }

    pub async fn set_active(&self, id: &str, is_active: bool) -> Result<bool> {
        let rows_affected =
            sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
                .bind(is_active)
                .bind(Utc::now())
                .bind(id)
                .execute(self.pool)
                .await?
                .rows_affected();

        Ok(rows_affected > 0)
    }

    pub async fn set_email(&self, id: &str, email: &str) -> Result<bool> {
        let rows_affected = sqlx::query("UPDATE users SET email = ?, updated_at = ? WHERE id = ?")
            .bind(email)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected > 0)
    }

    pub async fn set_name(&self, id: &str, name: &str) -> Result<bool> {
        let rows_affected = sqlx::query("UPDATE users SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected > 0)
    }

    /// Invalidates every cookie session of the user.
    ///
    /// # Returns
    /// The new session version
    pub async fn bump_session_version(&self, id: &str) -> Result<i64> {
        let version: i64 = sqlx::query_scalar(
            r#"
            UPDATE users SET session_version = session_version + 1, updated_at = ?
            WHERE id = ?
            RETURNING session_version
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .fetch_one(self.pool)
        .await?;

        Ok(version)
    }

    /// Stores an already hashed password.
    pub async fn set_password_hash(&self, id: &str, password_hash: Option<&str>) -> Result<bool> {
        let rows_affected =
            sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
                .bind(password_hash)
                .bind(Utc::now())
                .bind(id)
                .execute(self.pool)
                .await?
                .rows_affected();

        Ok(rows_affected > 0)
    }
}

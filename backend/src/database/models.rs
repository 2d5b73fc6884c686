//! Rust structs that represent database table mappings.
//!
//! These models define the structure of data as it is stored in and retrieved
//! from the database, along with the request payloads of the guest endpoints.
//! Note that these may differ from API-specific models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::collections::HashMap;
use validator::Validate;

/// Role given to self-registered accounts.
pub const ROLE_GUEST: &str = "guest";

/// Label of the API keys minted as guest session credentials.
pub const SESSION_KEY_LABEL: &str = "guest_session";

/// Site permission role granted at registration.
pub const SITE_ROLE_VIEWER: &str = "viewer";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub is_active: bool,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    /// Bumped on logout; cookie sessions signed for an older value are dead.
    #[serde(skip_serializing)]
    pub session_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub name: String,
    pub role: String,
    pub is_active: bool,
    pub password_hash: Option<String>,
}

/// Single-use proof of control of an email address.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GuestToken {
    pub id: i64,
    pub user_id: String,
    pub email: String,
    pub token: String,
    pub confirmed: bool,
    pub created_at: DateTime<Utc>,
}

/// Numeric password reset code.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PasswordCreation {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ApiKey {
    pub id: String,
    pub owner_id: String,
    pub label: String,
    pub credential_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Site {
    pub id: i64,
    pub slug: String,
    pub title: String,
}

/// Registration payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: Option<String>,
    /// Display name, defaults to the email.
    pub username: Option<String>,
    pub password: Option<String>,
    /// Site id or slug, required when registration is scoped to a site.
    pub site: Option<String>,
    /// Handle for the username capability.
    pub handle: Option<String>,
    #[serde(default)]
    pub settings: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
    /// Reset code received by email. Absent when requesting a code.
    pub token: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Validate)]
pub struct ChangePassword {
    #[validate(length(min = 1, message = "Existing password empty."))]
    pub password: String,
    #[validate(length(min = 6, message = "New password should have 6 characters or more."))]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCredential {
    pub key_identity: String,
    pub key_credential: String,
}

/// Public representation of an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role.clone(),
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

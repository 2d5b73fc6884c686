//! Data structures for authentication-related entities.
//!
//! This module defines the login payload, the login result and the
//! request-scoped identity resolved by the middleware.

use crate::database::models::{SessionCredential, User};
use serde::Deserialize;

/// Name of the cookie carrying the web session.
pub const SESSION_COOKIE: &str = "guest_session";

/// Login request payload
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Query string of the login endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    /// Redirect target; the response is then a redirect without credential.
    pub redirect: Option<String>,
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub user: User,
    /// Signed value of the session cookie, when cookie sessions are enabled.
    pub session_cookie: Option<String>,
    pub credential: Option<SessionCredential>,
}

/// Identity of the current request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user: Option<User>,
}

impl RequestContext {
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }
}

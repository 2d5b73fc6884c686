//! Defines the HTTP routes specifically for authentication.
//!
//! These routes handle login, logout, session credentials and the caller's
//! own account. They are merged into the guest API router, which adds the
//! CORS check and identity resolution.

use crate::auth::handlers::*;
use axum::{
    Router,
    routing::{get, post},
};

/// Creates the authentication router with all auth-related routes
pub fn auth_router() -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/session-token", get(session_token).post(session_token))
        .route("/me", get(me).patch(update_me))
}

//! Defines the HTTP routes of the guest API and of the confirmation links.

use super::handlers::{confirm, confirm_email, forgot_password, register, validate_email};
use crate::api::cors::guest_cors;
use crate::auth::middleware::resolve_identity;
use crate::auth::routes::auth_router;
use axum::{
    Router, middleware,
    routing::{get, post},
};

/// JSON API, mounted under `/api/guest`.
///
/// The CORS check runs before identity resolution so refused origins never
/// reach the database.
pub fn guest_api_router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/forgot-password", post(forgot_password))
        .merge(auth_router())
        .layer(middleware::from_fn(resolve_identity))
        .layer(middleware::from_fn(guest_cors))
}

/// Links sent by email, mounted under `/guest`.
pub fn confirmation_router() -> Router {
    Router::new()
        .route("/confirm", get(confirm))
        .route("/confirm-email", get(confirm_email))
        .route("/validate-email", get(validate_email))
}

//! Central module for organizing the application's HTTP surface.
//!
//! The guest JSON API and the confirmation links share the JSend envelope
//! of `common`; CORS applies to the JSON API only.

pub mod common;
pub mod cors;
pub mod guest;

use crate::api::common::ApiResponse;
use crate::state::AppState;
use axum::{Extension, Router, routing::get};
use serde_json::json;

/// Full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .nest("/api/guest", guest::routes::guest_api_router())
        .nest("/guest", guest::routes::confirmation_router())
        .layer(Extension(state))
}

async fn root_handler() -> ApiResponse {
    ApiResponse::success(json!({
        "service": "Guest Backend",
        "version": env!("CARGO_PKG_VERSION"),
    }))
    .with_message("Welcome to the guest API")
}

//! Handler functions for authentication-related API endpoints.
//!
//! These functions process login, logout, session credentials and the
//! caller's own account, delegating to `auth::service` and
//! `services::account_service` for the business rules.

use crate::api::common::{ApiResponse, json_body};
use crate::api::cors::session_cookie;
use crate::auth::models::*;
use crate::auth::service::AuthService;
use crate::database::models::UserInfo;
use crate::services::account_service::AccountService;
use crate::state::AppState;
use axum::{
    extract::{Extension, Json, Query, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde_json::{Map, Value, json};

fn cleared_session() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

/// Handle user login request
#[axum::debug_handler]
pub async fn login(
    Extension(state): Extension<AppState>,
    Extension(context): Extension<RequestContext>,
    Query(query): Query<LoginQuery>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let payload = match json_body(payload) {
        Ok(payload) => payload,
        Err(response) => return response.into_response(),
    };

    let with_credential = query.redirect.is_none();
    let outcome = match AuthService::new(&state)
        .login(payload, context.user(), with_credential)
        .await
    {
        Ok(outcome) => outcome,
        Err(error) => return ApiResponse::from(error).into_response(),
    };

    let jar = match outcome.session_cookie {
        Some(value) => jar.add(session_cookie(value)),
        None => jar,
    };

    if let Some(redirect) = query.redirect {
        return (jar, Redirect::to(&redirect)).into_response();
    }

    let data = json!({
        "user": UserInfo::from(&outcome.user),
        "session_token": outcome.credential,
    });
    (jar, ApiResponse::success(data)).into_response()
}

/// Handle logout request: revokes credentials and clears the cookie session
#[axum::debug_handler]
pub async fn logout(
    Extension(state): Extension<AppState>,
    Extension(context): Extension<RequestContext>,
    jar: CookieJar,
) -> Response {
    match AuthService::new(&state).logout(context.user()).await {
        Ok(()) => (
            jar.remove(cleared_session()),
            ApiResponse::success(Value::Null).with_message("Successfully logged out."),
        )
            .into_response(),
        Err(error) => ApiResponse::from(error).into_response(),
    }
}

/// Rotate the session credential of the caller
#[axum::debug_handler]
pub async fn session_token(
    Extension(state): Extension<AppState>,
    Extension(context): Extension<RequestContext>,
) -> Result<ApiResponse, ApiResponse> {
    let credential = AuthService::new(&state)
        .session_token(context.user())
        .await?;

    Ok(ApiResponse::success(json!({ "session_token": credential })))
}

/// Get the caller's account
#[axum::debug_handler]
pub async fn me(Extension(context): Extension<RequestContext>) -> Result<ApiResponse, ApiResponse> {
    let user = context.user().ok_or_else(unauthorized)?;
    Ok(ApiResponse::success(json!({ "user": UserInfo::from(user) })))
}

/// Partial update of the caller's account
#[axum::debug_handler]
pub async fn update_me(
    Extension(state): Extension<AppState>,
    Extension(context): Extension<RequestContext>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<ApiResponse, ApiResponse> {
    let user = context.user().ok_or_else(unauthorized)?;
    let data = json_body(payload)?;

    let update = AccountService::new(&state).update_me(user, data).await?;
    let response = ApiResponse::success(json!({ "user": UserInfo::from(&update.user) }));

    Ok(match update.message {
        Some(message) => response.with_message(message),
        None => response,
    })
}

fn unauthorized() -> ApiResponse {
    ApiResponse::fail_field("user", "Unauthorized access.").with_status(StatusCode::UNAUTHORIZED)
}

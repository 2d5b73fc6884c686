//! Handler functions for guest registration, password reset and the
//! confirmation links sent by email.

use crate::api::common::{ApiResponse, json_body};
use crate::auth::models::RequestContext;
use crate::database::models::{ForgotPasswordRequest, RegisterRequest, TokenQuery, UserInfo};
use crate::errors::ServiceError;
use crate::services::confirmation_service::{Confirmation, ConfirmationService};
use crate::services::password_reset_service::{ForgotPassword, PasswordResetService};
use crate::services::registration_service::RegistrationService;
use crate::state::AppState;
use crate::utils::non_blank;
use axum::extract::{Extension, Json, Query, rejection::JsonRejection};
use serde_json::json;

/// Registers a guest account
#[axum::debug_handler]
pub async fn register(
    Extension(state): Extension<AppState>,
    Extension(context): Extension<RequestContext>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<ApiResponse, ApiResponse> {
    let request = json_body(payload)?;

    let registration = RegistrationService::new(&state)
        .register(request, context.user())
        .await?;

    Ok(
        ApiResponse::success(json!({ "user": UserInfo::from(&registration.user) }))
            .with_message(registration.message),
    )
}

/// Sends a reset code, or redeems one when the payload carries a token
#[axum::debug_handler]
pub async fn forgot_password(
    Extension(state): Extension<AppState>,
    Extension(context): Extension<RequestContext>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<ApiResponse, ApiResponse> {
    let request = json_body(payload)?;

    let outcome = PasswordResetService::new(&state)
        .forgot_password(request, context.user())
        .await?;

    Ok(match outcome {
        ForgotPassword::CodeSent { email } => ApiResponse::success(json!({ "email": email })),
        ForgotPassword::PasswordReset(user) => {
            ApiResponse::success(json!({ "user": UserInfo::from(&user) }))
        }
    })
}

fn token(query: &TokenQuery) -> Result<&str, ApiResponse> {
    non_blank(query.token.as_ref())
        .ok_or_else(|| ServiceError::validation("token", "Invalid token.").into())
}

fn confirmed(confirmation: Confirmation) -> ApiResponse {
    ApiResponse::success(json!({ "user": UserInfo::from(&confirmation.user) }))
        .with_message(confirmation.message)
}

/// Link of the registration email
#[axum::debug_handler]
pub async fn confirm(
    Extension(state): Extension<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<ApiResponse, ApiResponse> {
    let confirmation = ConfirmationService::new(&state)
        .confirm_registration(token(&query)?)
        .await?;
    Ok(confirmed(confirmation))
}

/// Link of the email confirmation message
#[axum::debug_handler]
pub async fn confirm_email(
    Extension(state): Extension<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<ApiResponse, ApiResponse> {
    let confirmation = ConfirmationService::new(&state)
        .confirm_email(token(&query)?)
        .await?;
    Ok(confirmed(confirmation))
}

/// Link of the email change message
#[axum::debug_handler]
pub async fn validate_email(
    Extension(state): Extension<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<ApiResponse, ApiResponse> {
    let confirmation = ConfirmationService::new(&state)
        .validate_email(token(&query)?)
        .await?;
    Ok(confirmed(confirmation))
}

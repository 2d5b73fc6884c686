//! Middleware resolving the identity of each request.
//!
//! A request is authenticated either by a bearer session credential
//! (`Authorization: Bearer <identity>:<secret>`) or by the session cookie.
//! Invalid credentials leave the request anonymous; handlers decide whether
//! an identity is required. A cookie only counts while its session version
//! matches the account's, so logging out ends every cookie session.

use crate::api::common::service_error_to_jsend;
use crate::auth::models::{RequestContext, SESSION_COOKIE};
use crate::database::models::User;
use crate::errors::{ServiceError, ServiceResult};
use crate::repositories::user_repository::UserRepository;
use crate::services::session_token_service::SessionTokenService;
use crate::state::AppState;
use axum::{
    Extension,
    extract::Request,
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;

/// Splits `Bearer <identity>:<secret>`.
pub fn bearer_credential(headers: &HeaderMap) -> Option<(&str, &str)> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())?;

    let credential = auth_header.strip_prefix("Bearer ")?;
    credential
        .trim()
        .split_once(':')
        .filter(|(identity, secret)| !identity.is_empty() && !secret.is_empty())
}

/// Identity middleware: always inserts a `RequestContext`.
pub async fn resolve_identity(
    Extension(state): Extension<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let user = match identify(&state, request.headers(), &jar).await {
        Ok(user) => user,
        Err(error) => return service_error_to_jsend(error).into_response(),
    };

    request.extensions_mut().insert(RequestContext { user });
    next.run(request).await
}

async fn identify(
    state: &AppState,
    headers: &HeaderMap,
    jar: &CookieJar,
) -> ServiceResult<Option<User>> {
    if let Some((identity, secret)) = bearer_credential(headers) {
        return match SessionTokenService::new(&state.pool)
            .authenticate(identity, secret)
            .await
        {
            Ok(user) => Ok(Some(user)),
            Err(ServiceError::Unauthorized { message }) => {
                tracing::debug!("Session credential rejected: {}", message);
                Ok(None)
            }
            Err(error) => Err(error),
        };
    }

    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Ok(None);
    };
    let claims = match state.jwt.validate_token(cookie.value()) {
        Ok(claims) => claims,
        Err(error) => {
            tracing::debug!("Session cookie rejected: {}", error);
            return Ok(None);
        }
    };

    let user = UserRepository::new(&state.pool)
        .get_user_by_id(claims.user_id())
        .await?;
    Ok(user.filter(|user| user.is_active && user.session_version == claims.ver))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_credential_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_credential(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc:def"));
        assert_eq!(bearer_credential(&headers), Some(("abc", "def")));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_credential(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc:def"));
        assert_eq!(bearer_credential(&headers), None);
    }
}

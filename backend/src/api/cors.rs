//! CORS allow-list check for the guest API.
//!
//! Browser clients call the API from other origins with credentials, so the
//! allowed origin is reflected instead of `*` whenever an allow-list is set,
//! and the session cookie is re-sent as a cross-site cookie.

use crate::api::common::ApiResponse;
use crate::auth::models::SESSION_COOKIE;
use crate::state::AppState;
use axum::{
    Extension,
    extract::Request,
    http::{
        HeaderValue, Method, StatusCode,
        header::{
            ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
            ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN, SET_COOKIE, VARY,
        },
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

const ALLOWED_METHODS: &str = "GET, POST, PATCH, OPTIONS";
const ALLOWED_HEADERS: &str = "Authorization, Content-Type";

/// Session cookie attributes required for cross-site API calls.
pub fn session_cookie(value: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .build()
}

/// Origin to send back, `None` when the request is not allowed.
pub fn allowed_origin(allow_list: &[String], origin: Option<&str>) -> Option<String> {
    if allow_list.is_empty() || allow_list.iter().any(|allowed| allowed == "*") {
        return Some("*".to_string());
    }
    origin
        .filter(|origin| allow_list.iter().any(|allowed| allowed == origin))
        .map(str::to_string)
}

/// CORS middleware of the guest API
pub async fn guest_cors(
    Extension(state): Extension<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(ORIGIN)
        .and_then(|value| value.to_str().ok());

    let Some(allow_origin) = allowed_origin(&state.policy().cors_origins, origin) else {
        tracing::warn!("Request from origin {:?} refused", origin);
        return ApiResponse::fail_field("user", "Access forbidden.")
            .with_status(StatusCode::FORBIDDEN)
            .into_response();
    };

    let session = CookieJar::from_headers(request.headers())
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string());
    let is_preflight = request.method() == Method::OPTIONS;

    let mut response = if is_preflight {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&allow_origin) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    if allow_origin != "*" {
        headers.insert(
            ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.append(VARY, HeaderValue::from_static("Origin"));
    }
    if is_preflight {
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );
    }

    let sets_session = headers.get_all(SET_COOKIE).iter().any(|value| {
        value
            .to_str()
            .is_ok_and(|value| value.starts_with(&format!("{}=", SESSION_COOKIE)))
    });
    if let Some(value) = session.filter(|_| !sets_session) {
        if let Ok(cookie) = HeaderValue::from_str(&session_cookie(value).to_string()) {
            headers.append(SET_COOKIE, cookie);
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_allows_any_origin() {
        let allow = vec!["*".to_string()];
        assert_eq!(allowed_origin(&allow, None).as_deref(), Some("*"));
        assert_eq!(
            allowed_origin(&allow, Some("https://app.example")).as_deref(),
            Some("*")
        );
    }

    #[test]
    fn test_listed_origin_is_reflected() {
        let allow = vec!["https://app.example".to_string()];
        assert_eq!(
            allowed_origin(&allow, Some("https://app.example")).as_deref(),
            Some("https://app.example")
        );
        assert_eq!(allowed_origin(&allow, Some("https://evil.example")), None);
        assert_eq!(allowed_origin(&allow, None), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("abc".to_string()).to_string();
        assert!(cookie.starts_with("guest_session=abc"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("SameSite=None"));
    }
}

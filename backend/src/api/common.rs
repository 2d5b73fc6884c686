//! JSend response envelope shared by the guest endpoints.
//!
//! Provides the response format and the conversion from service-layer errors.
//!
//! # Response Format
//! All responses are JSON objects containing:
//! - `status`: `success`, `fail` (caller error) or `error` (server error)
//! - `data`: payload, or field-scoped messages for a fail
//! - `message`: human-readable message, always present on error
//! - `code`: numeric code of an error
//!
//! A fail answers HTTP 400 and an error HTTP 500 unless another status is set.

use crate::errors::ServiceError;
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_ERROR_MESSAGE: &str = "An internal error has occurred.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JSendStatus {
    Success,
    Fail,
    Error,
}

/// Body of every guest endpoint response
#[derive(Debug, Serialize, Deserialize)]
pub struct JSend {
    pub status: JSendStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

/// JSend body paired with its HTTP status
#[derive(Debug)]
pub struct ApiResponse {
    pub status_code: StatusCode,
    pub body: JSend,
}

impl ApiResponse {
    /// Create a successful response
    pub fn success(data: Value) -> Self {
        Self {
            status_code: StatusCode::OK,
            body: JSend {
                status: JSendStatus::Success,
                data: Some(data),
                message: None,
                code: None,
            },
        }
    }

    /// Create a caller error response with field-scoped messages
    pub fn fail(data: Value) -> Self {
        Self {
            status_code: StatusCode::BAD_REQUEST,
            body: JSend {
                status: JSendStatus::Fail,
                data: Some(data),
                message: None,
                code: None,
            },
        }
    }

    /// Fail with a single message scoped to `field`.
    pub fn fail_field(field: &str, message: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert(field.to_string(), Value::String(message.into()));
        Self::fail(Value::Object(data))
    }

    /// Fail without data: the message is wrapped as `{"fail": message}`.
    pub fn fail_message(message: impl Into<String>) -> Self {
        Self::fail_field("fail", message)
    }

    /// Create a server error response
    pub fn error(message: Option<String>) -> Self {
        Self {
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
            body: JSend {
                status: JSendStatus::Error,
                data: None,
                message: Some(message.unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string())),
                code: Some(StatusCode::INTERNAL_SERVER_ERROR.as_u16()),
            },
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.body.message = Some(message.into());
        self
    }

    /// Overrides the default HTTP status of the envelope.
    pub fn with_status(mut self, status_code: StatusCode) -> Self {
        self.status_code = status_code;
        if self.body.status == JSendStatus::Error {
            self.body.code = Some(status_code.as_u16());
        }
        self
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.status_code, Json(self.body)).into_response()
    }
}

/// Converts ServiceError to the JSend envelope
pub fn service_error_to_jsend(error: ServiceError) -> ApiResponse {
    match error {
        ServiceError::Validation { field, message }
        | ServiceError::Conflict { field, message }
        | ServiceError::Expired { field, message } => ApiResponse::fail_field(&field, message),
        ServiceError::NotFound { entity, identifier } => {
            tracing::debug!("{} not found: {}", entity, identifier);
            ApiResponse::fail_field(
                &entity.to_lowercase(),
                format!("{} not found.", entity),
            )
        }
        ServiceError::PermissionDenied { message } => {
            ApiResponse::fail_field("user", message).with_status(StatusCode::FORBIDDEN)
        }
        ServiceError::Unauthorized { message } => {
            ApiResponse::fail_field("user", message).with_status(StatusCode::UNAUTHORIZED)
        }
        ServiceError::Database { source } => {
            tracing::error!("Database error: {}", source);
            ApiResponse::error(None)
        }
        ServiceError::ExternalService { message } | ServiceError::InternalError { message } => {
            tracing::error!("Request failed: {}", message);
            ApiResponse::error(Some(message))
        }
    }
}

/// Unwraps a JSON body, turning a malformed one into a JSend fail.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiResponse> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        tracing::debug!("Rejected request body: {}", rejection.body_text());
        ApiResponse::fail_message(rejection.body_text()).with_status(rejection.status())
    })
}

impl From<ServiceError> for ApiResponse {
    fn from(error: ServiceError) -> Self {
        service_error_to_jsend(error)
    }
}

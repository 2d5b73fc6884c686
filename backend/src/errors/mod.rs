//! Global application error types and handlers.
//!
//! This module defines the error type shared by repositories, services and
//! handlers. Each variant maps onto a JSend status in `api::common`.

use thiserror::Error;

/// Generic service error that can be used across all workflows
#[derive(Debug, Error)]
pub enum ServiceError {
    /// User-correctable input problem, scoped to a field.
    #[error("Validation error on {field}: {message}")]
    Validation { field: String, message: String },

    /// The request conflicts with existing state (already registered, used token).
    #[error("Conflict on {field}: {message}")]
    Conflict { field: String, message: String },

    #[error("{entity} not found: {identifier}")]
    NotFound { entity: String, identifier: String },

    /// A time-limited record is no longer usable.
    #[error("Expired {field}: {message}")]
    Expired { field: String, message: String },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Database error: {source}")]
    Database {
        #[from]
        source: anyhow::Error,
    },

    #[error("External service error: {message}")]
    ExternalService { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    // Helper constructors for common patterns

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn conflict(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            identifier: identifier.into(),
        }
    }

    pub fn expired(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Expired {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn external_service(message: impl Into<String>) -> Self {
        Self::ExternalService {
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Field and message of a user-facing failure, `None` for server-side errors.
    pub fn fail_parts(&self) -> Option<(&str, &str)> {
        match self {
            Self::Validation { field, message }
            | Self::Conflict { field, message }
            | Self::Expired { field, message } => Some((field, message)),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database {
            source: error.into(),
        }
    }
}

/// Keeps the first failing field, matching the single-message JSend fail.
impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut field_errors: Vec<(String, String)> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    (
                        field.to_string(),
                        error
                            .message
                            .as_ref()
                            .map(|message| message.to_string())
                            .unwrap_or_else(|| "Invalid value".to_string()),
                    )
                })
            })
            .collect();
        field_errors.sort();

        match field_errors.into_iter().next() {
            Some((field, message)) => Self::validation(field, message),
            None => Self::validation("request", "Invalid value"),
        }
    }
}

/// Whether a repository error comes from a UNIQUE constraint.
pub fn is_unique_violation(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<sqlx::Error>()
        .and_then(|error| error.as_database_error())
        .is_some_and(|error| error.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 3, message = "Too short."))]
        name: String,
    }

    #[test]
    fn test_validation_errors_keep_field_and_message() {
        let error: ServiceError = Sample {
            name: "ab".to_string(),
        }
        .validate()
        .unwrap_err()
        .into();

        assert_eq!(error.fail_parts(), Some(("name", "Too short.")));
    }
}

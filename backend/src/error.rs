//! Error handling for the Farm Surveillance Platform
//!
//! Every error renders as `{"error": {"code", "message", "field"?}}`

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::sampling::SamplingError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {message}")]
    Conflict { resource: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Calculation unavailable: {0}")]
    CalculationUnavailable(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    // Boundary mapping links
    #[error("Invalid link: {0}")]
    InvalidLink(String),

    #[error("Expired link: {0}")]
    ExpiredLink(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a field-level validation error
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// A unique-constraint failure becomes a conflict on `resource`; other
    /// database errors pass through
    pub fn conflict_on_unique(err: sqlx::Error, resource: &str, message: &str) -> Self {
        let unique = err
            .as_database_error()
            .map_or(false, |db| db.is_unique_violation());
        if unique {
            AppError::Conflict {
                resource: resource.to_string(),
                message: message.to_string(),
            }
        } else {
            AppError::DatabaseError(err)
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        // Report the first failing field; clients re-submit after fixing it
        let first = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for {}", field));
                (field.to_string(), message)
            });

        match first {
            Some((field, message)) => AppError::Validation { field, message },
            None => AppError::ValidationError(errors.to_string()),
        }
    }
}

impl From<SamplingError> for AppError {
    fn from(err: SamplingError) -> Self {
        match err {
            SamplingError::PopulationUnavailable => {
                AppError::CalculationUnavailable(err.to_string())
            }
            SamplingError::UnsupportedConfidence(_) => AppError::Validation {
                field: "confidence_level".to_string(),
                message: err.to_string(),
            },
            SamplingError::InvalidPrevalence(_) => AppError::Validation {
                field: "prevalence_p".to_string(),
                message: err.to_string(),
            },
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("INVALID_CREDENTIALS", "Invalid username or password"),
            ),
            AppError::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new(
                    "INSUFFICIENT_PERMISSIONS",
                    "You do not have permission to perform this action",
                ),
            ),
            AppError::Unauthorized { message } => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("UNAUTHORIZED", message.clone()),
            ),
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message: message.clone(),
                    field: Some(field.clone()),
                },
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", msg.clone()),
            ),
            AppError::Conflict { resource, message } => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    code: "CONFLICT".to_string(),
                    message: message.clone(),
                    field: Some(resource.clone()),
                },
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", format!("{} not found", resource)),
            ),
            AppError::InvalidStateTransition(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new("INVALID_STATE_TRANSITION", msg.clone()),
            ),
            AppError::CalculationUnavailable(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new("CALCULATION_UNAVAILABLE", msg.clone()),
            ),
            AppError::StorageError(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail::new("STORAGE_ERROR", format!("Storage error: {}", msg)),
            ),
            AppError::InvalidLink(msg) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("INVALID_LINK", msg.clone()),
            ),
            AppError::ExpiredLink(msg) => (
                StatusCode::GONE,
                ErrorDetail::new("EXPIRED_LINK", msg.clone()),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred"),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg.clone()),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred"),
            ),
        };

        // Log the error for debugging
        tracing::error!("Error: {:?}", self);

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AppError::InsufficientPermissions, StatusCode::FORBIDDEN),
            (AppError::field("email", "bad"), StatusCode::BAD_REQUEST),
            (AppError::NotFound("Farm".into()), StatusCode::NOT_FOUND),
            (
                AppError::Conflict {
                    resource: "username".into(),
                    message: "taken".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                AppError::InvalidStateTransition("done".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AppError::StorageError("disk full".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::ExpiredLink("This mapping link has expired.".into()),
                StatusCode::GONE,
            ),
            (AppError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[derive(Debug)]
    struct FakeDbError(sqlx::error::ErrorKind);

    impl std::fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }

    impl std::error::Error for FakeDbError {}

    impl sqlx::error::DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            "constraint failed"
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            match self.0 {
                sqlx::error::ErrorKind::UniqueViolation => sqlx::error::ErrorKind::UniqueViolation,
                _ => sqlx::error::ErrorKind::Other,
            }
        }
    }

    #[test]
    fn test_unique_violation_becomes_conflict() {
        let err = sqlx::Error::Database(Box::new(FakeDbError(
            sqlx::error::ErrorKind::UniqueViolation,
        )));
        let mapped = AppError::conflict_on_unique(err, "username", "taken");
        assert_eq!(mapped.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_other_database_errors_pass_through() {
        let err = sqlx::Error::Database(Box::new(FakeDbError(sqlx::error::ErrorKind::Other)));
        let mapped = AppError::conflict_on_unique(err, "username", "taken");
        assert!(matches!(mapped, AppError::DatabaseError(_)));

        let mapped = AppError::conflict_on_unique(sqlx::Error::RowNotFound, "username", "taken");
        assert_eq!(mapped.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_sampling_errors_map() {
        let err: AppError = SamplingError::PopulationUnavailable.into();
        assert!(matches!(err, AppError::CalculationUnavailable(_)));
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);

        let err: AppError = SamplingError::UnsupportedConfidence(70).into();
        match err {
            AppError::Validation { field, .. } => assert_eq!(field, "confidence_level"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::models::event_image::ImageError;
use domain::models::registration::RegistrationFormatError;
use domain::models::ticket::IssuePreconditionError;
use domain::services::CheckoutError;
use persistence::db::pg_codes;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Attendee fields match none of the accepted registration shapes.
    #[error("Invalid registration format: {0}")]
    InvalidRegistrationFormat(RegistrationFormatError),

    /// The request is well formed but refers to something that cannot be acted on.
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Bad gateway: {0}")]
    BadGateway(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<ValidationDetail>>,
}

#[derive(Debug, Serialize)]
pub struct ValidationDetail {
    pub field: String,
    pub message: String,
}

impl ApiError {
    /// Whether the caller (or the provider) should retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Internal(_) | ApiError::ServiceUnavailable(_) | ApiError::BadGateway(_)
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut details = None;
        let (status, error_code, message) = match &self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            ApiError::InvalidRegistrationFormat(reason) => {
                if let RegistrationFormatError::InvalidField { field, message } = reason {
                    details = Some(vec![ValidationDetail {
                        field: field.clone(),
                        message: message.clone(),
                    }]);
                }
                (
                    StatusCode::BAD_REQUEST,
                    "invalid_registration_format",
                    reason.to_string(),
                )
            }
            ApiError::Unprocessable(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "unprocessable",
                msg.clone(),
            ),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".into(),
                )
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg.clone(),
            ),
            ApiError::BadGateway(msg) => {
                tracing::warn!("Upstream error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "bad_gateway",
                    "The payment provider could not be reached".into(),
                )
            }
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".into()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(pg_codes::UNIQUE_VIOLATION) => {
                    ApiError::Conflict("Resource already exists".into())
                }
                Some(pg_codes::FOREIGN_KEY_VIOLATION) => {
                    ApiError::NotFound("Referenced resource not found".into())
                }
                Some(pg_codes::CHECK_VIOLATION) => ApiError::Validation(format!(
                    "Constraint {} rejected the change",
                    db_err.constraint().unwrap_or("unknown")
                )),
                _ => ApiError::Internal(format!("Database error: {}", db_err)),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                ApiError::ServiceUnavailable("Database unavailable".into())
            }
            _ => ApiError::Internal(format!("Database error: {}", err)),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details: Vec<ValidationDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| ValidationDetail {
                    field: field.to_string(),
                    message: e.message.clone().map(|m| m.to_string()).unwrap_or_default(),
                })
            })
            .collect();

        let message = if details.len() == 1 {
            details[0].message.clone()
        } else {
            format!("{} validation errors", details.len())
        };

        ApiError::Validation(message)
    }
}

impl From<RegistrationFormatError> for ApiError {
    fn from(err: RegistrationFormatError) -> Self {
        ApiError::InvalidRegistrationFormat(err)
    }
}

impl From<ImageError> for ApiError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            ImageError::DisplayOrderTaken(_) => ApiError::Conflict(err.to_string()),
        }
    }
}

impl From<IssuePreconditionError> for ApiError {
    fn from(err: IssuePreconditionError) -> Self {
        ApiError::Unprocessable(err.to_string())
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::BadGateway(err.to_string())
    }
}

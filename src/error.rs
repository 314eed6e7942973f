//! # Error Handling
//!
//! This module defines the HTTP-facing error type and how it is converted to
//! JSON responses. Pipeline failures ([`AnalysisError`]) are translated here,
//! at the boundary, so the analysis code never needs to know about status codes.
//!
//! ## Key Rust Concepts for Error Handling:
//! - **Result<T, E>**: Forces you to handle both success and failure cases
//! - **Enums for Error Types**: Each variant represents a different kind of failure
//! - **From trait**: Automatically converts between error types so `?` just works
//! - **ResponseError trait**: Converts errors to HTTP responses

use crate::analysis::error::AnalysisError;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the application.
///
/// ## Error Categories:
/// - **Internal**: Server-side problems (500 errors)
/// - **BadRequest**: Client sent invalid data, e.g. no audio file (400 errors)
/// - **NotFound**: Requested route doesn't exist (404 errors)
/// - **ConfigError**: Configuration problems (500 errors)
/// - **ValidationError**: Data validation failed (400 errors)
/// - **Processing**: The analysis pipeline failed; `details` carries the cause (500 errors)
///
/// ## Usage Example:
/// ```rust
/// return Err(AppError::BadRequest("No audio file uploaded".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    Internal(String),
    BadRequest(String),
    NotFound(String),
    ConfigError(String),
    ValidationError(String),
    Processing { details: String },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Processing { details } => write!(f, "Processing error: {}", details),
        }
    }
}

/// Converts our errors into HTTP responses.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "processing_error",
///     "message": "Internal Server Error",
///     "details": "failed to decode audio: unrecognized audio container",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
/// `details` is `null` for every type except `processing_error`.
impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;

        match self {
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) | AppError::ConfigError(_) | AppError::Processing { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_type, message, details) = match self {
            AppError::Internal(msg) => ("internal_error", msg.clone(), None),
            AppError::BadRequest(msg) => ("bad_request", msg.clone(), None),
            AppError::NotFound(msg) => ("not_found", msg.clone(), None),
            AppError::ConfigError(msg) => ("config_error", msg.clone(), None),
            AppError::ValidationError(msg) => ("validation_error", msg.clone(), None),
            AppError::Processing { details } => (
                "processing_error",
                "Internal Server Error".to_string(),
                Some(details.clone()),
            ),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "details": details,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Map pipeline failures to HTTP errors.
///
/// A missing payload is the caller's mistake (400). Anything else happened
/// while processing a file we accepted, so it is a 500 with the cause
/// attached for diagnosis.
impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::EmptyInput => AppError::BadRequest("No audio file uploaded".to_string()),
            other => AppError::Processing {
                details: other.to_string(),
            },
        }
    }
}

/// When you use `?` with an anyhow::Error, it automatically becomes an AppError::Internal.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors are almost always due to the client sending malformed
/// data, so they become a 400 rather than a 500.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use actix_web::http::StatusCode;

    #[test]
    fn test_analysis_error_mapping() {
        let err: AppError = AnalysisError::EmptyInput.into();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err: AppError = AnalysisError::Decode("bad header".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        match err {
            AppError::Processing { details } => assert!(details.contains("bad header")),
            other => panic!("unexpected mapping: {:?}", other),
        }
    }

    #[actix_web::test]
    async fn test_processing_error_body() {
        let err = AppError::Processing {
            details: "frame 2 contains no samples".to_string(),
        };
        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["error"]["type"], "processing_error");
        assert_eq!(json["error"]["message"], "Internal Server Error");
        assert_eq!(json["error"]["details"], "frame 2 contains no samples");
    }

    #[actix_web::test]
    async fn test_bad_request_has_null_details() {
        let err = AppError::BadRequest("No audio file uploaded".to_string());
        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["error"]["type"], "bad_request");
        assert!(json["error"]["details"].is_null());
    }
}

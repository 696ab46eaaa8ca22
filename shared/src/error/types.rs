//! Error types and API response structures

use super::codes::ErrorCode;
use super::kind::ErrorKind;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Application error with structured error code and details
///
/// This is the error type every service operation returns, providing:
/// - Standardized error codes via [`ErrorCode`]
/// - Human-readable messages
/// - Optional structured details for debugging
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    /// The error code identifying the type of error
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (field-level errors, context, etc.)
    pub details: Option<HashMap<String, Value>>,
}

impl AppError {
    /// Create a new error with the default message for the error code
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            code,
            details: None,
        }
    }

    /// Create a new error with a custom message
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Add a detail entry to this error
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Prefix the message with the component that observed the failure.
    /// The code (and therefore the kind) is preserved.
    pub fn context(mut self, component: &str) -> Self {
        self.message = format!("{component}: {}", self.message);
        self
    }

    /// Taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    // ==================== Convenience constructors ====================

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ValidationFailed, msg)
    }

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        let r = resource.into();
        Self::with_message(ErrorCode::NotFound, format!("{} not found", r))
            .with_detail("resource", r)
    }

    /// Create a not authenticated error
    pub fn not_authenticated() -> Self {
        Self::new(ErrorCode::NotAuthenticated)
    }

    /// Create a permission denied error
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::PermissionDenied, msg)
    }

    /// Create a protected entity error
    pub fn protected(entity: impl Into<String>) -> Self {
        let e = entity.into();
        Self::with_message(
            ErrorCode::ProtectedEntity,
            format!("{} is a protected bootstrap entity", e),
        )
        .with_detail("entity", e)
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InternalError, msg)
    }

    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::DatabaseError, msg)
    }

    /// Create an unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::Unavailable, msg)
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InvalidRequest, msg)
    }

    /// Create an already exists error
    pub fn already_exists(resource: impl Into<String>) -> Self {
        let r = resource.into();
        Self::with_message(ErrorCode::AlreadyExists, format!("{} already exists", r))
            .with_detail("resource", r)
    }

    /// Create an invalid token error
    pub fn invalid_token(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::TokenInvalid, msg)
    }

    /// Create a token expired error
    pub fn token_expired() -> Self {
        Self::new(ErrorCode::TokenExpired)
    }

    /// Create a token revoked error
    pub fn token_revoked() -> Self {
        Self::new(ErrorCode::TokenRevoked)
    }

    /// Create a stale token error
    pub fn token_stale() -> Self {
        Self::new(ErrorCode::TokenStale)
    }

    /// Create a session expired error
    pub fn session_expired() -> Self {
        Self::new(ErrorCode::SessionExpired)
    }

    /// Create an invalid credentials error
    pub fn invalid_credentials() -> Self {
        Self::new(ErrorCode::InvalidCredentials)
    }

    /// Create an account disabled error
    pub fn account_disabled() -> Self {
        Self::new(ErrorCode::AccountDisabled)
    }

    /// Create a hashing failure error
    pub fn hashing(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::HashingFailure, msg)
    }

    /// Create a timeout error
    pub fn timeout() -> Self {
        Self::new(ErrorCode::Timeout)
    }

    /// Create a client disconnected error
    pub fn cancelled() -> Self {
        Self::new(ErrorCode::ClientDisconnected)
    }
}

/// Envelope status word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// 2xx
    Success,
    /// 4xx: the caller's fault or a rejected credential
    Failed,
    /// 5xx
    Error,
}

impl ResponseStatus {
    pub fn from_http(status: StatusCode) -> Self {
        if status.is_success() {
            Self::Success
        } else if status.is_client_error() {
            Self::Failed
        } else {
            Self::Error
        }
    }
}

/// Error section of the envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Value>>,
}

/// Unified API response structure
///
/// Provides a consistent response format for all API endpoints:
/// - `code`: mirrors the HTTP status
/// - `status`: `success` / `failed` / `error`
/// - `message`: Human-readable message
/// - `data`: Response payload (on success)
/// - `error`: taxonomy kind, numeric error code and details (on failure)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub status: ResponseStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    /// Create a success response with data
    pub fn success(data: T) -> Self {
        Self::success_with_status(StatusCode::OK, "OK", data)
    }

    /// Create a success response with custom message and data
    pub fn success_with_message(message: impl Into<String>, data: T) -> Self {
        Self::success_with_status(StatusCode::OK, message, data)
    }

    /// Create a 201 response
    pub fn created(data: T) -> Self {
        Self::success_with_status(StatusCode::CREATED, "Created", data)
    }

    fn success_with_status(status: StatusCode, message: impl Into<String>, data: T) -> Self {
        Self {
            code: status.as_u16(),
            status: ResponseStatus::Success,
            message: message.into(),
            data: Some(data),
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

impl ApiResponse<()> {
    /// Create a success response without data
    pub fn ok() -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            status: ResponseStatus::Success,
            message: "OK".to_string(),
            data: None,
            error: None,
        }
    }

    /// Create an error response from an AppError
    pub fn error(err: &AppError) -> Self {
        err.clone().into()
    }
}

impl<T> From<AppError> for ApiResponse<T> {
    fn from(err: AppError) -> Self {
        let status = err.http_status();
        Self {
            code: status.as_u16(),
            status: ResponseStatus::from_http(status),
            message: err.message,
            data: None,
            error: Some(ErrorBody {
                kind: err.code.kind(),
                code: err.code,
                details: err.details,
            }),
        }
    }
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

// ===== Axum Integration =====

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::Json;

        let status = self.http_status();

        if self.kind() == ErrorKind::Cancelled {
            tracing::debug!(message = %self.message, "Client went away, dropping response body");
            return status.into_response();
        }

        // Log system errors
        if matches!(self.code.category(), super::category::ErrorCategory::System) {
            tracing::error!(
                code = %self.code,
                kind = %self.kind(),
                message = %self.message,
                "System error occurred"
            );
        }

        let body = ApiResponse::<()>::from(self);
        (status, Json(body)).into_response()
    }
}

impl<T: Serialize> axum::response::IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        use axum::Json;

        let status =
            StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_new() {
        let err = AppError::new(ErrorCode::NotFound);
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.message, "Resource not found");
        assert!(err.details.is_none());
    }

    #[test]
    fn test_app_error_with_detail() {
        let err = AppError::validation("Missing required fields")
            .with_detail("field", "email")
            .with_detail("reason", "required");

        assert_eq!(err.code, ErrorCode::ValidationFailed);
        let details = err.details.unwrap();
        assert_eq!(details.get("field").unwrap(), "email");
        assert_eq!(details.get("reason").unwrap(), "required");
    }

    #[test]
    fn test_app_error_context_preserves_kind() {
        let err = AppError::unavailable("connection refused").context("session store");
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert_eq!(err.message, "session store: connection refused");
    }

    #[test]
    fn test_app_error_convenience_constructors() {
        let err = AppError::not_found("Role");
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.message, "Role not found");
        assert!(err.details.as_ref().unwrap().contains_key("resource"));

        assert_eq!(AppError::token_stale().kind(), ErrorKind::Stale);
        assert_eq!(AppError::token_revoked().kind(), ErrorKind::Revoked);
        assert_eq!(AppError::session_expired().kind(), ErrorKind::SessionExpired);
        assert_eq!(AppError::protected("principal 1").kind(), ErrorKind::ProtectedEntity);
        assert_eq!(AppError::cancelled().kind(), ErrorKind::Cancelled);
        assert_eq!(AppError::timeout().kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::with_message(ErrorCode::RoleNotFound, "Role 5 not found");
        assert_eq!(format!("{}", err), "Role 5 not found");
    }

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success(42);
        assert_eq!(response.code, 200);
        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.data, Some(42));
        assert!(response.error.is_none());
    }

    #[test]
    fn test_api_response_created() {
        let response = ApiResponse::created("alice");
        assert_eq!(response.code, 201);
        assert!(response.is_success());
    }

    #[test]
    fn test_api_response_client_error_is_failed() {
        let err = AppError::invalid_credentials();
        let response = ApiResponse::<()>::error(&err);

        assert_eq!(response.code, 401);
        assert_eq!(response.status, ResponseStatus::Failed);
        let body = response.error.unwrap();
        assert_eq!(body.kind, ErrorKind::InvalidCredentials);
        assert_eq!(body.code, ErrorCode::InvalidCredentials);
    }

    #[test]
    fn test_api_response_server_error_is_error() {
        let response: ApiResponse<String> = AppError::new(ErrorCode::Timeout).into();
        assert_eq!(response.code, 500);
        assert_eq!(response.status, ResponseStatus::Error);
        assert!(response.data.is_none());
    }

    #[test]
    fn test_api_response_serialize() {
        let json = serde_json::to_value(ApiResponse::<()>::error(
            &AppError::protected("role 1"),
        ))
        .unwrap();
        assert_eq!(json["code"], 403);
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["kind"], "ProtectedEntity");
        assert_eq!(json["error"]["code"], 2002);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_api_response_deserialize() {
        let json = r#"{"code":200,"status":"success","message":"OK","data":42}"#;
        let response: ApiResponse<i32> = serde_json::from_str(json).unwrap();
        assert_eq!(response.code, 200);
        assert_eq!(response.data, Some(42));
    }
}

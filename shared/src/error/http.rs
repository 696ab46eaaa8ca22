//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

/// Non-standard "client closed request"
const CLIENT_CLOSED_REQUEST: u16 = 499;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Success
            Self::Success => StatusCode::OK,

            // 401 Unauthorized
            Self::NotAuthenticated
            | Self::InvalidCredentials
            | Self::TokenExpired
            | Self::TokenInvalid
            | Self::SessionExpired
            | Self::TokenRevoked
            | Self::TokenStale
            | Self::AccountDisabled => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            Self::PermissionDenied | Self::ProtectedEntity => StatusCode::FORBIDDEN,

            // 404 Not Found
            Self::NotFound
            | Self::PrincipalNotFound
            | Self::RoleNotFound
            | Self::PermissionNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::AlreadyExists
            | Self::UsernameExists
            | Self::EmailExists
            | Self::RoleNameExists
            | Self::PermissionExists => StatusCode::CONFLICT,

            // 499 Client Closed Request
            Self::ClientDisconnected => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),

            // 500 Internal Server Error
            Self::Unknown
            | Self::InternalError
            | Self::DatabaseError
            | Self::ConfigError
            | Self::HashingFailure
            | Self::Timeout
            | Self::Unavailable => StatusCode::INTERNAL_SERVER_ERROR,

            // 400 Bad Request
            Self::ValidationFailed
            | Self::InvalidRequest
            | Self::RequiredField
            | Self::InvalidEmail
            | Self::PasswordTooWeak => StatusCode::BAD_REQUEST,
        }
    }
}

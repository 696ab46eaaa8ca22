//! Coarse error taxonomy
//!
//! Many [`ErrorCode`]s collapse onto one [`ErrorKind`]. The kind is what the
//! transport layer reasons about; the code is what clients display.

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ValidationFailure,
    InvalidCredentials,
    AccountDisabled,
    Expired,
    Revoked,
    Stale,
    SessionExpired,
    /// Missing or malformed bearer credential
    Unauthenticated,
    PermissionDenied,
    NotFound,
    AlreadyExists,
    ProtectedEntity,
    HashingFailure,
    Timeout,
    Unavailable,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ValidationFailure => "ValidationFailure",
            Self::InvalidCredentials => "InvalidCredentials",
            Self::AccountDisabled => "AccountDisabled",
            Self::Expired => "Expired",
            Self::Revoked => "Revoked",
            Self::Stale => "Stale",
            Self::SessionExpired => "SessionExpired",
            Self::Unauthenticated => "Unauthenticated",
            Self::PermissionDenied => "PermissionDenied",
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::ProtectedEntity => "ProtectedEntity",
            Self::HashingFailure => "HashingFailure",
            Self::Timeout => "Timeout",
            Self::Unavailable => "Unavailable",
            Self::Cancelled => "Cancelled",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl ErrorCode {
    /// Get the taxonomy kind for this error code
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Success | Self::Unknown | Self::InternalError | Self::DatabaseError => {
                ErrorKind::Internal
            }
            Self::ConfigError => ErrorKind::Internal,

            Self::ValidationFailed
            | Self::InvalidRequest
            | Self::RequiredField
            | Self::InvalidEmail
            | Self::PasswordTooWeak => ErrorKind::ValidationFailure,

            Self::NotAuthenticated | Self::TokenInvalid => ErrorKind::Unauthenticated,
            Self::InvalidCredentials => ErrorKind::InvalidCredentials,
            Self::TokenExpired => ErrorKind::Expired,
            Self::SessionExpired => ErrorKind::SessionExpired,
            Self::TokenRevoked => ErrorKind::Revoked,
            Self::TokenStale => ErrorKind::Stale,
            Self::AccountDisabled => ErrorKind::AccountDisabled,

            Self::PermissionDenied => ErrorKind::PermissionDenied,
            Self::ProtectedEntity => ErrorKind::ProtectedEntity,

            Self::NotFound
            | Self::PrincipalNotFound
            | Self::RoleNotFound
            | Self::PermissionNotFound => ErrorKind::NotFound,

            Self::AlreadyExists
            | Self::UsernameExists
            | Self::EmailExists
            | Self::RoleNameExists
            | Self::PermissionExists => ErrorKind::AlreadyExists,

            Self::HashingFailure => ErrorKind::HashingFailure,
            Self::Timeout => ErrorKind::Timeout,
            Self::Unavailable => ErrorKind::Unavailable,
            Self::ClientDisconnected => ErrorKind::Cancelled,
        }
    }
}

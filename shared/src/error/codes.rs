//! Unified error codes
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Credential and session errors
//! - 2xxx: Authorization errors
//! - 3xxx: Principal errors
//! - 4xxx: Role and permission errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Required field missing
    RequiredField = 6,
    /// Email address is malformed
    InvalidEmail = 7,
    /// Password does not meet the strength floor
    PasswordTooWeak = 8,

    // ==================== 1xxx: Credential / Session ====================
    /// No bearer credential presented
    NotAuthenticated = 1001,
    /// Invalid credentials (username/password)
    InvalidCredentials = 1002,
    /// Credential has expired
    TokenExpired = 1003,
    /// Credential is malformed, mis-typed or badly signed
    TokenInvalid = 1004,
    /// Session record is gone
    SessionExpired = 1005,
    /// Credential carries a revocation marker
    TokenRevoked = 1006,
    /// Credential embeds an outdated password version
    TokenStale = 1007,
    /// Account is disabled
    AccountDisabled = 1008,

    // ==================== 2xxx: Authorization ====================
    /// Permission denied
    PermissionDenied = 2001,
    /// Bootstrap entity cannot be deleted, disabled or modified
    ProtectedEntity = 2002,

    // ==================== 3xxx: Principal ====================
    /// Principal not found
    PrincipalNotFound = 3001,
    /// Username already taken
    UsernameExists = 3002,
    /// Email already taken
    EmailExists = 3003,

    // ==================== 4xxx: Role / Permission ====================
    /// Role not found
    RoleNotFound = 4001,
    /// Role name already taken
    RoleNameExists = 4002,
    /// Permission not found
    PermissionNotFound = 4003,
    /// Permission name or (resource, action) already taken
    PermissionExists = 4004,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Configuration error
    ConfigError = 9003,
    /// Password hashing primitive failed
    HashingFailure = 9004,
    /// Request deadline exceeded
    Timeout = 9005,
    /// Backing store unavailable
    Unavailable = 9006,
    /// Client went away before the request finished
    ClientDisconnected = 9007,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Get the default message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            Self::Success => "Success",
            Self::Unknown => "Unknown error",
            Self::ValidationFailed => "Validation failed",
            Self::NotFound => "Resource not found",
            Self::AlreadyExists => "Resource already exists",
            Self::InvalidRequest => "Invalid request",
            Self::RequiredField => "Required field missing",
            Self::InvalidEmail => "Invalid email address",
            Self::PasswordTooWeak => {
                "Password must be at least 8 characters and contain a letter and a digit"
            }

            // Credential / Session
            Self::NotAuthenticated => "Authentication required",
            Self::InvalidCredentials => "Invalid username or password",
            Self::TokenExpired => "Token has expired",
            Self::TokenInvalid => "Invalid token",
            Self::SessionExpired => "Session has expired",
            Self::TokenRevoked => "Token has been revoked",
            Self::TokenStale => "Token is no longer valid, please login again",
            Self::AccountDisabled => "Account is disabled",

            // Authorization
            Self::PermissionDenied => "Permission denied",
            Self::ProtectedEntity => "Bootstrap entity is protected",

            // Principal
            Self::PrincipalNotFound => "Principal not found",
            Self::UsernameExists => "Username already exists",
            Self::EmailExists => "Email already exists",

            // Role / Permission
            Self::RoleNotFound => "Role not found",
            Self::RoleNameExists => "Role name already exists",
            Self::PermissionNotFound => "Permission not found",
            Self::PermissionExists => "Permission already exists",

            // System
            Self::InternalError => "Internal server error",
            Self::DatabaseError => "Database error",
            Self::ConfigError => "Configuration error",
            Self::HashingFailure => "Password hashing failed",
            Self::Timeout => "Request timed out",
            Self::Unavailable => "Service temporarily unavailable",
            Self::ClientDisconnected => "Client disconnected",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code as u16
    }
}

/// Error returned when converting an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(Self::Success),
            1 => Ok(Self::Unknown),
            2 => Ok(Self::ValidationFailed),
            3 => Ok(Self::NotFound),
            4 => Ok(Self::AlreadyExists),
            5 => Ok(Self::InvalidRequest),
            6 => Ok(Self::RequiredField),
            7 => Ok(Self::InvalidEmail),
            8 => Ok(Self::PasswordTooWeak),

            // Credential / Session
            1001 => Ok(Self::NotAuthenticated),
            1002 => Ok(Self::InvalidCredentials),
            1003 => Ok(Self::TokenExpired),
            1004 => Ok(Self::TokenInvalid),
            1005 => Ok(Self::SessionExpired),
            1006 => Ok(Self::TokenRevoked),
            1007 => Ok(Self::TokenStale),
            1008 => Ok(Self::AccountDisabled),

            // Authorization
            2001 => Ok(Self::PermissionDenied),
            2002 => Ok(Self::ProtectedEntity),

            // Principal
            3001 => Ok(Self::PrincipalNotFound),
            3002 => Ok(Self::UsernameExists),
            3003 => Ok(Self::EmailExists),

            // Role / Permission
            4001 => Ok(Self::RoleNotFound),
            4002 => Ok(Self::RoleNameExists),
            4003 => Ok(Self::PermissionNotFound),
            4004 => Ok(Self::PermissionExists),

            // System
            9001 => Ok(Self::InternalError),
            9002 => Ok(Self::DatabaseError),
            9003 => Ok(Self::ConfigError),
            9004 => Ok(Self::HashingFailure),
            9005 => Ok(Self::Timeout),
            9006 => Ok(Self::Unavailable),
            9007 => Ok(Self::ClientDisconnected),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

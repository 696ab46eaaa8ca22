//! Unified error system for the identity core
//!
//! This module provides the error handling vocabulary shared by the server
//! and its clients:
//! - [`ErrorCode`]: Standardized numeric error codes
//! - [`ErrorKind`]: The coarse taxonomy a transport maps to a status
//! - [`ErrorCategory`]: Classification of codes by domain
//! - [`AppError`]: Rich error type with code, message and details
//! - [`ApiResponse`]: Uniform response envelope
//!
//! # Error Code Ranges
//!
//! - 0xxx: General errors
//! - 1xxx: Credential and session errors
//! - 2xxx: Authorization errors
//! - 3xxx: Principal errors
//! - 4xxx: Role and permission errors
//! - 9xxx: System errors
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorCode, ErrorKind, ApiResponse};
//!
//! let err = AppError::new(ErrorCode::TokenStale);
//! assert_eq!(err.kind(), ErrorKind::Stale);
//!
//! let err = AppError::validation("Invalid email format")
//!     .with_detail("field", "email");
//!
//! let response = ApiResponse::<()>::error(&err);
//! assert_eq!(response.code, 400);
//! ```

mod category;
mod codes;
mod http;
mod kind;
mod types;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, InvalidErrorCode};
pub use kind::ErrorKind;
pub use types::{ApiResponse, AppError, AppResult, ErrorBody, ResponseStatus};

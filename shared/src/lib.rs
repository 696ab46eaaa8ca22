//! Shared types for the Master identity core
//!
//! Wire-level types used by the server and by API clients:
//! error taxonomy, response envelope, entity models and request DTOs.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode, ErrorKind};

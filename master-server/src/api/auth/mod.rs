//! Authentication Routes
//!
//! | 路径 | 方法 | 认证 |
//! |------|------|------|
//! | /api/auth/register | POST | 无 |
//! | /api/auth/login | POST | 无 |
//! | /api/auth/refresh | POST | 无 (refresh 令牌在 body) |
//! | /api/auth/logout | POST | 无 (幂等) |
//! | /api/auth/logout-all | POST | 有 |
//! | /api/auth/check-expiry | GET | 有 |

mod handler;

use axum::{Router, routing::get, routing::post};

use crate::core::ServerState;

/// Build authentication router
pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/auth/register", post(handler::register))
        .route("/api/auth/login", post(handler::login))
        .route("/api/auth/refresh", post(handler::refresh))
        .route("/api/auth/logout", post(handler::logout))
        // Protected routes (global require_auth)
        .route("/api/auth/logout-all", post(handler::logout_all))
        .route("/api/auth/check-expiry", get(handler::check_expiry))
}

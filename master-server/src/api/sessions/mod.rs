//! Session administration routes
//!
//! | 路径 | 方法 | 权限 |
//! |------|------|------|
//! | /api/users/{id}/sessions | GET | sessions:read |
//! | /api/users/{id}/sessions | DELETE | sessions:write |
//! | /api/users/{id}/sessions/current | DELETE | sessions:write |

mod handler;

use axum::{
    Router, middleware,
    routing::{delete, get},
};

use crate::auth::require_permission;
use crate::core::ServerState;

pub fn router(state: &ServerState) -> Router<ServerState> {
    let read_routes = Router::new()
        .route("/api/users/{id}/sessions", get(handler::list))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_permission("sessions", "read"),
        ));

    let write_routes = Router::new()
        .route("/api/users/{id}/sessions", delete(handler::revoke_all))
        .route("/api/users/{id}/sessions/current", delete(handler::revoke))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_permission("sessions", "write"),
        ));

    read_routes.merge(write_routes)
}

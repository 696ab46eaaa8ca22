//! Permission API Module

mod handler;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::require_permission;
use crate::core::ServerState;

/// Permission router - requires `permissions:read` / `permissions:write`
pub fn router(state: &ServerState) -> Router<ServerState> {
    let read_routes = Router::new()
        .route("/api/permissions", get(handler::list))
        .route("/api/permissions/{id}", get(handler::get_by_id))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_permission("permissions", "read"),
        ));

    let write_routes = Router::new()
        .route("/api/permissions", post(handler::create))
        .route(
            "/api/permissions/{id}",
            put(handler::update).delete(handler::delete),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_permission("permissions", "write"),
        ));

    read_routes.merge(write_routes)
}

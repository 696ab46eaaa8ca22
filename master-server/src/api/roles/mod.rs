//! Role API Module

mod handler;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::require_permission;
use crate::core::ServerState;

/// Role router - requires `roles:read` / `roles:write`
pub fn router(state: &ServerState) -> Router<ServerState> {
    let read_routes = Router::new()
        .route("/api/roles", get(handler::list))
        .route("/api/roles/{id}", get(handler::get_by_id))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_permission("roles", "read"),
        ));

    let write_routes = Router::new()
        .route("/api/roles", post(handler::create))
        .route(
            "/api/roles/{id}",
            put(handler::update).delete(handler::delete),
        )
        .route("/api/roles/{id}/activate", post(handler::activate))
        .route("/api/roles/{id}/deactivate", post(handler::deactivate))
        .route("/api/roles/{id}/permissions", put(handler::set_permissions))
        .route(
            "/api/roles/{id}/permissions/{permission_id}",
            post(handler::assign_permission).delete(handler::remove_permission),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_permission("roles", "write"),
        ));

    read_routes.merge(write_routes)
}

//! Principal API Module
//!
//! `/api/users/me*` only needs a valid session. Everything else needs
//! `users:read` or `users:write`.

mod handler;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::require_permission;
use crate::core::ServerState;

pub fn router(state: &ServerState) -> Router<ServerState> {
    let self_routes = Router::new()
        .route("/api/users/me", get(handler::me).put(handler::update_me))
        .route("/api/users/me/password", put(handler::change_password));

    let read_routes = Router::new()
        .route("/api/users", get(handler::list))
        .route("/api/users/{id}", get(handler::get_by_id))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_permission("users", "read"),
        ));

    let write_routes = Router::new()
        .route("/api/users", post(handler::create))
        .route(
            "/api/users/{id}",
            put(handler::update).delete(handler::delete),
        )
        .route("/api/users/{id}/activate", post(handler::activate))
        .route("/api/users/{id}/deactivate", post(handler::deactivate))
        .route("/api/users/{id}/reset-password", post(handler::reset_password))
        .route("/api/users/{id}/roles", put(handler::set_roles))
        .route(
            "/api/users/{id}/roles/{role_id}",
            post(handler::assign_role).delete(handler::remove_role),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_permission("users", "write"),
        ));

    self_routes.merge(read_routes).merge(write_routes)
}

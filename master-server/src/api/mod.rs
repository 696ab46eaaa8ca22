//! API 路由模块
//!
//! Thin transport over the services: handlers decode, call one service
//! method and wrap the result in [`ApiResponse`](crate::ApiResponse).
//!
//! # 结构
//!
//! - [`health`] - 健康检查
//! - [`auth`] - 注册、登录、登出、刷新
//! - [`users`] - 自助与主体管理
//! - [`roles`] - 角色管理
//! - [`permissions`] - 权限管理
//! - [`sessions`] - 会话管理

pub mod auth;
pub mod extract;
pub mod health;
pub mod permissions;
pub mod roles;
pub mod sessions;
pub mod users;

pub use extract::{AppJson, AppPath, AppQuery};

use axum::{Router, middleware};
use http::{HeaderName, HeaderValue};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::auth::require_auth;
use crate::core::ServerState;

/// Result of an idempotent membership change
#[derive(Debug, serde::Serialize)]
pub struct ChangedResponse {
    pub changed: bool,
}

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Custom request ID generator
#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// HTTP 请求日志中间件
async fn log_request(
    request: http::Request<axum::body::Body>,
    next: middleware::Next,
) -> http::Response<axum::body::Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    tracing::info!(target: "http_access", "{} {} {}", method, uri, response.status());
    response
}

/// Build a router with all routes registered (no global middleware)
pub fn build_router(state: &ServerState) -> Router<ServerState> {
    Router::new()
        .merge(auth::router())
        .merge(users::router(state))
        .merge(roles::router(state))
        .merge(permissions::router(state))
        .merge(sessions::router(state))
        .merge(health::router())
}

/// Build a fully configured application with all middleware and state
pub fn build_app(state: &ServerState) -> Router {
    build_router(state)
        // 认证中间件 - require_auth 内部会跳过公共路由
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone())
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, XRequestId))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(log_request)),
        )
}

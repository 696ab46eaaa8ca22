//! 认证中间件
//!
//! 为会话认证和授权提供 Axum 中间件

use std::future::Future;
use std::pin::Pin;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use http::HeaderMap;

use super::extractor::request_context;
use crate::auth::{CurrentUser, JwtService};
use crate::core::{RequestContext, ServerState};
use crate::{AppError, security_log};

/// Routes reachable without a bearer credential
const PUBLIC_API_ROUTES: &[&str] = &[
    "/api/auth/register",
    "/api/auth/login",
    "/api/auth/refresh",
    "/api/auth/logout",
];

/// Bearer credential from the `Authorization` header
pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(AppError::not_authenticated)?;
    JwtService::extract_from_header(header)
        .ok_or_else(|| AppError::invalid_token("Invalid authorization header"))
}

/// 认证中间件 - 要求有效会话
///
/// 从 `Authorization: Bearer <token>` 头提取凭证并经 `validate_session` 校验。
/// 成功后将 [`CurrentUser`] 与 [`RequestContext`] 注入请求扩展。
///
/// # 跳过认证的路径
///
/// - `OPTIONS *` (CORS 预检)
/// - 非 `/api/` 路径
/// - 注册、登录、刷新、登出
pub async fn require_auth(
    State(state): State<ServerState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if req.method() == http::Method::OPTIONS {
        return Ok(next.run(req).await);
    }

    let path = req.uri().path();
    if !path.starts_with("/api/") || PUBLIC_API_ROUTES.contains(&path) {
        return Ok(next.run(req).await);
    }

    let ctx = request_context(&state, req.headers(), req.extensions());
    let token = match bearer_token(req.headers()) {
        Ok(t) => t.to_owned(),
        Err(e) => {
            security_log!(
                "WARN",
                "auth_missing",
                uri = format!("{:?}", req.uri()),
                request_id = ctx.request_id.as_str()
            );
            return Err(e);
        }
    };

    match state.sessions.validate_session(&ctx, &token).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            req.extensions_mut().insert(ctx);
            Ok(next.run(req).await)
        }
        Err(e) => {
            security_log!(
                "WARN",
                "auth_failed",
                error = format!("{}", e.code),
                uri = format!("{:?}", req.uri()),
                request_id = ctx.request_id.as_str()
            );
            Err(e)
        }
    }
}

type MiddlewareFuture = Pin<Box<dyn Future<Output = Result<Response, AppError>> + Send>>;

/// 权限检查中间件 - 要求 `(resource, action)` 权限
///
/// Must run inside [`require_auth`]. The decision comes from the
/// Authorization Service, not from the session snapshot.
///
/// # 用法
///
/// ```ignore
/// Router::new()
///     .route("/api/roles", get(handler::list))
///     .layer(middleware::from_fn_with_state(state.clone(), require_permission("roles", "read")));
/// ```
pub fn require_permission(
    resource: &'static str,
    action: &'static str,
) -> impl Fn(State<ServerState>, Request, Next) -> MiddlewareFuture + Clone {
    move |State(state): State<ServerState>, req: Request, next: Next| {
        Box::pin(async move {
            let user_id = req.current_user()?.id;
            let ctx = req
                .extensions()
                .get::<RequestContext>()
                .cloned()
                .unwrap_or_else(|| request_context(&state, req.headers(), req.extensions()));

            if !state
                .authz
                .check_permission(&ctx, user_id, resource, action)
                .await?
            {
                return Err(AppError::permission_denied(format!(
                    "Permission denied: {resource}:{action}"
                ))
                .with_detail("resource", resource)
                .with_detail("action", action));
            }

            Ok(next.run(req).await)
        })
    }
}

/// 从请求中提取 CurrentUser 的扩展方法
pub trait CurrentUserExt {
    /// 未认证返回 401
    fn current_user(&self) -> Result<&CurrentUser, AppError>;
}

impl CurrentUserExt for Request {
    fn current_user(&self) -> Result<&CurrentUser, AppError> {
        self.extensions()
            .get::<CurrentUser>()
            .ok_or_else(AppError::not_authenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ErrorCode;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            bearer_token(&headers).unwrap_err().code,
            ErrorCode::NotAuthenticated
        );

        headers.insert(http::header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers).unwrap_err().code, ErrorCode::TokenInvalid);

        headers.insert(http::header::AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def");
    }
}

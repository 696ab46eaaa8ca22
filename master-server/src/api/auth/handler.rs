//! Authentication Handlers
//!
//! Handles registration, login, logout and credential refresh

use axum::extract::State;
use http::HeaderMap;
use serde::Serialize;

use crate::api::AppJson;
use crate::auth::middleware::bearer_token;
use crate::core::{RequestContext, ServerState};
use crate::utils::{ok, ok_with_message};
use crate::{ApiResponse, AppResult};
use shared::models::{
    CheckExpiryResponse, LoginRequest, LoginResponse, PrincipalView, RefreshRequest,
    RegisterRequest, TokenPair,
};

#[derive(Debug, Serialize)]
pub struct LogoutAllResponse {
    pub password_version: i64,
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppJson(req): AppJson<RegisterRequest>,
) -> AppResult<ApiResponse<PrincipalView>> {
    let view = state.identity.register(&ctx, req).await?;
    Ok(ApiResponse::created(view))
}

/// POST /api/auth/login
///
/// `identifier` is a username or an email address. Every credential
/// failure returns the same error.
pub async fn login(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppJson(req): AppJson<LoginRequest>,
) -> AppResult<ApiResponse<LoginResponse>> {
    let response = state.sessions.login(&ctx, req).await?;
    Ok(ok(response))
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppJson(req): AppJson<RefreshRequest>,
) -> AppResult<ApiResponse<TokenPair>> {
    let pair = state.sessions.refresh(&ctx, req).await?;
    Ok(ok(pair))
}

/// POST /api/auth/logout
///
/// Succeeds without a credential or with an unparseable one.
pub async fn logout(
    State(state): State<ServerState>,
    ctx: RequestContext,
    headers: HeaderMap,
) -> AppResult<ApiResponse<()>> {
    if let Ok(token) = bearer_token(&headers) {
        state.sessions.logout(&ctx, token).await?;
    }
    Ok(ok_with_message("Logged out", ()))
}

/// POST /api/auth/logout-all - 使该主体所有已签发令牌失效
pub async fn logout_all(
    State(state): State<ServerState>,
    ctx: RequestContext,
    headers: HeaderMap,
) -> AppResult<ApiResponse<LogoutAllResponse>> {
    let token = bearer_token(&headers)?;
    let password_version = state.sessions.logout_all(&ctx, token).await?;
    Ok(ok_with_message(
        "All sessions revoked",
        LogoutAllResponse { password_version },
    ))
}

/// GET /api/auth/check-expiry
pub async fn check_expiry(
    State(state): State<ServerState>,
    ctx: RequestContext,
    headers: HeaderMap,
) -> AppResult<ApiResponse<CheckExpiryResponse>> {
    let token = bearer_token(&headers)?;
    let response = state.sessions.check_expiry(&ctx, token).await?;
    Ok(ok(response))
}

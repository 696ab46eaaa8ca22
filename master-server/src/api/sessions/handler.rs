//! Session administration handlers

use axum::extract::State;
use serde::Serialize;

use crate::api::{AppPath, ChangedResponse};
use crate::auth::CurrentUser;
use crate::core::{RequestContext, ServerState};
use crate::utils::ok;
use crate::{ApiResponse, AppResult};
use shared::models::SessionRecord;

#[derive(Debug, Serialize)]
pub struct RevokedResponse {
    pub revoked: usize,
}

/// GET /api/users/{id}/sessions
pub async fn list(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppPath(id): AppPath<i64>,
) -> AppResult<ApiResponse<Vec<SessionRecord>>> {
    let sessions = state.sessions.list_sessions(&ctx, id).await?;
    Ok(ok(sessions))
}

/// DELETE /api/users/{id}/sessions/current
pub async fn revoke(
    State(state): State<ServerState>,
    ctx: RequestContext,
    user: CurrentUser,
    AppPath(id): AppPath<i64>,
) -> AppResult<ApiResponse<ChangedResponse>> {
    tracing::info!(operator_id = user.id, principal_id = id, "Revoking session");
    let changed = state.sessions.revoke_session(&ctx, id).await?;
    Ok(ok(ChangedResponse { changed }))
}

/// DELETE /api/users/{id}/sessions
pub async fn revoke_all(
    State(state): State<ServerState>,
    ctx: RequestContext,
    user: CurrentUser,
    AppPath(id): AppPath<i64>,
) -> AppResult<ApiResponse<RevokedResponse>> {
    tracing::info!(operator_id = user.id, principal_id = id, "Revoking all sessions");
    let revoked = state.sessions.revoke_all_sessions(&ctx, id).await?;
    Ok(ok(RevokedResponse { revoked }))
}

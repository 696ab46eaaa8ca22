//! Permission API Handlers

use axum::extract::State;

use crate::api::{AppJson, AppPath, AppQuery};
use crate::core::{RequestContext, ServerState};
use crate::utils::ok;
use crate::{ApiResponse, AppResult};
use shared::models::{Page, PageResult, Permission, PermissionCreate, PermissionUpdate};

pub async fn list(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppQuery(page): AppQuery<Page>,
) -> AppResult<ApiResponse<PageResult<Permission>>> {
    let result = state.roles.list_permissions(&ctx, page).await?;
    Ok(ok(result))
}

pub async fn get_by_id(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppPath(id): AppPath<i64>,
) -> AppResult<ApiResponse<Permission>> {
    let permission = state.roles.get_permission(&ctx, id).await?;
    Ok(ok(permission))
}

/// POST /api/permissions - `(resource, action)` must be unused
pub async fn create(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppJson(payload): AppJson<PermissionCreate>,
) -> AppResult<ApiResponse<Permission>> {
    let permission = state.roles.create_permission(&ctx, payload).await?;
    Ok(ApiResponse::created(permission))
}

pub async fn update(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<PermissionUpdate>,
) -> AppResult<ApiResponse<Permission>> {
    let permission = state.roles.update_permission(&ctx, id, payload).await?;
    Ok(ok(permission))
}

/// DELETE /api/permissions/{id} - 同时移除所有角色上的该权限
pub async fn delete(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppPath(id): AppPath<i64>,
) -> AppResult<ApiResponse<()>> {
    state.roles.delete_permission(&ctx, id).await?;
    Ok(ApiResponse::ok())
}

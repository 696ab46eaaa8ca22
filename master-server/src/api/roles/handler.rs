//! Role API Handlers

use axum::extract::State;

use crate::api::{AppJson, AppPath, AppQuery, ChangedResponse};
use crate::auth::CurrentUser;
use crate::core::{RequestContext, ServerState};
use crate::utils::ok;
use crate::{ApiResponse, AppResult};
use shared::models::{
    Page, PageResult, Role, RoleCreate, RoleDetail, RolePermissionsRequest, RoleUpdate,
};

/// GET /api/roles - 分页列出角色
pub async fn list(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppQuery(page): AppQuery<Page>,
) -> AppResult<ApiResponse<PageResult<Role>>> {
    let result = state.roles.list_roles(&ctx, page).await?;
    Ok(ok(result))
}

/// GET /api/roles/{id} - 角色及其权限
pub async fn get_by_id(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppPath(id): AppPath<i64>,
) -> AppResult<ApiResponse<RoleDetail>> {
    let role = state.roles.get_role(&ctx, id).await?;
    Ok(ok(role))
}

/// POST /api/roles
pub async fn create(
    State(state): State<ServerState>,
    ctx: RequestContext,
    user: CurrentUser,
    AppJson(payload): AppJson<RoleCreate>,
) -> AppResult<ApiResponse<RoleDetail>> {
    tracing::info!(
        user_id = user.id,
        username = %user.username,
        role_name = %payload.name,
        "Creating role"
    );
    let role = state.roles.create_role(&ctx, payload).await?;
    Ok(ApiResponse::created(role))
}

/// PUT /api/roles/{id}
pub async fn update(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<RoleUpdate>,
) -> AppResult<ApiResponse<RoleDetail>> {
    let role = state.roles.update_role(&ctx, id, payload).await?;
    Ok(ok(role))
}

/// DELETE /api/roles/{id}
pub async fn delete(
    State(state): State<ServerState>,
    ctx: RequestContext,
    user: CurrentUser,
    AppPath(id): AppPath<i64>,
) -> AppResult<ApiResponse<()>> {
    tracing::info!(user_id = user.id, role_id = id, "Deleting role");
    state.roles.delete_role(&ctx, id).await?;
    Ok(ApiResponse::ok())
}

pub async fn activate(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppPath(id): AppPath<i64>,
) -> AppResult<ApiResponse<RoleDetail>> {
    let role = state.roles.activate_role(&ctx, id).await?;
    Ok(ok(role))
}

pub async fn deactivate(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppPath(id): AppPath<i64>,
) -> AppResult<ApiResponse<RoleDetail>> {
    let role = state.roles.deactivate_role(&ctx, id).await?;
    Ok(ok(role))
}

/// PUT /api/roles/{id}/permissions - 替换整个权限集合
pub async fn set_permissions(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<RolePermissionsRequest>,
) -> AppResult<ApiResponse<RoleDetail>> {
    let role = state
        .roles
        .set_role_permissions(&ctx, id, payload.permission_ids)
        .await?;
    Ok(ok(role))
}

pub async fn assign_permission(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppPath((id, permission_id)): AppPath<(i64, i64)>,
) -> AppResult<ApiResponse<ChangedResponse>> {
    let changed = state.roles.assign_permission(&ctx, id, permission_id).await?;
    Ok(ok(ChangedResponse { changed }))
}

pub async fn remove_permission(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppPath((id, permission_id)): AppPath<(i64, i64)>,
) -> AppResult<ApiResponse<ChangedResponse>> {
    let changed = state.roles.remove_permission(&ctx, id, permission_id).await?;
    Ok(ok(ChangedResponse { changed }))
}

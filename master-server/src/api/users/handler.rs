//! Principal API Handlers

use axum::extract::State;
use serde::Serialize;

use crate::api::{AppJson, AppPath, AppQuery, ChangedResponse};
use crate::auth::CurrentUser;
use crate::core::{RequestContext, ServerState};
use crate::utils::{ok, ok_with_message};
use crate::{ApiResponse, AppResult};
use shared::models::{
    AssignRolesRequest, ChangePasswordRequest, Page, PageResult, PrincipalCreate, PrincipalUpdate,
    PrincipalView, ProfileUpdate, ResetPasswordRequest,
};

#[derive(Debug, Serialize)]
pub struct PasswordVersionResponse {
    pub password_version: i64,
}

/// GET /api/users/me
pub async fn me(
    State(state): State<ServerState>,
    ctx: RequestContext,
    user: CurrentUser,
) -> AppResult<ApiResponse<PrincipalView>> {
    let view = state.identity.get_principal(&ctx, user.id).await?;
    Ok(ok(view))
}

/// PUT /api/users/me - 仅资料字段
pub async fn update_me(
    State(state): State<ServerState>,
    ctx: RequestContext,
    user: CurrentUser,
    AppJson(req): AppJson<ProfileUpdate>,
) -> AppResult<ApiResponse<PrincipalView>> {
    let view = state.identity.update_profile(&ctx, user.id, req).await?;
    Ok(ok(view))
}

/// PUT /api/users/me/password
///
/// All outstanding credentials of the caller stop working, including the
/// one used for this request.
pub async fn change_password(
    State(state): State<ServerState>,
    ctx: RequestContext,
    user: CurrentUser,
    AppJson(req): AppJson<ChangePasswordRequest>,
) -> AppResult<ApiResponse<PasswordVersionResponse>> {
    let password_version = state.identity.change_password(&ctx, user.id, req).await?;
    Ok(ok_with_message(
        "Password changed, please log in again",
        PasswordVersionResponse { password_version },
    ))
}

/// GET /api/users?offset=&limit=
pub async fn list(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppQuery(page): AppQuery<Page>,
) -> AppResult<ApiResponse<PageResult<PrincipalView>>> {
    let result = state.identity.list_principals(&ctx, page).await?;
    Ok(ok(result))
}

pub async fn get_by_id(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppPath(id): AppPath<i64>,
) -> AppResult<ApiResponse<PrincipalView>> {
    let view = state.identity.get_principal(&ctx, id).await?;
    Ok(ok(view))
}

/// POST /api/users
pub async fn create(
    State(state): State<ServerState>,
    ctx: RequestContext,
    user: CurrentUser,
    AppJson(req): AppJson<PrincipalCreate>,
) -> AppResult<ApiResponse<PrincipalView>> {
    tracing::info!(
        operator_id = user.id,
        username = %req.username,
        "Creating principal"
    );
    let view = state.identity.create_principal(&ctx, req).await?;
    Ok(ApiResponse::created(view))
}

/// PUT /api/users/{id}
pub async fn update(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<PrincipalUpdate>,
) -> AppResult<ApiResponse<PrincipalView>> {
    let view = state.identity.update_principal(&ctx, id, req).await?;
    Ok(ok(view))
}

/// DELETE /api/users/{id}
pub async fn delete(
    State(state): State<ServerState>,
    ctx: RequestContext,
    user: CurrentUser,
    AppPath(id): AppPath<i64>,
) -> AppResult<ApiResponse<()>> {
    tracing::info!(operator_id = user.id, principal_id = id, "Deleting principal");
    state.identity.delete_principal(&ctx, id).await?;
    Ok(ApiResponse::ok())
}

pub async fn activate(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppPath(id): AppPath<i64>,
) -> AppResult<ApiResponse<PrincipalView>> {
    let view = state.identity.activate(&ctx, id).await?;
    Ok(ok(view))
}

pub async fn deactivate(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppPath(id): AppPath<i64>,
) -> AppResult<ApiResponse<PrincipalView>> {
    let view = state.identity.deactivate(&ctx, id).await?;
    Ok(ok(view))
}

/// POST /api/users/{id}/reset-password
///
/// Body `{}` resets to the configured default password.
pub async fn reset_password(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<ResetPasswordRequest>,
) -> AppResult<ApiResponse<PasswordVersionResponse>> {
    let password_version = state.identity.reset_password(&ctx, id, req).await?;
    Ok(ok(PasswordVersionResponse { password_version }))
}

/// PUT /api/users/{id}/roles - 替换整个角色集合
pub async fn set_roles(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<AssignRolesRequest>,
) -> AppResult<ApiResponse<PrincipalView>> {
    let view = state.identity.set_roles(&ctx, id, req.role_ids).await?;
    Ok(ok(view))
}

pub async fn assign_role(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppPath((id, role_id)): AppPath<(i64, i64)>,
) -> AppResult<ApiResponse<ChangedResponse>> {
    let changed = state.identity.assign_role(&ctx, id, role_id).await?;
    Ok(ok(ChangedResponse { changed }))
}

pub async fn remove_role(
    State(state): State<ServerState>,
    ctx: RequestContext,
    AppPath((id, role_id)): AppPath<(i64, i64)>,
) -> AppResult<ApiResponse<ChangedResponse>> {
    let changed = state.identity.remove_role(&ctx, id, role_id).await?;
    Ok(ok(ChangedResponse { changed }))
}

//! Role and permission administration
//!
//! Every mutation that can change somebody's effective grants ends with
//! [`AuthzService::notify_rbac_changed`].

use std::sync::Arc;

use shared::models::{
    BOOTSTRAP_ID, Page, PageResult, Permission, PermissionCreate, PermissionUpdate, Role,
    RoleCreate, RoleDetail, RoleUpdate, Status,
};
use sqlx::SqliteConnection;

use super::acquire;
use super::authorization::AuthzService;
use crate::db::repository::{RepoError, RepoResult, permission, role};
use crate::db::{DbService, retry_on_busy};
use crate::utils::validation::{
    MAX_NAME_LEN, MAX_NOTE_LEN, validate_id, validate_optional_text, validate_required_text,
};
use crate::{AppError, AppResult, ErrorCode, RequestContext, security_log};

fn role_not_found(id: i64) -> AppError {
    AppError::with_message(ErrorCode::RoleNotFound, format!("Role {id} not found"))
        .with_detail("id", id)
}

fn permission_not_found(id: i64) -> AppError {
    AppError::with_message(ErrorCode::PermissionNotFound, format!("Permission {id} not found"))
        .with_detail("id", id)
}

/// `resource` and `action` form the `resource:action` key, so neither may contain `:`
fn validate_key_part(value: &str, field: &str) -> AppResult<()> {
    validate_required_text(value, field, MAX_NAME_LEN)?;
    if value.contains(':') || value.chars().any(char::is_whitespace) {
        return Err(AppError::validation(format!(
            "{field} must not contain ':' or whitespace"
        ))
        .with_detail("field", field));
    }
    Ok(())
}

async fn require_role(conn: &mut SqliteConnection, id: i64) -> RepoResult<Role> {
    role::find_by_id(conn, id).await?.ok_or_else(|| {
        RepoError::Business(ErrorCode::RoleNotFound, format!("Role {id} not found"))
    })
}

async fn require_permission(conn: &mut SqliteConnection, id: i64) -> RepoResult<Permission> {
    permission::find_by_id(conn, id).await?.ok_or_else(|| {
        RepoError::Business(
            ErrorCode::PermissionNotFound,
            format!("Permission {id} not found"),
        )
    })
}

async fn check_permissions_exist(conn: &mut SqliteConnection, ids: &[i64]) -> RepoResult<()> {
    let missing = permission::missing(conn, ids).await?;
    if !missing.is_empty() {
        return Err(RepoError::Business(
            ErrorCode::PermissionNotFound,
            format!("Permissions not found: {missing:?}"),
        ));
    }
    Ok(())
}

async fn check_role_name_free(
    conn: &mut SqliteConnection,
    name: &str,
    exclude: Option<i64>,
) -> RepoResult<()> {
    if let Some(existing) = role::find_by_name(conn, name).await?
        && Some(existing.id) != exclude
    {
        return Err(RepoError::Business(
            ErrorCode::RoleNameExists,
            format!("Role '{name}' already exists"),
        ));
    }
    Ok(())
}

/// Name and `(resource, action)` must both be free
async fn check_permission_free(
    conn: &mut SqliteConnection,
    name: Option<&str>,
    key: Option<(&str, &str)>,
    exclude: Option<i64>,
) -> RepoResult<()> {
    if let Some(name) = name
        && let Some(existing) = permission::find_by_name(&mut *conn, name).await?
        && Some(existing.id) != exclude
    {
        return Err(RepoError::Business(
            ErrorCode::PermissionExists,
            format!("Permission '{name}' already exists"),
        ));
    }
    if let Some((resource, action)) = key
        && let Some(existing) = permission::find_by_key(&mut *conn, resource, action).await?
        && Some(existing.id) != exclude
    {
        return Err(RepoError::Business(
            ErrorCode::PermissionExists,
            format!("Permission {resource}:{action} already exists"),
        ));
    }
    Ok(())
}

/// 角色与权限管理服务
pub struct RoleService {
    db: DbService,
    authz: Arc<AuthzService>,
}

impl RoleService {
    pub fn new(db: DbService, authz: Arc<AuthzService>) -> Self {
        Self { db, authz }
    }

    async fn load_detail(&self, id: i64) -> AppResult<RoleDetail> {
        let mut conn = acquire(&self.db).await?;
        let role = role::find_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| role_not_found(id))?;
        let permissions = role::permissions_of(&mut conn, id).await?;
        Ok(RoleDetail { role, permissions })
    }

    // ── Roles ────────────────────────────────────────────────────────

    pub async fn create_role(&self, ctx: &RequestContext, req: RoleCreate) -> AppResult<RoleDetail> {
        ctx.guard(async {
            validate_required_text(&req.name, "name", MAX_NAME_LEN)?;
            validate_optional_text(&req.description, "description", MAX_NOTE_LEN)?;
            for id in &req.permission_ids {
                validate_id(*id, "permission_ids")?;
            }
            let name = req.name.trim();

            let pool = &self.db.pool;
            let id = retry_on_busy("create_role", || async {
                let mut tx = pool.begin().await?;
                check_role_name_free(&mut tx, name, None).await?;
                check_permissions_exist(&mut tx, &req.permission_ids).await?;
                let id = role::create(&mut tx, name, req.description.as_deref()).await?;
                for permission_id in &req.permission_ids {
                    role::assign_permission(&mut tx, id, *permission_id).await?;
                }
                tx.commit().await?;
                Ok(id)
            })
            .await?;

            tracing::info!(role_id = id, name, "Role created");
            self.load_detail(id).await
        })
        .await
    }

    pub async fn get_role(&self, ctx: &RequestContext, id: i64) -> AppResult<RoleDetail> {
        ctx.guard(async {
            validate_id(id, "id")?;
            self.load_detail(id).await
        })
        .await
    }

    pub async fn list_roles(&self, ctx: &RequestContext, page: Page) -> AppResult<PageResult<Role>> {
        ctx.guard(async {
            let page = page.clamped();
            let mut conn = acquire(&self.db).await?;
            let (items, total) = role::list(&mut conn, page).await?;
            Ok(PageResult::new(items, total, page))
        })
        .await
    }

    pub async fn update_role(
        &self,
        ctx: &RequestContext,
        id: i64,
        patch: RoleUpdate,
    ) -> AppResult<RoleDetail> {
        ctx.guard(async {
            validate_id(id, "id")?;
            if let Some(name) = &patch.name {
                validate_required_text(name, "name", MAX_NAME_LEN)?;
            }
            validate_optional_text(&patch.description, "description", MAX_NOTE_LEN)?;
            if let Some(ids) = &patch.permission_ids {
                for permission_id in ids {
                    validate_id(*permission_id, "permission_ids")?;
                }
            }
            if id == BOOTSTRAP_ID && patch.status == Some(Status::Disabled) {
                security_log!(
                    "WARN",
                    "protected_entity",
                    role_id = id,
                    operation = "disable",
                    request_id = ctx.request_id.as_str()
                );
                return Err(AppError::protected("role 1"));
            }
            let name = patch.name.as_deref().map(str::trim);

            let pool = &self.db.pool;
            retry_on_busy("update_role", || async {
                let mut tx = pool.begin().await?;
                require_role(&mut tx, id).await?;
                if let Some(name) = name {
                    check_role_name_free(&mut tx, name, Some(id)).await?;
                }
                if let Some(ids) = &patch.permission_ids {
                    check_permissions_exist(&mut tx, ids).await?;
                }
                role::update(&mut tx, id, name, patch.description.as_deref(), patch.status)
                    .await?;
                if let Some(ids) = &patch.permission_ids {
                    role::set_permissions(&mut tx, id, ids).await?;
                }
                tx.commit().await?;
                Ok(())
            })
            .await?;

            if patch.status.is_some() || patch.permission_ids.is_some() {
                self.authz.notify_rbac_changed().await;
            }
            self.load_detail(id).await
        })
        .await
    }

    pub async fn activate_role(&self, ctx: &RequestContext, id: i64) -> AppResult<RoleDetail> {
        let patch = RoleUpdate {
            status: Some(Status::Enabled),
            ..Default::default()
        };
        self.update_role(ctx, id, patch).await
    }

    pub async fn deactivate_role(&self, ctx: &RequestContext, id: i64) -> AppResult<RoleDetail> {
        let patch = RoleUpdate {
            status: Some(Status::Disabled),
            ..Default::default()
        };
        self.update_role(ctx, id, patch).await
    }

    /// Removes principal and permission joins, then the role
    pub async fn delete_role(&self, ctx: &RequestContext, id: i64) -> AppResult<()> {
        ctx.guard(async {
            validate_id(id, "id")?;
            if id == BOOTSTRAP_ID {
                security_log!(
                    "WARN",
                    "protected_entity",
                    role_id = id,
                    operation = "delete",
                    request_id = ctx.request_id.as_str()
                );
                return Err(AppError::protected("role 1"));
            }
            let pool = &self.db.pool;
            retry_on_busy("delete_role", || async {
                let mut tx = pool.begin().await?;
                require_role(&mut tx, id).await?;
                role::delete(&mut tx, id).await?;
                tx.commit().await?;
                Ok(())
            })
            .await?;

            self.authz.notify_rbac_changed().await;
            tracing::info!(role_id = id, "Role deleted");
            Ok(())
        })
        .await
    }

    /// Replace the permission set of a role
    pub async fn set_role_permissions(
        &self,
        ctx: &RequestContext,
        role_id: i64,
        permission_ids: Vec<i64>,
    ) -> AppResult<RoleDetail> {
        let patch = RoleUpdate {
            permission_ids: Some(permission_ids),
            ..Default::default()
        };
        self.update_role(ctx, role_id, patch).await
    }

    /// Idempotent; returns whether the grant was new
    pub async fn assign_permission(
        &self,
        ctx: &RequestContext,
        role_id: i64,
        permission_id: i64,
    ) -> AppResult<bool> {
        ctx.guard(async {
            validate_id(role_id, "role_id")?;
            validate_id(permission_id, "permission_id")?;
            let pool = &self.db.pool;
            let added = retry_on_busy("assign_permission", || async {
                let mut tx = pool.begin().await?;
                require_role(&mut tx, role_id).await?;
                require_permission(&mut tx, permission_id).await?;
                let added = role::assign_permission(&mut tx, role_id, permission_id).await?;
                tx.commit().await?;
                Ok(added)
            })
            .await?;
            if added {
                self.authz.notify_rbac_changed().await;
            }
            Ok(added)
        })
        .await
    }

    /// Idempotent; returns whether a grant was removed
    pub async fn remove_permission(
        &self,
        ctx: &RequestContext,
        role_id: i64,
        permission_id: i64,
    ) -> AppResult<bool> {
        ctx.guard(async {
            validate_id(role_id, "role_id")?;
            validate_id(permission_id, "permission_id")?;
            let pool = &self.db.pool;
            let removed = retry_on_busy("remove_permission", || async {
                let mut tx = pool.begin().await?;
                require_role(&mut tx, role_id).await?;
                let removed = role::remove_permission(&mut tx, role_id, permission_id).await?;
                tx.commit().await?;
                Ok(removed)
            })
            .await?;
            if removed {
                self.authz.notify_rbac_changed().await;
            }
            Ok(removed)
        })
        .await
    }

    // ── Permissions ──────────────────────────────────────────────────

    pub async fn create_permission(
        &self,
        ctx: &RequestContext,
        req: PermissionCreate,
    ) -> AppResult<Permission> {
        ctx.guard(async {
            validate_required_text(&req.name, "name", MAX_NAME_LEN)?;
            validate_key_part(&req.resource, "resource")?;
            validate_key_part(&req.action, "action")?;
            validate_optional_text(&req.description, "description", MAX_NOTE_LEN)?;
            let req = PermissionCreate {
                name: req.name.trim().to_string(),
                ..req
            };

            let pool = &self.db.pool;
            let id = retry_on_busy("create_permission", || async {
                let mut tx = pool.begin().await?;
                check_permission_free(
                    &mut tx,
                    Some(req.name.as_str()),
                    Some((req.resource.as_str(), req.action.as_str())),
                    None,
                )
                .await?;
                let id = permission::create(&mut tx, &req).await?;
                tx.commit().await?;
                Ok(id)
            })
            .await?;

            tracing::info!(permission_id = id, key = %format!("{}:{}", req.resource, req.action), "Permission created");
            self.get_permission_inner(id).await
        })
        .await
    }

    async fn get_permission_inner(&self, id: i64) -> AppResult<Permission> {
        let mut conn = acquire(&self.db).await?;
        permission::find_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| permission_not_found(id))
    }

    pub async fn get_permission(&self, ctx: &RequestContext, id: i64) -> AppResult<Permission> {
        ctx.guard(async {
            validate_id(id, "id")?;
            self.get_permission_inner(id).await
        })
        .await
    }

    pub async fn list_permissions(
        &self,
        ctx: &RequestContext,
        page: Page,
    ) -> AppResult<PageResult<Permission>> {
        ctx.guard(async {
            let page = page.clamped();
            let mut conn = acquire(&self.db).await?;
            let (items, total) = permission::list(&mut conn, page).await?;
            Ok(PageResult::new(items, total, page))
        })
        .await
    }

    /// Permission 1 is immutable
    pub async fn update_permission(
        &self,
        ctx: &RequestContext,
        id: i64,
        patch: PermissionUpdate,
    ) -> AppResult<Permission> {
        ctx.guard(async {
            validate_id(id, "id")?;
            if let Some(name) = &patch.name {
                validate_required_text(name, "name", MAX_NAME_LEN)?;
            }
            if let Some(resource) = &patch.resource {
                validate_key_part(resource, "resource")?;
            }
            if let Some(action) = &patch.action {
                validate_key_part(action, "action")?;
            }
            validate_optional_text(&patch.description, "description", MAX_NOTE_LEN)?;
            if id == BOOTSTRAP_ID {
                security_log!(
                    "WARN",
                    "protected_entity",
                    permission_id = id,
                    operation = "update",
                    request_id = ctx.request_id.as_str()
                );
                return Err(AppError::protected("permission 1"));
            }
            let patch = PermissionUpdate {
                name: patch.name.as_deref().map(|n| n.trim().to_string()),
                ..patch
            };

            let pool = &self.db.pool;
            retry_on_busy("update_permission", || async {
                let mut tx = pool.begin().await?;
                let current = require_permission(&mut tx, id).await?;
                let resource = patch.resource.as_deref().unwrap_or(&current.resource);
                let action = patch.action.as_deref().unwrap_or(&current.action);
                let key_changes = patch.resource.is_some() || patch.action.is_some();
                check_permission_free(
                    &mut tx,
                    patch.name.as_deref(),
                    key_changes.then_some((resource, action)),
                    Some(id),
                )
                .await?;
                permission::update(&mut tx, id, &patch).await?;
                tx.commit().await?;
                Ok(())
            })
            .await?;

            self.authz.notify_rbac_changed().await;
            self.get_permission_inner(id).await
        })
        .await
    }

    /// Removes role grants, then the permission
    pub async fn delete_permission(&self, ctx: &RequestContext, id: i64) -> AppResult<()> {
        ctx.guard(async {
            validate_id(id, "id")?;
            if id == BOOTSTRAP_ID {
                security_log!(
                    "WARN",
                    "protected_entity",
                    permission_id = id,
                    operation = "delete",
                    request_id = ctx.request_id.as_str()
                );
                return Err(AppError::protected("permission 1"));
            }
            let pool = &self.db.pool;
            retry_on_busy("delete_permission", || async {
                let mut tx = pool.begin().await?;
                require_permission(&mut tx, id).await?;
                permission::delete(&mut tx, id).await?;
                tx.commit().await?;
                Ok(())
            })
            .await?;

            self.authz.notify_rbac_changed().await;
            tracing::info!(permission_id = id, "Permission deleted");
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;

    async fn setup() -> RoleService {
        let db = DbService::in_memory().await.unwrap();
        let store = Arc::new(MemorySessionStore::new());
        let authz = Arc::new(AuthzService::new(db.clone(), store));
        RoleService::new(db, authz)
    }

    #[tokio::test]
    async fn test_create_role_with_permissions() {
        let svc = setup().await;
        let ctx = RequestContext::new();
        let detail = svc
            .create_role(
                &ctx,
                RoleCreate {
                    name: "auditor".into(),
                    description: Some("Read-only".into()),
                    permission_ids: vec![2, 4],
                },
            )
            .await
            .unwrap();
        assert_eq!(detail.role.name, "auditor");
        assert_eq!(detail.permissions.len(), 2);

        let err = svc
            .create_role(
                &ctx,
                RoleCreate {
                    name: "auditor".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RoleNameExists);

        let err = svc
            .create_role(
                &ctx,
                RoleCreate {
                    name: "ghost".into(),
                    permission_ids: vec![999],
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PermissionNotFound);
    }

    #[tokio::test]
    async fn test_bootstrap_role_and_permission_protected() {
        let svc = setup().await;
        let ctx = RequestContext::new();
        assert_eq!(
            svc.deactivate_role(&ctx, 1).await.unwrap_err().code,
            ErrorCode::ProtectedEntity
        );
        assert_eq!(
            svc.delete_role(&ctx, 1).await.unwrap_err().code,
            ErrorCode::ProtectedEntity
        );
        assert_eq!(
            svc.remove_permission(&ctx, 1, 1).await.unwrap_err().code,
            ErrorCode::ProtectedEntity
        );
        assert_eq!(
            svc.set_role_permissions(&ctx, 1, vec![2]).await.unwrap_err().code,
            ErrorCode::ProtectedEntity
        );
        let patch = PermissionUpdate {
            description: Some("changed".into()),
            ..Default::default()
        };
        assert_eq!(
            svc.update_permission(&ctx, 1, patch).await.unwrap_err().code,
            ErrorCode::ProtectedEntity
        );
        assert_eq!(
            svc.delete_permission(&ctx, 1).await.unwrap_err().code,
            ErrorCode::ProtectedEntity
        );
    }

    #[tokio::test]
    async fn test_permission_key_unique() {
        let svc = setup().await;
        let ctx = RequestContext::new();
        let created = svc
            .create_permission(
                &ctx,
                PermissionCreate {
                    name: "scans:run".into(),
                    resource: "scans".into(),
                    action: "run".into(),
                    description: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(created.key(), "scans:run");

        let err = svc
            .create_permission(
                &ctx,
                PermissionCreate {
                    name: "scans:execute".into(),
                    resource: "scans".into(),
                    action: "run".into(),
                    description: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PermissionExists);

        let err = svc
            .create_permission(
                &ctx,
                PermissionCreate {
                    name: "bad".into(),
                    resource: "scans:x".into(),
                    action: "run".into(),
                    description: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn test_delete_permission_cascades_grants() {
        let svc = setup().await;
        let ctx = RequestContext::new();
        let p = svc
            .create_permission(
                &ctx,
                PermissionCreate {
                    name: "tags:write".into(),
                    resource: "tags".into(),
                    action: "write".into(),
                    description: None,
                },
            )
            .await
            .unwrap();
        assert!(svc.assign_permission(&ctx, 1, p.id).await.unwrap());
        assert!(!svc.assign_permission(&ctx, 1, p.id).await.unwrap());

        svc.delete_permission(&ctx, p.id).await.unwrap();
        let detail = svc.get_role(&ctx, 1).await.unwrap();
        assert!(detail.permissions.iter().all(|x| x.id != p.id));
        assert_eq!(
            svc.get_permission(&ctx, p.id).await.unwrap_err().code,
            ErrorCode::PermissionNotFound
        );
    }

    #[tokio::test]
    async fn test_list_roles_paginates() {
        let svc = setup().await;
        let ctx = RequestContext::new();
        for name in ["r1", "r2", "r3"] {
            svc.create_role(
                &ctx,
                RoleCreate {
                    name: name.into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }
        let page = svc.list_roles(&ctx, Page::new(0, 2)).await.unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.items.len(), 2);
    }
}

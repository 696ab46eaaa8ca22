//! Identity Service
//!
//! Principal lifecycle: registration, admin CRUD, passwords, role
//! assignment and activation. Durable writes go through one Principal Store
//! transaction; Session Store side effects afterwards are best-effort.

use std::sync::Arc;
use std::time::Duration;

use shared::models::{
    BOOTSTRAP_ID, ChangePasswordRequest, Page, PageResult, Principal, PrincipalCreate,
    PrincipalUpdate, PrincipalView, ProfileUpdate, RegisterRequest, ResetPasswordRequest, Status,
};
use sqlx::SqliteConnection;

use super::authorization::AuthzService;
use super::{acquire, best_effort};
use crate::auth::{PasswordError, PasswordHasher};
use crate::db::repository::principal::{self, NewPrincipal, PrincipalFields};
use crate::db::repository::{RepoError, RepoResult, role};
use crate::db::{DbService, retry_on_busy};
use crate::session::SessionStore;
use crate::utils::validation::{
    MAX_NAME_LEN, MAX_NOTE_LEN, MAX_SHORT_TEXT_LEN, MAX_URL_LEN, validate_email, validate_id,
    validate_optional_text, validate_password_present, validate_password_strength,
    validate_username,
};
use crate::{AppError, AppResult, ErrorCode, RequestContext, security_log};

/// Compare-and-swap rounds before a password change gives up
const MAX_CAS_ATTEMPTS: usize = 3;

fn principal_not_found(id: i64) -> AppError {
    AppError::with_message(ErrorCode::PrincipalNotFound, format!("Principal {id} not found"))
        .with_detail("id", id)
}

/// Uniqueness and existence checks shared by create and update
async fn check_unique(
    conn: &mut SqliteConnection,
    username: Option<&str>,
    email: Option<&str>,
    exclude: Option<i64>,
) -> RepoResult<()> {
    if let Some(username) = username
        && principal::username_taken(&mut *conn, username, exclude).await?
    {
        return Err(RepoError::Business(
            ErrorCode::UsernameExists,
            format!("Username '{username}' already exists"),
        ));
    }
    if let Some(email) = email
        && principal::email_taken(&mut *conn, email, exclude).await?
    {
        return Err(RepoError::Business(
            ErrorCode::EmailExists,
            format!("Email '{email}' already exists"),
        ));
    }
    Ok(())
}

async fn check_roles_exist(conn: &mut SqliteConnection, role_ids: &[i64]) -> RepoResult<()> {
    let missing = role::missing(conn, role_ids).await?;
    if !missing.is_empty() {
        return Err(RepoError::Business(
            ErrorCode::RoleNotFound,
            format!("Roles not found: {missing:?}"),
        ));
    }
    Ok(())
}

async fn require_principal(conn: &mut SqliteConnection, id: i64) -> RepoResult<Principal> {
    principal::find_by_id(conn, id).await?.ok_or_else(|| {
        RepoError::Business(ErrorCode::PrincipalNotFound, format!("Principal {id} not found"))
    })
}

pub struct IdentityService {
    db: DbService,
    store: Arc<dyn SessionStore>,
    hasher: PasswordHasher,
    authz: Arc<AuthzService>,
    default_reset_password: String,
    /// TTL of password-version cache entries
    cache_ttl: Duration,
}

impl IdentityService {
    pub fn new(
        db: DbService,
        store: Arc<dyn SessionStore>,
        hasher: PasswordHasher,
        authz: Arc<AuthzService>,
        default_reset_password: String,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            db,
            store,
            hasher,
            authz,
            default_reset_password,
            cache_ttl,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    async fn load_principal(&self, id: i64) -> AppResult<Principal> {
        let mut conn = acquire(&self.db).await?;
        principal::find_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| principal_not_found(id))
    }

    async fn load_view(&self, id: i64) -> AppResult<PrincipalView> {
        let mut conn = acquire(&self.db).await?;
        let p = principal::find_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| principal_not_found(id))?;
        let roles = principal::roles_of(&mut conn, id)
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect();
        Ok(p.to_view(roles))
    }

    pub async fn get_principal(&self, ctx: &RequestContext, id: i64) -> AppResult<PrincipalView> {
        ctx.guard(async {
            validate_id(id, "id")?;
            self.load_view(id).await
        })
        .await
    }

    pub async fn list_principals(
        &self,
        ctx: &RequestContext,
        page: Page,
    ) -> AppResult<PageResult<PrincipalView>> {
        ctx.guard(async {
            let page = page.clamped();
            let mut conn = acquire(&self.db).await?;
            let (items, total) = principal::list(&mut conn, page).await?;
            let mut views = Vec::with_capacity(items.len());
            for p in items {
                let roles = principal::roles_of(&mut conn, p.id)
                    .await?
                    .into_iter()
                    .map(|r| r.name)
                    .collect();
                views.push(p.to_view(roles));
            }
            Ok(PageResult::new(views, total, page))
        })
        .await
    }

    // ── Creation ─────────────────────────────────────────────────────

    async fn insert_principal(&self, data: &NewPrincipal, role_ids: &[i64]) -> AppResult<i64> {
        let pool = &self.db.pool;
        let id = retry_on_busy("create_principal", || async {
            let mut tx = pool.begin().await?;
            check_unique(&mut tx, Some(&data.username), Some(&data.email), None).await?;
            check_roles_exist(&mut tx, role_ids).await?;
            let id = principal::create(&mut tx, data).await?;
            for role_id in role_ids {
                principal::assign_role(&mut tx, id, *role_id).await?;
            }
            tx.commit().await?;
            Ok(id)
        })
        .await?;
        Ok(id)
    }

    /// Self-service sign-up. The new principal has no roles.
    pub async fn register(
        &self,
        ctx: &RequestContext,
        req: RegisterRequest,
    ) -> AppResult<PrincipalView> {
        ctx.guard(async {
            validate_username(&req.username)?;
            let email = validate_email(&req.email)?;
            validate_password_strength(&req.password, "password")?;
            validate_optional_text(&req.nickname, "nickname", MAX_NAME_LEN)?;

            let data = NewPrincipal {
                username: req.username.clone(),
                email,
                password_hash: self.hasher.hash(&req.password).await?,
                nickname: req.nickname.clone(),
                last_login_ip: ctx.client_ip.clone(),
                ..Default::default()
            };
            let id = self.insert_principal(&data, &[]).await?;

            security_log!(
                "INFO",
                "principal_registered",
                principal_id = id,
                username = data.username.as_str(),
                request_id = ctx.request_id.as_str()
            );
            self.load_view(id).await
        })
        .await
    }

    /// Admin creation with initial roles; every role id must exist.
    pub async fn create_principal(
        &self,
        ctx: &RequestContext,
        req: PrincipalCreate,
    ) -> AppResult<PrincipalView> {
        ctx.guard(async {
            validate_username(&req.username)?;
            let email = validate_email(&req.email)?;
            validate_password_strength(&req.password, "password")?;
            validate_optional_text(&req.nickname, "nickname", MAX_NAME_LEN)?;
            validate_optional_text(&req.avatar, "avatar", MAX_URL_LEN)?;
            validate_optional_text(&req.phone, "phone", MAX_SHORT_TEXT_LEN)?;
            validate_optional_text(&req.remark, "remark", MAX_NOTE_LEN)?;
            for role_id in &req.role_ids {
                validate_id(*role_id, "role_ids")?;
            }

            let data = NewPrincipal {
                username: req.username.clone(),
                email,
                password_hash: self.hasher.hash(&req.password).await?,
                nickname: req.nickname.clone(),
                avatar: req.avatar.clone(),
                phone: req.phone.clone(),
                remark: req.remark.clone(),
                last_login_ip: None,
            };
            let id = self.insert_principal(&data, &req.role_ids).await?;
            tracing::info!(principal_id = id, username = %data.username, "Principal created");
            self.load_view(id).await
        })
        .await
    }

    // ── Updates ──────────────────────────────────────────────────────

    /// Layered update: parameters, then business rules, then one transaction
    pub async fn update_principal(
        &self,
        ctx: &RequestContext,
        id: i64,
        patch: PrincipalUpdate,
    ) -> AppResult<PrincipalView> {
        ctx.guard(async {
            // parameter layer
            validate_id(id, "id")?;
            if let Some(username) = &patch.username {
                validate_username(username)?;
            }
            let email = patch.email.as_deref().map(validate_email).transpose()?;
            if let Some(password) = &patch.password {
                validate_password_strength(password, "password")?;
            }
            validate_optional_text(&patch.nickname, "nickname", MAX_NAME_LEN)?;
            validate_optional_text(&patch.avatar, "avatar", MAX_URL_LEN)?;
            validate_optional_text(&patch.phone, "phone", MAX_SHORT_TEXT_LEN)?;
            validate_optional_text(&patch.remark, "remark", MAX_NOTE_LEN)?;
            if let Some(role_ids) = &patch.role_ids {
                for role_id in role_ids {
                    validate_id(*role_id, "role_ids")?;
                }
            }

            // business layer
            if id == BOOTSTRAP_ID && patch.status == Some(Status::Disabled) {
                security_log!(
                    "WARN",
                    "protected_entity",
                    principal_id = id,
                    operation = "disable",
                    request_id = ctx.request_id.as_str()
                );
                return Err(AppError::protected("principal 1"));
            }

            let password_hash = match &patch.password {
                Some(password) => Some(self.hasher.hash(password).await?),
                None => None,
            };
            let fields = PrincipalFields {
                username: patch.username.clone(),
                email,
                nickname: patch.nickname.clone(),
                avatar: patch.avatar.clone(),
                phone: patch.phone.clone(),
                remark: patch.remark.clone(),
                status: patch.status,
            };
            let role_ids = patch.role_ids.as_deref();

            // execution layer
            let pool = &self.db.pool;
            let new_version = retry_on_busy("update_principal", || async {
                let mut tx = pool.begin().await?;
                require_principal(&mut tx, id).await?;
                check_unique(
                    &mut tx,
                    fields.username.as_deref(),
                    fields.email.as_deref(),
                    Some(id),
                )
                .await?;
                if let Some(role_ids) = role_ids {
                    check_roles_exist(&mut tx, role_ids).await?;
                }

                principal::update_fields(&mut tx, id, &fields).await?;
                let version = match &password_hash {
                    Some(hash) => {
                        principal::update_password_with_version(&mut tx, id, hash, None).await?
                    }
                    None => None,
                };
                if let Some(role_ids) = role_ids {
                    principal::set_roles(&mut tx, id, role_ids).await?;
                }
                tx.commit().await?;
                Ok(version)
            })
            .await?;

            if let Some(version) = new_version {
                self.after_password_change(id, version).await;
            }
            if patch.status == Some(Status::Disabled) {
                best_effort(
                    "session delete after disable",
                    id,
                    self.store.delete_all_sessions_for(id).await,
                );
            }
            if patch.status.is_some() || patch.role_ids.is_some() {
                self.authz.notify_rbac_changed().await;
            }
            self.load_view(id).await
        })
        .await
    }

    /// Self-service update; roles, status and password are not reachable here
    pub async fn update_profile(
        &self,
        ctx: &RequestContext,
        id: i64,
        patch: ProfileUpdate,
    ) -> AppResult<PrincipalView> {
        self.update_principal(ctx, id, patch.into()).await
    }

    pub async fn activate(&self, ctx: &RequestContext, id: i64) -> AppResult<PrincipalView> {
        self.update_principal(ctx, id, PrincipalUpdate::status_only(Status::Enabled))
            .await
    }

    /// Also drops the principal's sessions. Refused for principal 1.
    pub async fn deactivate(&self, ctx: &RequestContext, id: i64) -> AppResult<PrincipalView> {
        self.update_principal(ctx, id, PrincipalUpdate::status_only(Status::Disabled))
            .await
    }

    /// Remove role joins and soft-delete. Refused for principal 1.
    pub async fn delete_principal(&self, ctx: &RequestContext, id: i64) -> AppResult<()> {
        ctx.guard(async {
            validate_id(id, "id")?;
            if id == BOOTSTRAP_ID {
                security_log!(
                    "WARN",
                    "protected_entity",
                    principal_id = id,
                    operation = "delete",
                    request_id = ctx.request_id.as_str()
                );
                return Err(AppError::protected("principal 1"));
            }

            let pool = &self.db.pool;
            retry_on_busy("delete_principal", || async {
                let mut tx = pool.begin().await?;
                require_principal(&mut tx, id).await?;
                principal::soft_delete(&mut tx, id).await?;
                tx.commit().await?;
                Ok(())
            })
            .await?;

            best_effort(
                "session delete after principal delete",
                id,
                self.store.delete_all_sessions_for(id).await,
            );
            self.authz.notify_rbac_changed().await;
            tracing::info!(principal_id = id, "Principal deleted");
            Ok(())
        })
        .await
    }

    // ── Passwords ────────────────────────────────────────────────────

    /// Cache the new version and force a global logout. Best-effort.
    /// A placeholder hash never matches
    async fn old_password_matches(&self, plaintext: &str, hash: &str) -> AppResult<bool> {
        match self.hasher.verify(plaintext, hash).await {
            Ok(ok) => Ok(ok),
            Err(PasswordError::MalformedHash(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn after_password_change(&self, id: i64, version: i64) {
        best_effort(
            "password version cache write",
            id,
            self.store
                .store_password_version(id, version, self.cache_ttl)
                .await,
        );
        best_effort(
            "session delete after password change",
            id,
            self.store.delete_all_sessions_for(id).await,
        );
        self.authz.invalidate(id);
    }

    /// Returns the new password version.
    ///
    /// Concurrent changes that verified the same old password are resolved by
    /// compare-and-swap on the version: the loser re-checks the old password
    /// against the winner's hash and fails with `InvalidCredentials`.
    pub async fn change_password(
        &self,
        ctx: &RequestContext,
        id: i64,
        req: ChangePasswordRequest,
    ) -> AppResult<i64> {
        ctx.guard(async {
            validate_id(id, "id")?;
            validate_password_present(&req.old_password, "old_password")?;
            validate_password_strength(&req.new_password, "new_password")?;

            let mut current = self.load_principal(id).await?;
            if !self
                .old_password_matches(&req.old_password, &current.password_hash)
                .await?
            {
                security_log!(
                    "WARN",
                    "password_change_rejected",
                    principal_id = id,
                    request_id = ctx.request_id.as_str()
                );
                return Err(AppError::invalid_credentials().with_detail("field", "old_password"));
            }
            let new_hash = self.hasher.hash(&req.new_password).await?;

            let pool = &self.db.pool;
            for _ in 0..MAX_CAS_ATTEMPTS {
                let expected = current.password_version;
                let updated = retry_on_busy("change_password", || async {
                    let mut conn = pool.acquire().await?;
                    principal::update_password_with_version(&mut conn, id, &new_hash, Some(expected))
                        .await
                })
                .await?;

                if let Some(version) = updated {
                    self.after_password_change(id, version).await;
                    security_log!(
                        "INFO",
                        "password_changed",
                        principal_id = id,
                        password_version = version,
                        request_id = ctx.request_id.as_str()
                    );
                    return Ok(version);
                }

                current = self.load_principal(id).await?;
                if !self
                    .old_password_matches(&req.old_password, &current.password_hash)
                    .await?
                {
                    security_log!(
                        "WARN",
                        "password_change_lost_race",
                        principal_id = id,
                        request_id = ctx.request_id.as_str()
                    );
                    return Err(
                        AppError::invalid_credentials().with_detail("field", "old_password")
                    );
                }
            }
            Err(AppError::unavailable("password update kept conflicting, try again"))
        })
        .await
    }

    /// Admin reset without the old password; falls back to the configured default.
    pub async fn reset_password(
        &self,
        ctx: &RequestContext,
        id: i64,
        req: ResetPasswordRequest,
    ) -> AppResult<i64> {
        ctx.guard(async {
            validate_id(id, "id")?;
            let plaintext = match req.new_password {
                Some(p) => {
                    validate_password_strength(&p, "new_password")?;
                    p
                }
                None => self.default_reset_password.clone(),
            };
            let hash = self.hasher.hash(&plaintext).await?;

            let pool = &self.db.pool;
            let version = retry_on_busy("reset_password", || async {
                let mut conn = pool.acquire().await?;
                principal::update_password_with_version(&mut conn, id, &hash, None).await
            })
            .await?
            .ok_or_else(|| principal_not_found(id))?;

            self.after_password_change(id, version).await;
            security_log!(
                "INFO",
                "password_reset",
                principal_id = id,
                password_version = version,
                request_id = ctx.request_id.as_str()
            );
            Ok(version)
        })
        .await
    }

    // ── Role assignment ──────────────────────────────────────────────

    /// Idempotent; returns whether the assignment was new
    pub async fn assign_role(
        &self,
        ctx: &RequestContext,
        principal_id: i64,
        role_id: i64,
    ) -> AppResult<bool> {
        ctx.guard(async {
            validate_id(principal_id, "principal_id")?;
            validate_id(role_id, "role_id")?;
            let pool = &self.db.pool;
            let added = retry_on_busy("assign_role", || async {
                let mut tx = pool.begin().await?;
                require_principal(&mut tx, principal_id).await?;
                check_roles_exist(&mut tx, &[role_id]).await?;
                let added = principal::assign_role(&mut tx, principal_id, role_id).await?;
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

    /// Idempotent; returns whether an assignment was removed
    pub async fn remove_role(
        &self,
        ctx: &RequestContext,
        principal_id: i64,
        role_id: i64,
    ) -> AppResult<bool> {
        ctx.guard(async {
            validate_id(principal_id, "principal_id")?;
            validate_id(role_id, "role_id")?;
            let pool = &self.db.pool;
            let removed = retry_on_busy("remove_role", || async {
                let mut tx = pool.begin().await?;
                require_principal(&mut tx, principal_id).await?;
                let removed = principal::remove_role(&mut tx, principal_id, role_id).await?;
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

    /// Replace the role set
    pub async fn set_roles(
        &self,
        ctx: &RequestContext,
        principal_id: i64,
        role_ids: Vec<i64>,
    ) -> AppResult<PrincipalView> {
        let patch = PrincipalUpdate {
            role_ids: Some(role_ids),
            ..Default::default()
        };
        self.update_principal(ctx, principal_id, patch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;

    struct Fixture {
        db: DbService,
        store: Arc<MemorySessionStore>,
        svc: IdentityService,
    }

    async fn setup() -> Fixture {
        let db = DbService::in_memory().await.unwrap();
        let store = Arc::new(MemorySessionStore::new());
        let authz = Arc::new(AuthzService::new(db.clone(), store.clone()));
        let svc = IdentityService::new(
            db.clone(),
            store.clone(),
            PasswordHasher::with_params(1024, 1, 1).unwrap(),
            authz,
            "Reset-Pass-123".into(),
            Duration::from_secs(3600),
        );
        Fixture { db, store, svc }
    }

    fn register_req(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: "Secret-Pass-1".into(),
            nickname: None,
        }
    }

    #[tokio::test]
    async fn test_register_and_duplicates() {
        let f = setup().await;
        let ctx = RequestContext::new().with_client(Some("10.1.2.3".into()), None);
        let view = f
            .svc
            .register(&ctx, register_req("alice", "Alice@Example.com"))
            .await
            .unwrap();
        assert_eq!(view.email, "alice@example.com");
        assert_eq!(view.last_login_ip.as_deref(), Some("10.1.2.3"));
        assert!(view.roles.is_empty());

        let err = f
            .svc
            .register(&ctx, register_req("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UsernameExists);

        let err = f
            .svc
            .register(&ctx, register_req("alice2", "ALICE@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::EmailExists);
    }

    #[tokio::test]
    async fn test_register_rejects_weak_password() {
        let f = setup().await;
        let mut req = register_req("carol", "carol@example.com");
        req.password = "short".into();
        let err = f.svc.register(&RequestContext::new(), req).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PasswordTooWeak);
    }

    #[tokio::test]
    async fn test_create_with_missing_role_writes_nothing() {
        let f = setup().await;
        let ctx = RequestContext::new();
        let req = PrincipalCreate {
            username: "dave".into(),
            email: "dave@example.com".into(),
            password: "Secret-Pass-1".into(),
            role_ids: vec![1, 999],
            ..Default::default()
        };
        let err = f.svc.create_principal(&ctx, req).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::RoleNotFound);

        let mut conn = f.db.pool.acquire().await.unwrap();
        assert!(principal::find_by_username(&mut conn, "dave").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_principal_protected() {
        let f = setup().await;
        let ctx = RequestContext::new();
        let err = f.svc.deactivate(&ctx, BOOTSTRAP_ID).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ProtectedEntity);
        let err = f.svc.delete_principal(&ctx, BOOTSTRAP_ID).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ProtectedEntity);
        let err = f.svc.delete_principal(&ctx, 0).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn test_change_password_bumps_version_and_drops_sessions() {
        let f = setup().await;
        let ctx = RequestContext::new();
        let view = f
            .svc
            .register(&ctx, register_req("erin", "erin@example.com"))
            .await
            .unwrap();

        let err = f
            .svc
            .change_password(
                &ctx,
                view.id,
                ChangePasswordRequest {
                    old_password: "wrong-password".into(),
                    new_password: "Another-Pass-2".into(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidCredentials);

        let version = f
            .svc
            .change_password(
                &ctx,
                view.id,
                ChangePasswordRequest {
                    old_password: "Secret-Pass-1".into(),
                    new_password: "Another-Pass-2".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(version, 2);
        assert_eq!(f.store.get_password_version(view.id).await.unwrap(), Some(2));
        assert!(f.store.get_session(view.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_change_password_on_placeholder_hash_is_rejected() {
        let f = setup().await;
        let err = f
            .svc
            .change_password(
                &RequestContext::new(),
                BOOTSTRAP_ID,
                ChangePasswordRequest {
                    old_password: "!".into(),
                    new_password: "Another-Pass-2".into(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidCredentials);

        let mut conn = f.db.pool.acquire().await.unwrap();
        assert_eq!(
            principal::get_password_version(&mut conn, BOOTSTRAP_ID)
                .await
                .unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_reset_password_uses_default() {
        let f = setup().await;
        let ctx = RequestContext::new();
        let view = f
            .svc
            .register(&ctx, register_req("frank", "frank@example.com"))
            .await
            .unwrap();
        let version = f
            .svc
            .reset_password(&ctx, view.id, ResetPasswordRequest::default())
            .await
            .unwrap();
        assert_eq!(version, 2);

        let mut conn = f.db.pool.acquire().await.unwrap();
        let p = principal::find_by_id(&mut conn, view.id).await.unwrap().unwrap();
        drop(conn);
        let hasher = PasswordHasher::with_params(1024, 1, 1).unwrap();
        assert!(hasher.verify("Reset-Pass-123", &p.password_hash).await.unwrap());

        let err = f
            .svc
            .reset_password(&ctx, 999, ResetPasswordRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PrincipalNotFound);
    }

    #[tokio::test]
    async fn test_role_assignment_is_idempotent() {
        let f = setup().await;
        let ctx = RequestContext::new();
        let view = f
            .svc
            .register(&ctx, register_req("grace", "grace@example.com"))
            .await
            .unwrap();
        assert!(f.svc.assign_role(&ctx, view.id, 1).await.unwrap());
        assert!(!f.svc.assign_role(&ctx, view.id, 1).await.unwrap());
        let err = f.svc.assign_role(&ctx, view.id, 999).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::RoleNotFound);
        assert!(f.svc.remove_role(&ctx, view.id, 1).await.unwrap());
        assert!(!f.svc.remove_role(&ctx, view.id, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_username_conflict_and_delete() {
        let f = setup().await;
        let ctx = RequestContext::new();
        let a = f
            .svc
            .register(&ctx, register_req("heidi", "heidi@example.com"))
            .await
            .unwrap();
        f.svc
            .register(&ctx, register_req("ivan", "ivan@example.com"))
            .await
            .unwrap();

        let patch = PrincipalUpdate {
            username: Some("ivan".into()),
            ..Default::default()
        };
        let err = f.svc.update_principal(&ctx, a.id, patch).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UsernameExists);

        let view = f
            .svc
            .update_profile(
                &ctx,
                a.id,
                ProfileUpdate {
                    nickname: Some("Heidi".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(view.nickname.as_deref(), Some("Heidi"));

        f.svc.delete_principal(&ctx, a.id).await.unwrap();
        let err = f.svc.get_principal(&ctx, a.id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PrincipalNotFound);
    }
}

//! Authorization Service
//!
//! Effective grants of a principal are the enabled permissions of its
//! enabled roles. Checks are exact on `(resource, action)`.
//!
//! Grants are cached per principal, tagged with the cached password version
//! and the RBAC epoch; a change of either discards the entry. When the
//! Session Store cannot supply the tag the cache is bypassed.

use std::sync::Arc;

use dashmap::DashMap;
use sqlx::SqliteConnection;

use super::acquire;
use crate::db::DbService;
use crate::db::repository::{RepoResult, principal};
use crate::session::SessionStore;
use crate::{AppResult, RequestContext, security_log};

/// Effective grants of an enabled principal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grants {
    /// Names of enabled roles
    pub roles: Vec<String>,
    /// `resource:action` keys, deduplicated
    pub permissions: Vec<String>,
}

impl Grants {
    pub fn allows(&self, resource: &str, action: &str) -> bool {
        let key = shared::models::permission_key(resource, action);
        self.permissions.iter().any(|p| *p == key)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Load grants without any principal status check
pub(crate) async fn load_grants(conn: &mut SqliteConnection, principal_id: i64) -> RepoResult<Grants> {
    let roles = principal::roles_of(&mut *conn, principal_id)
        .await?
        .into_iter()
        .filter(|r| r.status.is_enabled())
        .map(|r| r.name)
        .collect();
    let permissions = principal::effective_permissions(conn, principal_id)
        .await?
        .iter()
        .map(|p| p.key())
        .collect();
    Ok(Grants { roles, permissions })
}

#[derive(Debug, Clone)]
struct CachedGrants {
    grants: Option<Arc<Grants>>,
    password_version: i64,
    epoch: u64,
}

/// 授权服务
pub struct AuthzService {
    db: DbService,
    store: Arc<dyn SessionStore>,
    cache: DashMap<i64, CachedGrants>,
}

impl AuthzService {
    pub fn new(db: DbService, store: Arc<dyn SessionStore>) -> Self {
        Self {
            db,
            store,
            cache: DashMap::new(),
        }
    }

    async fn cache_tag(&self, principal_id: i64) -> Option<(i64, u64)> {
        let epoch = self.store.rbac_epoch().await;
        let version = self.store.get_password_version(principal_id).await;
        match (version, epoch) {
            (Ok(Some(v)), Ok(e)) => Some((v, e)),
            (Err(e), _) | (_, Err(e)) => {
                tracing::debug!(principal_id, error = %e, "Grant cache bypassed");
                None
            }
            (Ok(None), _) => None,
        }
    }

    async fn resolve(&self, principal_id: i64) -> AppResult<Option<Arc<Grants>>> {
        // The tag is read before the load, so a concurrent mutation leaves a stale tag behind
        let tag = self.cache_tag(principal_id).await;
        if let Some((version, epoch)) = tag
            && let Some(hit) = self.cache.get(&principal_id)
            && hit.password_version == version
            && hit.epoch == epoch
        {
            return Ok(hit.grants.clone());
        }

        let grants = {
            let mut conn = acquire(&self.db).await?;
            match principal::find_by_id(&mut conn, principal_id).await? {
                Some(p) if p.status.is_enabled() => {
                    Some(Arc::new(load_grants(&mut conn, principal_id).await?))
                }
                _ => None,
            }
        };

        match tag {
            Some((password_version, epoch)) => {
                self.cache.insert(
                    principal_id,
                    CachedGrants {
                        grants: grants.clone(),
                        password_version,
                        epoch,
                    },
                );
            }
            None => {
                self.cache.remove(&principal_id);
            }
        }
        Ok(grants)
    }

    /// Effective grants; `None` for a missing, deleted or disabled principal
    pub async fn effective_grants(
        &self,
        ctx: &RequestContext,
        principal_id: i64,
    ) -> AppResult<Option<Arc<Grants>>> {
        ctx.guard(self.resolve(principal_id)).await
    }

    pub async fn check_permission(
        &self,
        ctx: &RequestContext,
        principal_id: i64,
        resource: &str,
        action: &str,
    ) -> AppResult<bool> {
        ctx.guard(async {
            let allowed = self
                .resolve(principal_id)
                .await?
                .is_some_and(|g| g.allows(resource, action));
            if !allowed {
                security_log!(
                    "WARN",
                    "permission_denied",
                    principal_id = principal_id,
                    resource = resource,
                    action = action,
                    request_id = ctx.request_id.as_str()
                );
            }
            Ok(allowed)
        })
        .await
    }

    pub async fn check_role(
        &self,
        ctx: &RequestContext,
        principal_id: i64,
        role_name: &str,
    ) -> AppResult<bool> {
        ctx.guard(async {
            Ok(self
                .resolve(principal_id)
                .await?
                .is_some_and(|g| g.has_role(role_name)))
        })
        .await
    }

    /// Drop the local entry of one principal
    pub fn invalidate(&self, principal_id: i64) {
        self.cache.remove(&principal_id);
    }

    /// Role/permission/assignment/status state changed: bump the fleet-wide
    /// epoch and drop local entries. Best-effort.
    pub async fn notify_rbac_changed(&self) {
        self.cache.clear();
        if let Err(e) = self.store.bump_rbac_epoch().await {
            tracing::warn!(error = %e, "RBAC epoch bump failed, continuing");
        }
    }

    #[cfg(test)]
    pub(crate) fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::principal::NewPrincipal;
    use crate::db::repository::role;
    use crate::session::MemorySessionStore;
    use std::time::Duration;

    async fn setup() -> (DbService, Arc<MemorySessionStore>, AuthzService, i64) {
        let db = DbService::in_memory().await.unwrap();
        let store = Arc::new(MemorySessionStore::new());
        let authz = AuthzService::new(db.clone(), store.clone());
        let bob = {
            let mut conn = db.pool.acquire().await.unwrap();
            let bob = principal::create(
                &mut conn,
                &NewPrincipal {
                    username: "bob".into(),
                    email: "bob@example.com".into(),
                    password_hash: "h".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
            let viewer = role::create(&mut conn, "viewer", None).await.unwrap();
            role::assign_permission(&mut conn, viewer, 2).await.unwrap();
            principal::assign_role(&mut conn, bob, viewer).await.unwrap();
            bob
        };
        store
            .store_password_version(bob, 1, Duration::from_secs(60))
            .await
            .unwrap();
        (db, store, authz, bob)
    }

    #[tokio::test]
    async fn test_exact_match_only() {
        let (_db, _store, authz, bob) = setup().await;
        let ctx = RequestContext::new();
        assert!(authz.check_permission(&ctx, bob, "users", "read").await.unwrap());
        assert!(!authz.check_permission(&ctx, bob, "users", "write").await.unwrap());
        assert!(!authz.check_permission(&ctx, bob, "users", "*").await.unwrap());
        assert!(authz.check_role(&ctx, bob, "viewer").await.unwrap());
        assert!(!authz.check_role(&ctx, bob, "admin").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_principal_denied() {
        let (_db, _store, authz, _bob) = setup().await;
        let ctx = RequestContext::new();
        assert!(!authz.check_permission(&ctx, 999, "users", "read").await.unwrap());
        assert!(authz.effective_grants(&ctx, 999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_epoch_bump_discards_cached_grants() {
        let (db, _store, authz, bob) = setup().await;
        let ctx = RequestContext::new();
        assert!(authz.check_permission(&ctx, bob, "users", "read").await.unwrap());
        assert_eq!(authz.cached_entries(), 1);

        {
            let mut conn = db.pool.acquire().await.unwrap();
            let viewer = role::find_by_name(&mut conn, "viewer").await.unwrap().unwrap();
            role::delete(&mut conn, viewer.id).await.unwrap();
        }
        authz.notify_rbac_changed().await;

        assert!(!authz.check_permission(&ctx, bob, "users", "read").await.unwrap());
        assert!(!authz.check_role(&ctx, bob, "viewer").await.unwrap());
    }

    async fn decisions(authz: &AuthzService, bob: i64) -> Vec<bool> {
        let ctx = RequestContext::new();
        let mut out = Vec::new();
        for (resource, action) in [("users", "read"), ("users", "write"), ("roles", "read")] {
            out.push(authz.check_permission(&ctx, bob, resource, action).await.unwrap());
        }
        for role_name in ["viewer", "admin"] {
            out.push(authz.check_role(&ctx, bob, role_name).await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_decisions_identical_with_or_without_cache() {
        let (_db, store, authz, bob) = setup().await;

        let cold = decisions(&authz, bob).await;
        assert_eq!(authz.cached_entries(), 1);
        let warm = decisions(&authz, bob).await;
        assert_eq!(cold, warm);

        // Epoch moves with no data change: entry misses, answers stay
        store.bump_rbac_epoch().await.unwrap();
        assert_eq!(decisions(&authz, bob).await, cold);

        authz.notify_rbac_changed().await;
        assert_eq!(authz.cached_entries(), 0);
        assert_eq!(decisions(&authz, bob).await, cold);
        assert_eq!(cold, vec![true, false, false, true, false]);
    }

    #[tokio::test]
    async fn test_stale_entry_ignored_when_version_changes() {
        let (db, store, authz, bob) = setup().await;
        let ctx = RequestContext::new();
        assert!(authz.check_permission(&ctx, bob, "users", "read").await.unwrap());

        // Direct DB change without notification; only the version moves
        {
            let mut conn = db.pool.acquire().await.unwrap();
            sqlx::query("DELETE FROM principal_role WHERE principal_id = ?")
                .bind(bob)
                .execute(&mut *conn)
                .await
                .unwrap();
        }
        assert!(authz.check_permission(&ctx, bob, "users", "read").await.unwrap());

        store
            .store_password_version(bob, 2, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!authz.check_permission(&ctx, bob, "users", "read").await.unwrap());
    }

    #[tokio::test]
    async fn test_disabled_principal_denied() {
        let (db, _store, authz, bob) = setup().await;
        let ctx = RequestContext::new();
        {
            let mut conn = db.pool.acquire().await.unwrap();
            let fields = principal::PrincipalFields {
                status: Some(shared::models::Status::Disabled),
                ..Default::default()
            };
            principal::update_fields(&mut conn, bob, &fields).await.unwrap();
        }
        authz.notify_rbac_changed().await;
        assert!(!authz.check_permission(&ctx, bob, "users", "read").await.unwrap());
    }
}

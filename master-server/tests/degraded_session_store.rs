//! Session Store failures on best-effort paths

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::*;
use master_server::ErrorCode;
use master_server::session::{
    MemorySessionStore, SessionStore, SessionStoreError, StoreResult,
};
use shared::models::{ChangePasswordRequest, SessionRecord};

/// Delegates to a memory store; cache writes and session deletes fail while `broken`
struct FlakyStore {
    inner: MemorySessionStore,
    broken: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemorySessionStore::new(),
            broken: AtomicBool::new(false),
        }
    }

    fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(SessionStoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn store_session(&self, record: &SessionRecord, ttl: Duration) -> StoreResult<()> {
        self.inner.store_session(record, ttl).await
    }

    async fn get_session(&self, principal_id: i64) -> StoreResult<Option<SessionRecord>> {
        self.inner.get_session(principal_id).await
    }

    async fn delete_session(&self, principal_id: i64) -> StoreResult<bool> {
        self.check()?;
        self.inner.delete_session(principal_id).await
    }

    async fn delete_all_sessions_for(&self, principal_id: i64) -> StoreResult<usize> {
        self.check()?;
        self.inner.delete_all_sessions_for(principal_id).await
    }

    async fn touch_session(&self, principal_id: i64, ttl: Duration) -> StoreResult<bool> {
        self.check()?;
        self.inner.touch_session(principal_id, ttl).await
    }

    async fn store_password_version(
        &self,
        principal_id: i64,
        version: i64,
        ttl: Duration,
    ) -> StoreResult<()> {
        self.check()?;
        self.inner
            .store_password_version(principal_id, version, ttl)
            .await
    }

    async fn get_password_version(&self, principal_id: i64) -> StoreResult<Option<i64>> {
        self.inner.get_password_version(principal_id).await
    }

    async fn delete_password_version(&self, principal_id: i64) -> StoreResult<()> {
        self.inner.delete_password_version(principal_id).await
    }

    async fn mark_revoked(&self, jti: &str, ttl: Duration) -> StoreResult<bool> {
        self.inner.mark_revoked(jti, ttl).await
    }

    async fn is_revoked(&self, jti: &str) -> StoreResult<bool> {
        self.inner.is_revoked(jti).await
    }

    async fn bump_rbac_epoch(&self) -> StoreResult<u64> {
        self.check()?;
        self.inner.bump_rbac_epoch().await
    }

    async fn rbac_epoch(&self) -> StoreResult<u64> {
        self.inner.rbac_epoch().await
    }

    async fn purge_expired(&self) -> StoreResult<usize> {
        self.inner.purge_expired().await
    }
}

#[tokio::test]
async fn test_password_change_survives_cache_outage() {
    let store = Arc::new(FlakyStore::new());
    let state = state_with_store(store.clone()).await;
    let alice = register_alice(&state).await;
    let t1 = login(&state, "alice", ALICE_PASSWORD).await.tokens;

    store.set_broken(true);
    let version = state
        .identity
        .change_password(
            &ctx(),
            alice.id,
            ChangePasswordRequest {
                old_password: ALICE_PASSWORD.into(),
                new_password: "P@ssw0rd2".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(version, 2);
    // The cache write was lost
    assert_eq!(store.get_password_version(alice.id).await.unwrap(), Some(1));

    store.set_broken(false);
    store.delete_password_version(alice.id).await.unwrap();
    let err = state
        .sessions
        .validate_session(&ctx(), &t1.access_token)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::TokenStale);
    assert_eq!(store.get_password_version(alice.id).await.unwrap(), Some(2));
}

#[tokio::test]
async fn test_logout_tolerates_failed_session_delete() {
    let store = Arc::new(FlakyStore::new());
    let state = state_with_store(store.clone()).await;
    register_alice(&state).await;
    let t = login(&state, "alice", ALICE_PASSWORD).await.tokens;

    store.set_broken(true);
    state.sessions.logout(&ctx(), &t.access_token).await.unwrap();
    store.set_broken(false);

    let err = state
        .sessions
        .validate_session(&ctx(), &t.access_token)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::TokenRevoked);
}

#[tokio::test]
async fn test_role_change_survives_epoch_outage() {
    let store = Arc::new(FlakyStore::new());
    let state = state_with_store(store.clone()).await;
    let alice = register_alice(&state).await;
    assert!(!state.authz.check_role(&ctx(), alice.id, "admin").await.unwrap());

    store.set_broken(true);
    assert!(state.identity.assign_role(&ctx(), alice.id, 1).await.unwrap());
    store.set_broken(false);

    // Local grants were dropped even though the epoch bump failed
    assert!(state.authz.check_role(&ctx(), alice.id, "admin").await.unwrap());
}

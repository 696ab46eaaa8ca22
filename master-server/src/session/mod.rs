//! Session Store
//!
//! Ephemeral state keyed by principal id or credential id:
//!
//! - active session record per principal (`session:{id}`)
//! - password-version cache (`pwdver:{id}`)
//! - revocation markers per credential (`revoked:{jti}`)
//! - RBAC epoch counter (`rbac:epoch`)
//!
//! Every entry except the epoch carries a TTL. Losing the whole store is
//! safe: durable state lives in the Principal Store and the cache is
//! repopulated on the next miss.

mod memory;

pub use memory::MemorySessionStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shared::models::SessionRecord;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::AppError;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    #[error("session entry is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<SessionStoreError> for AppError {
    fn from(err: SessionStoreError) -> Self {
        match err {
            SessionStoreError::Unavailable(msg) => AppError::unavailable(msg).context("session store"),
            SessionStoreError::Serialization(e) => {
                AppError::internal(e.to_string()).context("session store")
            }
        }
    }
}

pub type StoreResult<T> = Result<T, SessionStoreError>;

/// Per-key atomic operations with TTL
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Overwrites any existing session of the principal
    async fn store_session(&self, record: &SessionRecord, ttl: Duration) -> StoreResult<()>;

    async fn get_session(&self, principal_id: i64) -> StoreResult<Option<SessionRecord>>;

    /// Returns whether a live session was removed
    async fn delete_session(&self, principal_id: i64) -> StoreResult<bool>;

    /// All sessions of the principal. One per principal today.
    async fn delete_all_sessions_for(&self, principal_id: i64) -> StoreResult<usize>;

    /// Bump `last_active_at` and extend the TTL. `false` if no live session.
    async fn touch_session(&self, principal_id: i64, ttl: Duration) -> StoreResult<bool>;

    /// Cache write. Never lowers a cached version.
    async fn store_password_version(
        &self,
        principal_id: i64,
        version: i64,
        ttl: Duration,
    ) -> StoreResult<()>;

    async fn get_password_version(&self, principal_id: i64) -> StoreResult<Option<i64>>;

    /// Evict the cached version so the next read goes to the Principal Store
    async fn delete_password_version(&self, principal_id: i64) -> StoreResult<()>;

    /// Set the revocation marker. `true` only for the caller that set it.
    async fn mark_revoked(&self, jti: &str, ttl: Duration) -> StoreResult<bool>;

    async fn is_revoked(&self, jti: &str) -> StoreResult<bool>;

    /// Increment the fleet-wide RBAC epoch, returning the new value
    async fn bump_rbac_epoch(&self) -> StoreResult<u64>;

    async fn rbac_epoch(&self) -> StoreResult<u64>;

    /// Drop expired entries, returning how many were removed
    async fn purge_expired(&self) -> StoreResult<usize>;
}

pub(crate) fn session_key(principal_id: i64) -> String {
    format!("session:{principal_id}")
}

pub(crate) fn version_key(principal_id: i64) -> String {
    format!("pwdver:{principal_id}")
}

pub(crate) fn revoked_key(jti: &str) -> String {
    format!("revoked:{jti}")
}

pub(crate) const RBAC_EPOCH_KEY: &str = "rbac:epoch";

/// Periodic expiry sweep until `shutdown` fires
pub fn spawn_sweeper(
    store: Arc<dyn SessionStore>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "Session sweeper started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // 第一次 tick 立即返回
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match store.purge_expired().await {
                        Ok(0) => {}
                        Ok(n) => tracing::debug!(purged = n, "Expired session-store entries purged"),
                        Err(e) => tracing::warn!(error = %e, "Session sweep failed"),
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Session sweeper received shutdown signal");
                    return;
                }
            }
        }
    })
}

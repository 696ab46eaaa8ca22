//! In-process Session Store
//!
//! A `DashMap` keyspace of JSON values with per-key expiry. Expired entries
//! are invisible to reads and physically removed by `purge_expired`.
//! Per-key atomicity comes from the shard lock held by the entry API.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use shared::models::SessionRecord;
use shared::util::now_millis;
use tokio::time::Instant;

use super::{
    RBAC_EPOCH_KEY, SessionStore, StoreResult, revoked_key, session_key, version_key,
};

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// 内存会话存储
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: DashMap<String, Slot>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw entry count, expired entries included until purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get_live(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let value = {
            let slot = self.entries.get(key)?;
            slot.is_live(now).then(|| slot.value.clone())
        };
        if value.is_none() {
            self.entries.remove_if(key, |_, slot| !slot.is_live(now));
        }
        value
    }

    fn remove_live(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .remove(key)
            .is_some_and(|(_, slot)| slot.is_live(now))
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn store_session(&self, record: &SessionRecord, ttl: Duration) -> StoreResult<()> {
        let value = serde_json::to_string(record)?;
        self.entries
            .insert(session_key(record.principal_id), Slot::new(value, Some(ttl)));
        Ok(())
    }

    async fn get_session(&self, principal_id: i64) -> StoreResult<Option<SessionRecord>> {
        match self.get_live(&session_key(principal_id)) {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn delete_session(&self, principal_id: i64) -> StoreResult<bool> {
        Ok(self.remove_live(&session_key(principal_id)))
    }

    async fn delete_all_sessions_for(&self, principal_id: i64) -> StoreResult<usize> {
        Ok(usize::from(self.remove_live(&session_key(principal_id))))
    }

    async fn touch_session(&self, principal_id: i64, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let Some(mut slot) = self.entries.get_mut(&session_key(principal_id)) else {
            return Ok(false);
        };
        if !slot.is_live(now) {
            return Ok(false);
        }
        let mut record: SessionRecord = serde_json::from_str(&slot.value)?;
        record.last_active_at = now_millis();
        slot.value = serde_json::to_string(&record)?;
        slot.expires_at = Some(now + ttl);
        Ok(true)
    }

    async fn store_password_version(
        &self,
        principal_id: i64,
        version: i64,
        ttl: Duration,
    ) -> StoreResult<()> {
        let now = Instant::now();
        match self.entries.entry(version_key(principal_id)) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                let cached = slot
                    .is_live(now)
                    .then(|| slot.value.parse::<i64>().ok())
                    .flatten();
                let next = cached.map_or(version, |c| c.max(version));
                *slot = Slot::new(next.to_string(), Some(ttl));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(version.to_string(), Some(ttl)));
            }
        }
        Ok(())
    }

    async fn get_password_version(&self, principal_id: i64) -> StoreResult<Option<i64>> {
        Ok(self
            .get_live(&version_key(principal_id))
            .and_then(|v| v.parse().ok()))
    }

    async fn delete_password_version(&self, principal_id: i64) -> StoreResult<()> {
        self.entries.remove(&version_key(principal_id));
        Ok(())
    }

    async fn mark_revoked(&self, jti: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        match self.entries.entry(revoked_key(jti)) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    return Ok(false);
                }
                occupied.insert(Slot::new("1".into(), Some(ttl)));
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new("1".into(), Some(ttl)));
                Ok(true)
            }
        }
    }

    async fn is_revoked(&self, jti: &str) -> StoreResult<bool> {
        Ok(self.get_live(&revoked_key(jti)).is_some())
    }

    async fn bump_rbac_epoch(&self) -> StoreResult<u64> {
        let mut slot = self
            .entries
            .entry(RBAC_EPOCH_KEY.to_string())
            .or_insert_with(|| Slot::new("0".into(), None));
        let next = slot.value.parse::<u64>().unwrap_or(0) + 1;
        slot.value = next.to_string();
        Ok(next)
    }

    async fn rbac_epoch(&self) -> StoreResult<u64> {
        Ok(self
            .get_live(RBAC_EPOCH_KEY)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    async fn purge_expired(&self) -> StoreResult<usize> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, slot| slot.is_live(now));
        Ok(before.saturating_sub(self.entries.len()))
    }
}

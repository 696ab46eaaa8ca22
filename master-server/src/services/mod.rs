//! 业务服务
//!
//! - [`IdentityService`] - principal lifecycle and passwords
//! - [`RoleService`] - role and permission administration
//! - [`AuthzService`] - effective-grant resolution and checks
//! - [`SessionService`] - login, logout, refresh, session validation
//!
//! Every public method takes a [`crate::RequestContext`] and runs under its
//! deadline and cancellation.

pub mod authorization;
pub mod identity;
pub mod roles;
pub mod session;

pub use authorization::{AuthzService, Grants};
pub use identity::IdentityService;
pub use roles::RoleService;
pub use session::SessionService;

use sqlx::Sqlite;
use sqlx::pool::PoolConnection;

use crate::AppResult;
use crate::db::DbService;
use crate::db::repository::RepoError;
use crate::session::StoreResult;

pub(crate) async fn acquire(db: &DbService) -> AppResult<PoolConnection<Sqlite>> {
    Ok(db.pool.acquire().await.map_err(RepoError::from)?)
}

/// Log and swallow a failed best-effort side effect
pub(crate) fn best_effort<T>(what: &str, principal_id: i64, result: StoreResult<T>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(principal_id, error = %e, "{what} failed, continuing");
            None
        }
    }
}

//! Database Module
//!
//! Principal Store: SQLite connection pool, migrations and transaction helpers.

pub mod repository;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::time::Duration;

use futures::FutureExt;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

use crate::auth::PasswordHasher;
use crate::utils::AppError;
use repository::{RepoError, RepoResult, principal};
use shared::models::BOOTSTRAP_ID;

const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_STEP: Duration = Duration::from_millis(20);

/// Database service, owns a SQLite connection pool
#[derive(Clone)]
pub struct DbService {
    pub pool: SqlitePool,
}

impl DbService {
    /// Open (or create) a file database with WAL mode
    pub async fn new(db_path: &str) -> Result<Self, AppError> {
        // Build connection options: WAL, foreign keys, normal sync
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .map_err(|e| AppError::database(format!("Invalid database path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(5000))
            .foreign_keys(true)
            .optimize_on_close(true, None);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AppError::database(format!("Failed to open database: {e}")))?;

        tracing::info!(path = %db_path, "Database connection established (SQLite WAL, busy_timeout=5000ms)");
        Self::migrate(pool).await
    }

    /// Private in-memory database on a single connection
    pub async fn in_memory() -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AppError::database(format!("Invalid database path: {e}")))?
            .foreign_keys(true);

        // 每个内存连接都是独立的数据库, 必须只用一个连接且永不回收
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| AppError::database(format!("Failed to open database: {e}")))?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, AppError> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to apply migrations: {e}")))?;
        tracing::debug!("Database migrations applied");
        Ok(Self { pool })
    }

    /// Give the bootstrap principal its initial password if it still has none.
    ///
    /// Returns whether the password was set.
    pub async fn bootstrap_admin(
        &self,
        hasher: &PasswordHasher,
        password: &str,
    ) -> Result<bool, AppError> {
        let admin = {
            let mut conn = self.pool.acquire().await.map_err(RepoError::from)?;
            principal::find_any_by_id(&mut conn, BOOTSTRAP_ID).await?
        };
        let Some(admin) = admin else {
            return Err(AppError::internal("bootstrap principal is missing"));
        };
        if admin.password_hash != "!" {
            return Ok(false);
        }

        let hash = hasher.hash(password).await?;
        let mut conn = self.pool.acquire().await.map_err(RepoError::from)?;
        let set = principal::set_initial_password(&mut conn, BOOTSTRAP_ID, &hash).await?;
        if set {
            tracing::info!(username = %admin.username, "Bootstrap administrator password initialized");
        }
        Ok(set)
    }
}

/// Run a transactional unit of work, retrying on SQLITE_BUSY/LOCKED.
///
/// `work` is re-invoked from scratch on each attempt and must open its own
/// transaction. A panic inside `work` drops the transaction (rollback) and
/// is reported as `Internal`.
pub async fn retry_on_busy<T, F, Fut>(op: &'static str, mut work: F) -> RepoResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RepoResult<T>>,
{
    let mut attempt = 1;
    loop {
        let result = AssertUnwindSafe(work())
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let msg = panic_message(panic.as_ref());
                tracing::error!(op, panic = %msg, "Transaction panicked, rolled back");
                Err(RepoError::Internal(format!("{op} panicked: {msg}")))
            });

        match result {
            Err(RepoError::Busy(msg)) if attempt < MAX_ATTEMPTS => {
                tracing::warn!(op, attempt, error = %msg, "Database busy, retrying");
                tokio::time::sleep(BACKOFF_STEP * attempt).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_in_memory_is_migrated() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let admin = principal::find_by_id(&mut conn, BOOTSTRAP_ID)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(admin.username, "admin");
        assert_eq!(admin.password_hash, "!");
    }

    #[tokio::test]
    async fn test_bootstrap_admin_sets_password_once() {
        let db = DbService::in_memory().await.unwrap();
        let hasher = PasswordHasher::with_params(1024, 1, 1).unwrap();

        assert!(db.bootstrap_admin(&hasher, "Admin@123456").await.unwrap());
        assert!(!db.bootstrap_admin(&hasher, "Other@123456").await.unwrap());

        let mut conn = db.pool.acquire().await.unwrap();
        let admin = principal::find_by_id(&mut conn, BOOTSTRAP_ID)
            .await
            .unwrap()
            .unwrap();
        assert!(hasher.verify("Admin@123456", &admin.password_hash).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_on_busy_retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let out = retry_on_busy("test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(RepoError::Busy("locked".into()))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_on_busy_gives_up() {
        let calls = AtomicU32::new(0);
        let err = retry_on_busy("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(RepoError::Busy("locked".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RepoError::Busy(_)));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_panic_rolls_back() {
        let db = DbService::in_memory().await.unwrap();
        let pool = &db.pool;

        let explode = true;
        let err = retry_on_busy("panicky", || async {
            let mut tx = pool.begin().await?;
            sqlx::query("UPDATE principal SET nickname = 'changed' WHERE id = 1")
                .execute(&mut *tx)
                .await?;
            if explode {
                panic!("boom");
            }
            tx.commit().await?;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RepoError::Internal(_)));

        let nickname: Option<String> =
            sqlx::query_scalar("SELECT nickname FROM principal WHERE id = 1")
                .fetch_one(pool)
                .await
                .unwrap();
        assert_eq!(nickname.as_deref(), Some("Administrator"));
    }
}

//! Repository Module
//!
//! Free functions over `&mut SqliteConnection`, so the same call works on a
//! pooled connection or inside a transaction (`&mut *tx`).
//! Bootstrap protection for id=1 rows is enforced here.

pub mod permission;
pub mod principal;
pub mod role;

use shared::error::{AppError, ErrorCode};
use thiserror::Error;

/// Repository error types
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{1}")]
    Business(ErrorCode, String),

    #[error("Protected: {0}")]
    Protected(String),

    /// SQLITE_BUSY / SQLITE_LOCKED or pool exhaustion; retryable
    #[error("Database busy: {0}")]
    Busy(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepoError::NotFound(err.to_string()),
            sqlx::Error::PoolTimedOut => RepoError::Busy(err.to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepoError::Duplicate(db.message().to_string())
            }
            sqlx::Error::Database(db) => {
                let primary = db
                    .code()
                    .and_then(|c| c.parse::<i32>().ok())
                    .map(|c| c & 0xff);
                match primary {
                    Some(SQLITE_BUSY | SQLITE_LOCKED) => RepoError::Busy(db.message().to_string()),
                    _ => RepoError::Database(err.to_string()),
                }
            }
            _ => RepoError::Database(err.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(msg) => AppError::with_message(ErrorCode::NotFound, msg),
            RepoError::Duplicate(msg) => AppError::with_message(ErrorCode::AlreadyExists, msg),
            RepoError::Database(msg) => AppError::database(msg).context("principal store"),
            RepoError::Validation(msg) => AppError::validation(msg),
            RepoError::Business(code, msg) => AppError::with_message(code, msg),
            RepoError::Protected(msg) => AppError::with_message(ErrorCode::ProtectedEntity, msg),
            RepoError::Busy(msg) => AppError::unavailable(msg).context("principal store"),
            RepoError::Internal(msg) => AppError::internal(msg).context("principal store"),
        }
    }
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;

pub(crate) fn protected(entity: &str) -> RepoError {
    RepoError::Protected(format!("{entity} is a protected bootstrap entity"))
}

/// Ids from `ids` with no row in `table`, in input order
pub(crate) async fn missing_ids(
    conn: &mut sqlx::SqliteConnection,
    table: &'static str,
    ids: &[i64],
) -> RepoResult<Vec<i64>> {
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE id = ?");
    let mut missing = Vec::new();
    for id in ids {
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;
        if count == 0 && !missing.contains(id) {
            missing.push(*id);
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::error::ErrorKind;

    #[test]
    fn test_repo_error_kind_mapping() {
        let cases = [
            (RepoError::NotFound("x".into()), ErrorKind::NotFound),
            (RepoError::Duplicate("x".into()), ErrorKind::AlreadyExists),
            (RepoError::Protected("x".into()), ErrorKind::ProtectedEntity),
            (RepoError::Busy("x".into()), ErrorKind::Unavailable),
            (RepoError::Database("x".into()), ErrorKind::Internal),
            (RepoError::Validation("x".into()), ErrorKind::ValidationFailure),
            (
                RepoError::Business(ErrorCode::RoleNotFound, "x".into()),
                ErrorKind::NotFound,
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(AppError::from(err).kind(), kind);
        }
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(matches!(
            RepoError::from(sqlx::Error::RowNotFound),
            RepoError::NotFound(_)
        ));
    }
}

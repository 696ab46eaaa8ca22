//! Role Repository

use super::{RepoError, RepoResult, missing_ids, protected};
use shared::models::{BOOTSTRAP_ID, Page, Permission, Role, Status};
use shared::util::now_millis;
use sqlx::SqliteConnection;

const COLUMNS: &str = "id, name, description, status, created_at, updated_at";

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> RepoResult<Option<Role>> {
    let role = sqlx::query_as::<_, Role>(&format!("SELECT {COLUMNS} FROM role WHERE id = ?"))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(role)
}

pub async fn find_by_name(conn: &mut SqliteConnection, name: &str) -> RepoResult<Option<Role>> {
    let role = sqlx::query_as::<_, Role>(&format!(
        "SELECT {COLUMNS} FROM role WHERE name = ? LIMIT 1"
    ))
    .bind(name)
    .fetch_optional(conn)
    .await?;
    Ok(role)
}

pub async fn list(conn: &mut SqliteConnection, page: Page) -> RepoResult<(Vec<Role>, i64)> {
    let page = page.clamped();
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM role")
        .fetch_one(&mut *conn)
        .await?;
    let items = sqlx::query_as::<_, Role>(&format!(
        "SELECT {COLUMNS} FROM role ORDER BY id LIMIT ? OFFSET ?"
    ))
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(conn)
    .await?;
    Ok((items, total))
}

pub async fn create(
    conn: &mut SqliteConnection,
    name: &str,
    description: Option<&str>,
) -> RepoResult<i64> {
    let now = now_millis();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO role (name, description, status, created_at, updated_at) VALUES (?, ?, 'enabled', ?, ?) RETURNING id",
    )
    .bind(name)
    .bind(description)
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn update(
    conn: &mut SqliteConnection,
    id: i64,
    name: Option<&str>,
    description: Option<&str>,
    status: Option<Status>,
) -> RepoResult<()> {
    if id == BOOTSTRAP_ID && status == Some(Status::Disabled) {
        return Err(protected("role 1"));
    }

    let rows = sqlx::query(
        "UPDATE role SET name = COALESCE(?, name), description = COALESCE(?, description), status = COALESCE(?, status), updated_at = ? WHERE id = ?",
    )
    .bind(name)
    .bind(description)
    .bind(status)
    .bind(now_millis())
    .bind(id)
    .execute(conn)
    .await?;

    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Role {id} not found")));
    }
    Ok(())
}

/// Delete both join sides, then the role
pub async fn delete(conn: &mut SqliteConnection, id: i64) -> RepoResult<()> {
    if id == BOOTSTRAP_ID {
        return Err(protected("role 1"));
    }

    sqlx::query("DELETE FROM principal_role WHERE role_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM role_permission WHERE role_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let rows = sqlx::query("DELETE FROM role WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Role {id} not found")));
    }
    Ok(())
}

pub async fn missing(conn: &mut SqliteConnection, ids: &[i64]) -> RepoResult<Vec<i64>> {
    missing_ids(conn, "role", ids).await
}

// ── Permission grants ───────────────────────────────────────────────

/// Granted permissions, disabled ones included
pub async fn permissions_of(
    conn: &mut SqliteConnection,
    role_id: i64,
) -> RepoResult<Vec<Permission>> {
    let permissions = sqlx::query_as::<_, Permission>(
        "SELECT p.id, p.name, p.resource, p.action, p.description, p.status, p.created_at, p.updated_at \
         FROM permission p JOIN role_permission rp ON rp.permission_id = p.id \
         WHERE rp.role_id = ? ORDER BY p.resource, p.action",
    )
    .bind(role_id)
    .fetch_all(conn)
    .await?;
    Ok(permissions)
}

/// Idempotent; returns whether a join row was inserted
pub async fn assign_permission(
    conn: &mut SqliteConnection,
    role_id: i64,
    permission_id: i64,
) -> RepoResult<bool> {
    let rows = sqlx::query(
        "INSERT OR IGNORE INTO role_permission (role_id, permission_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(role_id)
    .bind(permission_id)
    .bind(now_millis())
    .execute(conn)
    .await?;
    Ok(rows.rows_affected() > 0)
}

/// Idempotent. The bootstrap role keeps the bootstrap permission.
pub async fn remove_permission(
    conn: &mut SqliteConnection,
    role_id: i64,
    permission_id: i64,
) -> RepoResult<bool> {
    if role_id == BOOTSTRAP_ID && permission_id == BOOTSTRAP_ID {
        return Err(protected("grant of permission 1 to role 1"));
    }
    let rows = sqlx::query("DELETE FROM role_permission WHERE role_id = ? AND permission_id = ?")
        .bind(role_id)
        .bind(permission_id)
        .execute(conn)
        .await?;
    Ok(rows.rows_affected() > 0)
}

/// Replace the permission set
pub async fn set_permissions(
    conn: &mut SqliteConnection,
    role_id: i64,
    permission_ids: &[i64],
) -> RepoResult<()> {
    if role_id == BOOTSTRAP_ID && !permission_ids.contains(&BOOTSTRAP_ID) {
        return Err(protected("grant of permission 1 to role 1"));
    }
    sqlx::query("DELETE FROM role_permission WHERE role_id = ?")
        .bind(role_id)
        .execute(&mut *conn)
        .await?;
    for permission_id in permission_ids {
        assign_permission(&mut *conn, role_id, *permission_id).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;
    use crate::db::repository::principal::{self, NewPrincipal};

    #[tokio::test]
    async fn test_create_and_grant() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();

        let id = create(&mut conn, "viewer", Some("read only")).await.unwrap();
        assert!(assign_permission(&mut conn, id, 2).await.unwrap());
        assert!(!assign_permission(&mut conn, id, 2).await.unwrap());

        let perms = permissions_of(&mut conn, id).await.unwrap();
        assert_eq!(perms.len(), 1);
        assert_eq!(perms[0].key(), "users:read");

        let role = find_by_name(&mut conn, "viewer").await.unwrap().unwrap();
        assert_eq!(role.id, id);
        assert!(matches!(
            create(&mut conn, "viewer", None).await.unwrap_err(),
            RepoError::Duplicate(_)
        ));
    }

    #[tokio::test]
    async fn test_delete_cascades_joins() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();

        let role_id = create(&mut conn, "viewer", None).await.unwrap();
        assign_permission(&mut conn, role_id, 2).await.unwrap();
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
        principal::assign_role(&mut conn, bob, role_id).await.unwrap();
        let held = principal::roles_of(&mut conn, bob).await.unwrap();
        assert_eq!(held.iter().map(|r| r.id).collect::<Vec<_>>(), vec![role_id]);

        delete(&mut conn, role_id).await.unwrap();
        assert!(find_by_id(&mut conn, role_id).await.unwrap().is_none());

        let dangling: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM principal_role WHERE role_id = ?1) + (SELECT COUNT(*) FROM role_permission WHERE role_id = ?1)",
        )
        .bind(role_id)
        .fetch_one(&mut *conn)
        .await
        .unwrap();
        assert_eq!(dangling, 0);
    }

    #[tokio::test]
    async fn test_bootstrap_role_protected() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();

        assert!(matches!(
            delete(&mut conn, BOOTSTRAP_ID).await.unwrap_err(),
            RepoError::Protected(_)
        ));
        assert!(matches!(
            update(&mut conn, BOOTSTRAP_ID, None, None, Some(Status::Disabled))
                .await
                .unwrap_err(),
            RepoError::Protected(_)
        ));
        assert!(matches!(
            remove_permission(&mut conn, BOOTSTRAP_ID, BOOTSTRAP_ID)
                .await
                .unwrap_err(),
            RepoError::Protected(_)
        ));
        assert!(matches!(
            set_permissions(&mut conn, BOOTSTRAP_ID, &[2]).await.unwrap_err(),
            RepoError::Protected(_)
        ));
        update(&mut conn, BOOTSTRAP_ID, None, Some("admins"), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_ids() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        assert_eq!(missing(&mut conn, &[1, 42, 42, 43]).await.unwrap(), vec![42, 43]);
    }
}

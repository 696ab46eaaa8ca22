//! Permission Repository
//!
//! Permission id=1 is the system-reserved grant and cannot be changed at all.

use super::{RepoError, RepoResult, missing_ids, protected};
use shared::models::{BOOTSTRAP_ID, Page, Permission, PermissionCreate, PermissionUpdate};
use shared::util::now_millis;
use sqlx::SqliteConnection;

const COLUMNS: &str = "id, name, resource, action, description, status, created_at, updated_at";

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> RepoResult<Option<Permission>> {
    let permission =
        sqlx::query_as::<_, Permission>(&format!("SELECT {COLUMNS} FROM permission WHERE id = ?"))
            .bind(id)
            .fetch_optional(conn)
            .await?;
    Ok(permission)
}

pub async fn find_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> RepoResult<Option<Permission>> {
    let permission = sqlx::query_as::<_, Permission>(&format!(
        "SELECT {COLUMNS} FROM permission WHERE name = ? LIMIT 1"
    ))
    .bind(name)
    .fetch_optional(conn)
    .await?;
    Ok(permission)
}

pub async fn find_by_key(
    conn: &mut SqliteConnection,
    resource: &str,
    action: &str,
) -> RepoResult<Option<Permission>> {
    let permission = sqlx::query_as::<_, Permission>(&format!(
        "SELECT {COLUMNS} FROM permission WHERE resource = ? AND action = ? LIMIT 1"
    ))
    .bind(resource)
    .bind(action)
    .fetch_optional(conn)
    .await?;
    Ok(permission)
}

pub async fn list(conn: &mut SqliteConnection, page: Page) -> RepoResult<(Vec<Permission>, i64)> {
    let page = page.clamped();
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM permission")
        .fetch_one(&mut *conn)
        .await?;
    let items = sqlx::query_as::<_, Permission>(&format!(
        "SELECT {COLUMNS} FROM permission ORDER BY id LIMIT ? OFFSET ?"
    ))
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(conn)
    .await?;
    Ok((items, total))
}

pub async fn create(conn: &mut SqliteConnection, data: &PermissionCreate) -> RepoResult<i64> {
    let now = now_millis();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO permission (name, resource, action, description, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 'enabled', ?, ?) RETURNING id",
    )
    .bind(&data.name)
    .bind(&data.resource)
    .bind(&data.action)
    .bind(&data.description)
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn update(
    conn: &mut SqliteConnection,
    id: i64,
    data: &PermissionUpdate,
) -> RepoResult<()> {
    if id == BOOTSTRAP_ID {
        return Err(protected("permission 1"));
    }

    let rows = sqlx::query(
        "UPDATE permission SET \
            name = COALESCE(?, name), \
            resource = COALESCE(?, resource), \
            action = COALESCE(?, action), \
            description = COALESCE(?, description), \
            status = COALESCE(?, status), \
            updated_at = ? \
         WHERE id = ?",
    )
    .bind(&data.name)
    .bind(&data.resource)
    .bind(&data.action)
    .bind(&data.description)
    .bind(data.status)
    .bind(now_millis())
    .bind(id)
    .execute(conn)
    .await?;

    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Permission {id} not found")));
    }
    Ok(())
}

/// Delete role grants, then the permission
pub async fn delete(conn: &mut SqliteConnection, id: i64) -> RepoResult<()> {
    if id == BOOTSTRAP_ID {
        return Err(protected("permission 1"));
    }

    sqlx::query("DELETE FROM role_permission WHERE permission_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let rows = sqlx::query("DELETE FROM permission WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Permission {id} not found")));
    }
    Ok(())
}

pub async fn missing(conn: &mut SqliteConnection, ids: &[i64]) -> RepoResult<Vec<i64>> {
    missing_ids(conn, "permission", ids).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;
    use crate::db::repository::role;
    use shared::models::Status;

    fn scans_run() -> PermissionCreate {
        PermissionCreate {
            name: "scans:run".into(),
            resource: "scans".into(),
            action: "run".into(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_seeded_permissions() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let admin = find_by_id(&mut conn, BOOTSTRAP_ID).await.unwrap().unwrap();
        assert_eq!(admin.key(), "system:admin");
        assert!(find_by_key(&mut conn, "sessions", "write").await.unwrap().is_some());
        let (_, total) = list(&mut conn, Page::default()).await.unwrap();
        assert_eq!(total, 9);
    }

    #[tokio::test]
    async fn test_duplicate_resource_action() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        create(&mut conn, &scans_run()).await.unwrap();
        let again = PermissionCreate {
            name: "scans:run2".into(),
            ..scans_run()
        };
        assert!(matches!(
            create(&mut conn, &again).await.unwrap_err(),
            RepoError::Duplicate(_)
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete_cascade() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let id = create(&mut conn, &scans_run()).await.unwrap();
        role::assign_permission(&mut conn, BOOTSTRAP_ID, id).await.unwrap();

        let patch = PermissionUpdate {
            status: Some(Status::Disabled),
            ..Default::default()
        };
        update(&mut conn, id, &patch).await.unwrap();
        let p = find_by_id(&mut conn, id).await.unwrap().unwrap();
        assert_eq!(p.status, Status::Disabled);

        delete(&mut conn, id).await.unwrap();
        let grants: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM role_permission WHERE permission_id = ?")
                .bind(id)
                .fetch_one(&mut *conn)
                .await
                .unwrap();
        assert_eq!(grants, 0);
        assert!(matches!(
            delete(&mut conn, id).await.unwrap_err(),
            RepoError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_permission_immutable() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let patch = PermissionUpdate {
            description: Some("x".into()),
            ..Default::default()
        };
        assert!(matches!(
            update(&mut conn, BOOTSTRAP_ID, &patch).await.unwrap_err(),
            RepoError::Protected(_)
        ));
        assert!(matches!(
            delete(&mut conn, BOOTSTRAP_ID).await.unwrap_err(),
            RepoError::Protected(_)
        ));
    }
}

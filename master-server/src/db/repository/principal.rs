//! Principal Repository

use super::{RepoError, RepoResult, protected};
use shared::models::{BOOTSTRAP_ID, Page, Permission, Principal, Role, Status};
use shared::util::now_millis;
use sqlx::SqliteConnection;

const COLUMNS: &str = "id, username, email, password_hash, password_version, status, nickname, avatar, phone, remark, last_login_at, last_login_ip, created_at, updated_at, deleted_at";

/// Row to insert; the password is already hashed
#[derive(Debug, Clone, Default)]
pub struct NewPrincipal {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub remark: Option<String>,
    pub last_login_ip: Option<String>,
}

/// Column patch; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct PrincipalFields {
    pub username: Option<String>,
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub remark: Option<String>,
    pub status: Option<Status>,
}

/// Live (not soft-deleted) principal by id
pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> RepoResult<Option<Principal>> {
    let principal = sqlx::query_as::<_, Principal>(&format!(
        "SELECT {COLUMNS} FROM principal WHERE id = ? AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(principal)
}

/// Any principal by id, soft-deleted included
pub async fn find_any_by_id(
    conn: &mut SqliteConnection,
    id: i64,
) -> RepoResult<Option<Principal>> {
    let principal =
        sqlx::query_as::<_, Principal>(&format!("SELECT {COLUMNS} FROM principal WHERE id = ?"))
            .bind(id)
            .fetch_optional(conn)
            .await?;
    Ok(principal)
}

pub async fn find_by_username(
    conn: &mut SqliteConnection,
    username: &str,
) -> RepoResult<Option<Principal>> {
    let principal = sqlx::query_as::<_, Principal>(&format!(
        "SELECT {COLUMNS} FROM principal WHERE username = ? AND deleted_at IS NULL LIMIT 1"
    ))
    .bind(username)
    .fetch_optional(conn)
    .await?;
    Ok(principal)
}

/// `email` must already be normalized
pub async fn find_by_email(
    conn: &mut SqliteConnection,
    email: &str,
) -> RepoResult<Option<Principal>> {
    let principal = sqlx::query_as::<_, Principal>(&format!(
        "SELECT {COLUMNS} FROM principal WHERE email = ? AND deleted_at IS NULL LIMIT 1"
    ))
    .bind(email)
    .fetch_optional(conn)
    .await?;
    Ok(principal)
}

/// Whether a live principal other than `exclude` holds the username
pub async fn username_taken(
    conn: &mut SqliteConnection,
    username: &str,
    exclude: Option<i64>,
) -> RepoResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM principal WHERE username = ? AND deleted_at IS NULL AND id != ?",
    )
    .bind(username)
    .bind(exclude.unwrap_or(0))
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

/// Whether a live principal other than `exclude` holds the email
pub async fn email_taken(
    conn: &mut SqliteConnection,
    email: &str,
    exclude: Option<i64>,
) -> RepoResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM principal WHERE email = ? AND deleted_at IS NULL AND id != ?",
    )
    .bind(email)
    .bind(exclude.unwrap_or(0))
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

pub async fn exists_by_username_or_email(
    conn: &mut SqliteConnection,
    username: &str,
    email: &str,
) -> RepoResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM principal WHERE (username = ? OR email = ?) AND deleted_at IS NULL",
    )
    .bind(username)
    .bind(email)
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

/// Live principals ordered by id, plus the live total
pub async fn list(conn: &mut SqliteConnection, page: Page) -> RepoResult<(Vec<Principal>, i64)> {
    let page = page.clamped();
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM principal WHERE deleted_at IS NULL")
        .fetch_one(&mut *conn)
        .await?;
    let items = sqlx::query_as::<_, Principal>(&format!(
        "SELECT {COLUMNS} FROM principal WHERE deleted_at IS NULL ORDER BY id LIMIT ? OFFSET ?"
    ))
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(conn)
    .await?;
    Ok((items, total))
}

/// Insert with `password_version = 1`, `status = enabled`; returns the new id
pub async fn create(conn: &mut SqliteConnection, data: &NewPrincipal) -> RepoResult<i64> {
    let now = now_millis();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO principal (username, email, password_hash, password_version, status, nickname, avatar, phone, remark, last_login_ip, created_at, updated_at) \
         VALUES (?, ?, ?, 1, 'enabled', ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&data.username)
    .bind(&data.email)
    .bind(&data.password_hash)
    .bind(&data.nickname)
    .bind(&data.avatar)
    .bind(&data.phone)
    .bind(&data.remark)
    .bind(&data.last_login_ip)
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

/// Apply a column patch. Disabling the bootstrap principal is refused.
pub async fn update_fields(
    conn: &mut SqliteConnection,
    id: i64,
    fields: &PrincipalFields,
) -> RepoResult<()> {
    if id == BOOTSTRAP_ID && fields.status == Some(Status::Disabled) {
        return Err(protected("principal 1"));
    }

    let rows = sqlx::query(
        "UPDATE principal SET \
            username = COALESCE(?, username), \
            email = COALESCE(?, email), \
            nickname = COALESCE(?, nickname), \
            avatar = COALESCE(?, avatar), \
            phone = COALESCE(?, phone), \
            remark = COALESCE(?, remark), \
            status = COALESCE(?, status), \
            updated_at = ? \
         WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(&fields.username)
    .bind(&fields.email)
    .bind(&fields.nickname)
    .bind(&fields.avatar)
    .bind(&fields.phone)
    .bind(&fields.remark)
    .bind(fields.status)
    .bind(now_millis())
    .bind(id)
    .execute(conn)
    .await?;

    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Principal {id} not found")));
    }
    Ok(())
}

/// Delete role joins, then soft-delete the principal
pub async fn soft_delete(conn: &mut SqliteConnection, id: i64) -> RepoResult<()> {
    if id == BOOTSTRAP_ID {
        return Err(protected("principal 1"));
    }

    sqlx::query("DELETE FROM principal_role WHERE principal_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let now = now_millis();
    let rows = sqlx::query(
        "UPDATE principal SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(conn)
    .await?;

    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Principal {id} not found")));
    }
    Ok(())
}

/// Set the hash and increment `password_version` in one statement.
///
/// With `expected = Some(v)` the write only happens while the stored version
/// is still `v`. Returns the new version, or `None` when no row matched.
pub async fn update_password_with_version(
    conn: &mut SqliteConnection,
    id: i64,
    password_hash: &str,
    expected: Option<i64>,
) -> RepoResult<Option<i64>> {
    let version: Option<i64> = sqlx::query_scalar(
        "UPDATE principal SET password_hash = ?, password_version = password_version + 1, updated_at = ? \
         WHERE id = ? AND deleted_at IS NULL AND (? IS NULL OR password_version = ?) \
         RETURNING password_version",
    )
    .bind(password_hash)
    .bind(now_millis())
    .bind(id)
    .bind(expected)
    .bind(expected)
    .fetch_optional(conn)
    .await?;
    Ok(version)
}

/// Increment `password_version` without touching the hash (logout-all)
pub async fn increment_password_version(conn: &mut SqliteConnection, id: i64) -> RepoResult<i64> {
    let version: Option<i64> = sqlx::query_scalar(
        "UPDATE principal SET password_version = password_version + 1, updated_at = ? \
         WHERE id = ? AND deleted_at IS NULL RETURNING password_version",
    )
    .bind(now_millis())
    .bind(id)
    .fetch_optional(conn)
    .await?;
    version.ok_or_else(|| RepoError::NotFound(format!("Principal {id} not found")))
}

pub async fn get_password_version(
    conn: &mut SqliteConnection,
    id: i64,
) -> RepoResult<Option<i64>> {
    let version = sqlx::query_scalar(
        "SELECT password_version FROM principal WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(version)
}

pub async fn update_last_login(
    conn: &mut SqliteConnection,
    id: i64,
    at: i64,
    ip: Option<&str>,
) -> RepoResult<()> {
    sqlx::query(
        "UPDATE principal SET last_login_at = ?, last_login_ip = COALESCE(?, last_login_ip) WHERE id = ?",
    )
    .bind(at)
    .bind(ip)
    .bind(id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Replace the placeholder hash of an unusable account. `false` if a real hash is already set.
pub async fn set_initial_password(
    conn: &mut SqliteConnection,
    id: i64,
    password_hash: &str,
) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE principal SET password_hash = ?, updated_at = ? WHERE id = ? AND password_hash = '!'",
    )
    .bind(password_hash)
    .bind(now_millis())
    .bind(id)
    .execute(conn)
    .await?;
    Ok(rows.rows_affected() > 0)
}

// ── Role assignment ─────────────────────────────────────────────────

/// Assigned roles, disabled ones included
pub async fn roles_of(conn: &mut SqliteConnection, principal_id: i64) -> RepoResult<Vec<Role>> {
    let roles = sqlx::query_as::<_, Role>(
        "SELECT r.id, r.name, r.description, r.status, r.created_at, r.updated_at \
         FROM role r JOIN principal_role pr ON pr.role_id = r.id \
         WHERE pr.principal_id = ? ORDER BY r.name",
    )
    .bind(principal_id)
    .fetch_all(conn)
    .await?;
    Ok(roles)
}

/// Enabled permissions reachable through enabled roles, duplicates collapsed
pub async fn effective_permissions(
    conn: &mut SqliteConnection,
    principal_id: i64,
) -> RepoResult<Vec<Permission>> {
    let permissions = sqlx::query_as::<_, Permission>(
        "SELECT DISTINCT p.id, p.name, p.resource, p.action, p.description, p.status, p.created_at, p.updated_at \
         FROM permission p \
         JOIN role_permission rp ON rp.permission_id = p.id \
         JOIN role r ON r.id = rp.role_id \
         JOIN principal_role pr ON pr.role_id = r.id \
         WHERE pr.principal_id = ? AND r.status = 'enabled' AND p.status = 'enabled' \
         ORDER BY p.resource, p.action",
    )
    .bind(principal_id)
    .fetch_all(conn)
    .await?;
    Ok(permissions)
}

/// Idempotent; returns whether a join row was inserted
pub async fn assign_role(
    conn: &mut SqliteConnection,
    principal_id: i64,
    role_id: i64,
) -> RepoResult<bool> {
    let rows = sqlx::query(
        "INSERT OR IGNORE INTO principal_role (principal_id, role_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(principal_id)
    .bind(role_id)
    .bind(now_millis())
    .execute(conn)
    .await?;
    Ok(rows.rows_affected() > 0)
}

/// Idempotent; returns whether a join row was removed.
/// The bootstrap principal keeps the bootstrap role.
pub async fn remove_role(
    conn: &mut SqliteConnection,
    principal_id: i64,
    role_id: i64,
) -> RepoResult<bool> {
    if principal_id == BOOTSTRAP_ID && role_id == BOOTSTRAP_ID {
        return Err(protected("role 1 of principal 1"));
    }
    let rows = sqlx::query("DELETE FROM principal_role WHERE principal_id = ? AND role_id = ?")
        .bind(principal_id)
        .bind(role_id)
        .execute(conn)
        .await?;
    Ok(rows.rows_affected() > 0)
}

/// Replace the role set
pub async fn set_roles(
    conn: &mut SqliteConnection,
    principal_id: i64,
    role_ids: &[i64],
) -> RepoResult<()> {
    if principal_id == BOOTSTRAP_ID && !role_ids.contains(&BOOTSTRAP_ID) {
        return Err(protected("role 1 of principal 1"));
    }
    sqlx::query("DELETE FROM principal_role WHERE principal_id = ?")
        .bind(principal_id)
        .execute(&mut *conn)
        .await?;
    for role_id in role_ids {
        assign_role(&mut *conn, principal_id, *role_id).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;

    fn alice() -> NewPrincipal {
        NewPrincipal {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: "$argon2id$placeholder".into(),
            last_login_ip: Some("10.0.0.7".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();

        let id = create(&mut conn, &alice()).await.unwrap();
        let p = find_by_id(&mut conn, id).await.unwrap().unwrap();
        assert_eq!(p.username, "alice");
        assert_eq!(p.password_version, 1);
        assert_eq!(p.status, Status::Enabled);
        assert_eq!(p.last_login_ip.as_deref(), Some("10.0.0.7"));

        assert!(find_by_username(&mut conn, "alice").await.unwrap().is_some());
        assert!(find_by_email(&mut conn, "alice@example.com").await.unwrap().is_some());
        assert!(exists_by_username_or_email(&mut conn, "nobody", "alice@example.com")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unique_index_maps_to_duplicate() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        create(&mut conn, &alice()).await.unwrap();
        let err = create(&mut conn, &alice()).await.unwrap_err();
        assert!(matches!(err, RepoError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_password_version_cas() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let id = create(&mut conn, &alice()).await.unwrap();

        let v = update_password_with_version(&mut conn, id, "h2", Some(1)).await.unwrap();
        assert_eq!(v, Some(2));
        let stale = update_password_with_version(&mut conn, id, "h3", Some(1)).await.unwrap();
        assert_eq!(stale, None);
        let any = update_password_with_version(&mut conn, id, "h3", None).await.unwrap();
        assert_eq!(any, Some(3));

        assert_eq!(increment_password_version(&mut conn, id).await.unwrap(), 4);
        assert_eq!(get_password_version(&mut conn, id).await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_bootstrap_principal_protected() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();

        let err = soft_delete(&mut conn, BOOTSTRAP_ID).await.unwrap_err();
        assert!(matches!(err, RepoError::Protected(_)));

        let disable = PrincipalFields {
            status: Some(Status::Disabled),
            ..Default::default()
        };
        let err = update_fields(&mut conn, BOOTSTRAP_ID, &disable).await.unwrap_err();
        assert!(matches!(err, RepoError::Protected(_)));

        let err = remove_role(&mut conn, BOOTSTRAP_ID, BOOTSTRAP_ID).await.unwrap_err();
        assert!(matches!(err, RepoError::Protected(_)));
        let err = set_roles(&mut conn, BOOTSTRAP_ID, &[]).await.unwrap_err();
        assert!(matches!(err, RepoError::Protected(_)));
    }

    #[tokio::test]
    async fn test_soft_delete_removes_joins_and_frees_name() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let id = create(&mut conn, &alice()).await.unwrap();
        assign_role(&mut conn, id, 1).await.unwrap();

        soft_delete(&mut conn, id).await.unwrap();
        assert!(find_by_id(&mut conn, id).await.unwrap().is_none());
        assert!(find_any_by_id(&mut conn, id).await.unwrap().unwrap().is_deleted());

        let joins: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM principal_role WHERE principal_id = ?")
                .bind(id)
                .fetch_one(&mut *conn)
                .await
                .unwrap();
        assert_eq!(joins, 0);

        assert!(matches!(
            soft_delete(&mut conn, id).await.unwrap_err(),
            RepoError::NotFound(_)
        ));
        create(&mut conn, &alice()).await.unwrap();
    }

    #[tokio::test]
    async fn test_effective_permissions_skip_disabled_role() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let id = create(&mut conn, &alice()).await.unwrap();
        assign_role(&mut conn, id, 1).await.unwrap();
        assert!(!assign_role(&mut conn, id, 1).await.unwrap());

        let perms = effective_permissions(&mut conn, id).await.unwrap();
        assert!(perms.iter().any(|p| p.key() == "users:read"));

        sqlx::query("UPDATE role SET status = 'disabled' WHERE id = 1")
            .execute(&mut *conn)
            .await
            .unwrap();
        assert!(effective_permissions(&mut conn, id).await.unwrap().is_empty());
        assert_eq!(roles_of(&mut conn, id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_paginates_live_rows() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        for i in 0..3 {
            let data = NewPrincipal {
                username: format!("user{i}"),
                email: format!("user{i}@example.com"),
                password_hash: "h".into(),
                ..Default::default()
            };
            create(&mut conn, &data).await.unwrap();
        }
        let (items, total) = list(&mut conn, Page::new(1, 2)).await.unwrap();
        assert_eq!(total, 4);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].username, "user0");
    }
}

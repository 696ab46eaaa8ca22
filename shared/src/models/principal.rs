//! Principal Model

use super::Status;
use serde::{Deserialize, Serialize};

/// Principal entity (authenticatable identity)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Never leaves the server
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub password_version: i64,
    pub status: Status,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub remark: Option<String>,
    pub last_login_at: Option<i64>,
    pub last_login_ip: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

impl Principal {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Public view with the given role names attached
    pub fn to_view(&self, roles: Vec<String>) -> PrincipalView {
        PrincipalView {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            status: self.status,
            nickname: self.nickname.clone(),
            avatar: self.avatar.clone(),
            phone: self.phone.clone(),
            remark: self.remark.clone(),
            roles,
            last_login_at: self.last_login_at,
            last_login_ip: self.last_login_ip.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Principal response (without password material)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrincipalView {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub status: Status,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub remark: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub last_login_at: Option<i64>,
    pub last_login_ip: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Self-registration payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub nickname: Option<String>,
}

/// Admin create payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrincipalCreate {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub role_ids: Vec<i64>,
}

/// Admin update payload. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrincipalUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub remark: Option<String>,
    pub status: Option<Status>,
    /// Replaces the whole role set when present
    pub role_ids: Option<Vec<i64>>,
}

impl PrincipalUpdate {
    pub fn status_only(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Self-service profile update; roles and status are not settable here
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub remark: Option<String>,
}

impl From<ProfileUpdate> for PrincipalUpdate {
    fn from(p: ProfileUpdate) -> Self {
        Self {
            username: p.username,
            email: p.email,
            nickname: p.nickname,
            avatar: p.avatar,
            phone: p.phone,
            remark: p.remark,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Admin reset; the configured default is used when `new_password` is absent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub new_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRolesRequest {
    pub role_ids: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Principal {
        Principal {
            id: 7,
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            password_version: 3,
            status: Status::Enabled,
            nickname: None,
            avatar: None,
            phone: None,
            remark: None,
            last_login_at: None,
            last_login_ip: Some("10.0.0.7".into()),
            created_at: 1,
            updated_at: 2,
            deleted_at: None,
        }
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("password_hash"));
    }

    #[test]
    fn test_view_carries_roles() {
        let view = sample().to_view(vec!["viewer".into()]);
        assert_eq!(view.id, 7);
        assert_eq!(view.roles, vec!["viewer".to_string()]);
        assert_eq!(view.last_login_ip.as_deref(), Some("10.0.0.7"));
    }

    #[test]
    fn test_profile_update_rejects_role_change() {
        let res = serde_json::from_str::<ProfileUpdate>(r#"{"role_ids":[1]}"#);
        assert!(res.is_err());
        let res = serde_json::from_str::<ProfileUpdate>(r#"{"status":"disabled"}"#);
        assert!(res.is_err());
    }
}

//! Permission Model

use super::Status;
use serde::{Deserialize, Serialize};

/// Permission entity; `(resource, action)` is the authorization key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Permission {
    pub id: i64,
    pub name: String,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
    pub status: Status,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Permission {
    /// Denormalized `resource:action` form carried in sessions and tokens
    pub fn key(&self) -> String {
        permission_key(&self.resource, &self.action)
    }
}

pub fn permission_key(resource: &str, action: &str) -> String {
    format!("{resource}:{action}")
}

/// Create permission payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionCreate {
    pub name: String,
    pub resource: String,
    pub action: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Update permission payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionUpdate {
    pub name: Option<String>,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_key() {
        assert_eq!(permission_key("users", "read"), "users:read");
    }
}

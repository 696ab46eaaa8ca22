//! Data models
//!
//! Shared between master-server and API clients.
//! DB row types use `#[cfg_attr(feature = "db", derive(sqlx::FromRow))]`.
//! All IDs are `i64` (SQLite INTEGER PRIMARY KEY), timestamps are Unix millis.

pub mod page;
pub mod permission;
pub mod principal;
pub mod role;
pub mod session;

// Re-exports
pub use page::*;
pub use permission::*;
pub use principal::*;
pub use role::*;
pub use session::*;

use serde::{Deserialize, Serialize};

/// Id of the bootstrap administrator principal, role and permission
pub const BOOTSTRAP_ID: i64 = 1;

/// Lifecycle status shared by principals, roles and permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(type_name = "TEXT", rename_all = "lowercase"))]
pub enum Status {
    #[default]
    Enabled,
    Disabled,
}

impl Status {
    pub fn is_enabled(self) -> bool {
        self == Self::Enabled
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&Status::Disabled).unwrap(), "\"disabled\"");
        let s: Status = serde_json::from_str("\"enabled\"").unwrap();
        assert!(s.is_enabled());
        assert!(serde_json::from_str::<Status>("\"locked\"").is_err());
    }
}

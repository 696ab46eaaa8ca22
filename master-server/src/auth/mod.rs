//! 认证授权模块
//!
//! - [`PasswordHasher`] - Argon2id 密码哈希
//! - [`JwtService`] - access/refresh 令牌服务
//! - [`CurrentUser`] - 已验证会话的主体上下文
//! - [`require_auth`] / [`require_permission`] - 中间件

pub mod extractor;
pub mod jwt;
pub mod middleware;
pub mod password;

pub use jwt::{Claims, IssuedPair, JwtConfig, JwtError, JwtService, TokenSubject, TokenType};
pub use middleware::{CurrentUserExt, require_auth, require_permission};
pub use password::{PasswordError, PasswordHasher};

use serde::{Deserialize, Serialize};
use shared::models::permission_key;

/// 当前用户上下文
///
/// Produced by `SessionService::validate_session` and injected into request
/// extensions by [`require_auth`]. Roles and permissions are the snapshot
/// stored in the session; authorization decisions go through the
/// Authorization Service instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    /// Access credential id
    pub jti: String,
    pub password_version: i64,
    /// Access credential expiry (Unix seconds)
    pub token_exp: i64,
}

impl CurrentUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Exact `(resource, action)` match against the session snapshot
    pub fn has_permission(&self, resource: &str, action: &str) -> bool {
        let key = permission_key(resource, action);
        self.permissions.iter().any(|p| *p == key)
    }
}

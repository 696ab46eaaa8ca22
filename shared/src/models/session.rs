//! Session and credential DTOs

use super::PrincipalView;
use serde::{Deserialize, Serialize};

/// Ephemeral per-principal session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub principal_id: i64,
    pub username: String,
    pub email: String,
    /// Role names at issuance
    pub roles: Vec<String>,
    /// `resource:action` keys at issuance
    pub permissions: Vec<String>,
    pub login_at: i64,
    pub last_active_at: i64,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    /// Last issued credential identifiers
    pub access_jti: String,
    pub refresh_jti: String,
    pub password_version: i64,
}

/// Login request; `username` may also be an email address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "email", alias = "username_or_email")]
    pub username: String,
    pub password: String,
}

/// Issued credential pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access credential lifetime in seconds
    pub expires_in: i64,
}

/// Login response data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub principal: PrincipalView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Remaining lifetime of the presented access credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckExpiryResponse {
    pub principal_id: i64,
    pub expires_at: i64,
    pub remaining_seconds: i64,
}

//! JWT 令牌服务
//!
//! Mints and verifies access/refresh credentials (HS256). Every credential
//! carries a `jti` so it can be revoked individually, and the principal's
//! `password_version` so it can be invalidated wholesale.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::AppError;

/// Minimum signing key length outside development
pub const MIN_SECRET_LEN: usize = 32;

/// JWT 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// JWT 密钥 (应至少 32 字节)
    pub secret: String,
    /// Access credential lifetime (minutes)
    pub access_ttl_minutes: i64,
    /// Refresh credential lifetime (days)
    pub refresh_ttl_days: i64,
    /// Clock skew tolerance on expiry (seconds)
    pub leeway_secs: u64,
    /// 令牌签发者
    pub issuer: String,
    /// 令牌受众
    pub audience: String,
}

impl JwtConfig {
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_ttl_minutes: 60,
            refresh_ttl_days: 7,
            leeway_secs: 5,
            issuer: "master".to_string(),
            audience: "master-clients".to_string(),
        }
    }

    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs((self.access_ttl_minutes.max(1) as u64) * 60)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs((self.refresh_ttl_days.max(1) as u64) * 24 * 60 * 60)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// 存储在令牌中的 JWT Claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Principal ID (Subject)
    pub sub: String,
    /// 用户名
    pub username: String,
    /// Role names (access only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    /// `resource:action` keys (access only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    /// Password version at issuance
    pub pwd_ver: i64,
    /// 令牌类型
    pub token_type: TokenType,
    /// Credential identifier
    pub jti: String,
    /// 过期时间戳
    pub exp: i64,
    /// 签发时间戳
    pub iat: i64,
    /// 签发者
    pub iss: String,
    /// 受众
    pub aud: String,
}

impl Claims {
    pub fn principal_id(&self) -> Result<i64, JwtError> {
        self.sub
            .parse()
            .map_err(|_| JwtError::InvalidToken(format!("subject is not an id: {}", self.sub)))
    }

    /// Seconds until expiry, never negative
    pub fn remaining_secs(&self) -> i64 {
        (self.exp - Utc::now().timestamp()).max(0)
    }

    pub fn remaining_lifetime(&self) -> Duration {
        Duration::from_secs(self.remaining_secs() as u64)
    }
}

/// JWT 错误
#[derive(Error, Debug)]
pub enum JwtError {
    #[error("无效令牌: {0}")]
    InvalidToken(String),

    #[error("令牌已过期")]
    ExpiredToken,

    #[error("无效签名")]
    InvalidSignature,

    #[error("令牌类型错误: expected {expected:?}")]
    WrongTokenType { expected: TokenType },

    #[error("令牌生成失败: {0}")]
    GenerationFailed(String),

    #[error("密钥生成失败: {0}")]
    KeyGenerationFailed(String),
}

impl From<JwtError> for AppError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::ExpiredToken => AppError::token_expired(),
            JwtError::GenerationFailed(_) | JwtError::KeyGenerationFailed(_) => {
                AppError::internal(err.to_string())
            }
            _ => AppError::invalid_token(err.to_string()),
        }
    }
}

/// 生成可打印的安全 JWT 密钥 (用于开发环境)
pub fn generate_secure_printable_jwt_secret() -> Result<String, JwtError> {
    const ALLOWED: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*()-_=+";

    let rng = SystemRandom::new();
    let mut bytes = [0u8; 64];
    rng.fill(&mut bytes).map_err(|_| {
        JwtError::KeyGenerationFailed("Failed to generate secure random key".to_string())
    })?;

    Ok(bytes
        .iter()
        .map(|b| ALLOWED[(*b as usize) % ALLOWED.len()] as char)
        .collect())
}

/// Identity a credential pair is minted for
#[derive(Debug, Clone)]
pub struct TokenSubject<'a> {
    pub principal_id: i64,
    pub username: &'a str,
    pub roles: &'a [String],
    pub permissions: &'a [String],
    pub password_version: i64,
}

/// Freshly minted credential pair
#[derive(Debug, Clone)]
pub struct IssuedPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_jti: String,
    pub refresh_jti: String,
    /// Access lifetime in seconds
    pub expires_in: i64,
}

/// JWT 令牌服务
#[derive(Clone)]
pub struct JwtService {
    pub config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .finish_non_exhaustive()
    }
}

impl JwtService {
    /// 使用指定配置创建新的 JWT 服务
    pub fn with_config(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    pub(crate) fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| JwtError::GenerationFailed(e.to_string()))
    }

    /// Mint an access/refresh pair. Roles and permissions ride only on the access credential.
    pub fn issue_pair(&self, subject: &TokenSubject<'_>) -> Result<IssuedPair, JwtError> {
        let now = Utc::now().timestamp();
        let access_ttl = self.config.access_ttl().as_secs() as i64;
        let refresh_ttl = self.config.refresh_ttl().as_secs() as i64;

        let access = Claims {
            sub: subject.principal_id.to_string(),
            username: subject.username.to_string(),
            roles: subject.roles.to_vec(),
            permissions: subject.permissions.to_vec(),
            pwd_ver: subject.password_version,
            token_type: TokenType::Access,
            jti: uuid::Uuid::new_v4().to_string(),
            exp: now + access_ttl,
            iat: now,
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };
        let refresh = Claims {
            roles: Vec::new(),
            permissions: Vec::new(),
            token_type: TokenType::Refresh,
            jti: uuid::Uuid::new_v4().to_string(),
            exp: now + refresh_ttl,
            ..access.clone()
        };

        Ok(IssuedPair {
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
            access_jti: access.jti,
            refresh_jti: refresh.jti,
            expires_in: access_ttl,
        })
    }

    fn validation(&self, check_expiry: bool) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[&self.config.audience]);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss", "aud"]);
        validation.leeway = self.config.leeway_secs;
        validation.validate_exp = check_expiry;
        validation
    }

    fn decode_with(&self, token: &str, validation: &Validation) -> Result<Claims, JwtError> {
        let token_data =
            decode::<Claims>(token, &self.decoding_key, validation).map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
                ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                ErrorKind::InvalidToken => JwtError::InvalidToken(e.to_string()),
                _ => JwtError::InvalidToken(format!("Token validation failed: {}", e)),
            })?;
        Ok(token_data.claims)
    }

    fn parse_typed(&self, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
        let claims = self.decode_with(token, &self.validation(true))?;
        if claims.token_type != expected {
            return Err(JwtError::WrongTokenType { expected });
        }
        claims.principal_id()?;
        Ok(claims)
    }

    /// Verify signature, registered claims, expiry and `token_type == access`
    pub fn parse_access(&self, token: &str) -> Result<Claims, JwtError> {
        self.parse_typed(token, TokenType::Access)
    }

    /// Verify signature, registered claims, expiry and `token_type == refresh`
    pub fn parse_refresh(&self, token: &str) -> Result<Claims, JwtError> {
        self.parse_typed(token, TokenType::Refresh)
    }

    /// Access credential with signature and registered claims checked, expiry ignored
    pub fn parse_access_ignoring_expiry(&self, token: &str) -> Result<Claims, JwtError> {
        let claims = self.decode_with(token, &self.validation(false))?;
        if claims.token_type != TokenType::Access {
            return Err(JwtError::WrongTokenType {
                expected: TokenType::Access,
            });
        }
        claims.principal_id()?;
        Ok(claims)
    }

    /// Remaining lifetime of a signed credential of either type; zero once expired
    pub fn remaining_lifetime(&self, token: &str) -> Result<Duration, JwtError> {
        let claims = self.decode_with(token, &self.validation(false))?;
        Ok(claims.remaining_lifetime())
    }

    /// How long a revocation marker for `claims` must outlive the credential.
    /// Covers the validation leeway, so it is never zero.
    pub fn revocation_ttl(&self, claims: &Claims) -> Duration {
        claims.remaining_lifetime() + Duration::from_secs(self.config.leeway_secs)
    }

    /// 从 Authorization 头提取令牌
    pub fn extract_from_header(header: &str) -> Option<&str> {
        header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

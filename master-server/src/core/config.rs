use std::time::Duration;

use thiserror::Error;

use crate::auth::jwt::{JwtConfig, MIN_SECRET_LEN, generate_secure_printable_jwt_secret};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in {1} environment")]
    MissingSecret(&'static str, String),

    #[error("{0} must be at least {1} characters long")]
    WeakSecret(&'static str, usize),

    #[error("failed to generate development secret: {0}")]
    SecretGeneration(String),
}

/// 服务器配置 - Master 身份核心的所有配置项
///
/// # 环境变量
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | DATABASE_PATH | master.db | Principal Store SQLite 文件 |
/// | HTTP_PORT | 8080 | HTTP 服务端口 |
/// | ENVIRONMENT | development | 运行环境 |
/// | JWT_SECRET | (development 自动生成) | 签名密钥, 非开发环境必填 (≥32) |
/// | JWT_ISSUER | master | 签发者 |
/// | JWT_AUDIENCE | master-clients | 受众 |
/// | ACCESS_TOKEN_TTL_MINUTES | 60 | Access 令牌/会话有效期 |
/// | REFRESH_TOKEN_TTL_DAYS | 7 | Refresh 令牌有效期 |
/// | JWT_LEEWAY_SECS | 5 | 时钟偏差容忍 |
/// | DEFAULT_RESET_PASSWORD | Reset@123456 | 管理员重置密码默认值 |
/// | BOOTSTRAP_ADMIN_PASSWORD | Admin@123456 | 引导管理员初始密码 |
/// | REQUEST_TIMEOUT_MS | 30000 | 请求超时(毫秒) |
/// | SESSION_SWEEP_INTERVAL_SECS | 60 | 会话存储过期清理周期 |
/// | TRUST_PROXY_HEADERS | false | 信任 X-Forwarded-For (仅部署在反向代理后时开启) |
/// | LOG_LEVEL / LOG_JSON / LOG_DIR | info / false / - | 日志 |
///
/// # 示例
///
/// ```ignore
/// JWT_SECRET=... HTTP_PORT=9000 cargo run -p master-server
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite 数据库文件路径
    pub database_path: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,
    /// JWT 认证配置
    pub jwt: JwtConfig,
    /// 管理员重置密码时的默认明文
    pub default_reset_password: String,
    /// 引导管理员 (id=1) 初始密码
    pub bootstrap_admin_password: String,
    /// 请求超时时间 (毫秒)
    pub request_timeout_ms: u64,
    /// 会话存储清理周期 (秒)
    pub session_sweep_interval_secs: u64,
    /// Take the client IP from `X-Forwarded-For` instead of the peer address
    pub trust_proxy_headers: bool,
    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<String>,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值。非开发环境必须提供 JWT_SECRET。
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env_string("ENVIRONMENT", "development");
        let secret = Self::require_secret("JWT_SECRET", &environment)?;

        Ok(Self {
            database_path: env_string("DATABASE_PATH", "master.db"),
            http_port: env_or("HTTP_PORT", 8080),
            jwt: JwtConfig {
                secret,
                access_ttl_minutes: env_or("ACCESS_TOKEN_TTL_MINUTES", 60),
                refresh_ttl_days: env_or("REFRESH_TOKEN_TTL_DAYS", 7),
                leeway_secs: env_or("JWT_LEEWAY_SECS", 5),
                issuer: env_string("JWT_ISSUER", "master"),
                audience: env_string("JWT_AUDIENCE", "master-clients"),
            },
            environment,
            default_reset_password: env_string("DEFAULT_RESET_PASSWORD", "Reset@123456"),
            bootstrap_admin_password: env_string("BOOTSTRAP_ADMIN_PASSWORD", "Admin@123456"),
            request_timeout_ms: env_or("REQUEST_TIMEOUT_MS", 30_000),
            session_sweep_interval_secs: env_or("SESSION_SWEEP_INTERVAL_SECS", 60),
            trust_proxy_headers: env_or("TRUST_PROXY_HEADERS", false),
            log_level: env_string("LOG_LEVEL", "info"),
            log_json: env_or("LOG_JSON", false),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty()),
        })
    }

    /// Development-only: a missing secret is generated, anywhere else it is fatal.
    fn require_secret(name: &'static str, environment: &str) -> Result<String, ConfigError> {
        match std::env::var(name) {
            Ok(v) if v.len() >= MIN_SECRET_LEN => Ok(v),
            Ok(_) => Err(ConfigError::WeakSecret(name, MIN_SECRET_LEN)),
            Err(_) if environment == "development" => {
                tracing::warn!("⚠️  {name} not set! Generating temporary key for development.");
                generate_secure_printable_jwt_secret()
                    .map_err(|e| ConfigError::SecretGeneration(e.to_string()))
            }
            Err(_) => Err(ConfigError::MissingSecret(name, environment.to_string())),
        }
    }

    /// Defaults with an explicit signing key, independent of the process environment.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            database_path: "master.db".into(),
            http_port: 8080,
            environment: "development".into(),
            jwt: JwtConfig::with_secret(secret),
            default_reset_password: "Reset@123456".into(),
            bootstrap_admin_password: "Admin@123456".into(),
            request_timeout_ms: 30_000,
            session_sweep_interval_secs: 60,
            trust_proxy_headers: false,
            log_level: "info".into(),
            log_json: false,
            log_dir: None,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_interval_secs.max(1))
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_secret_defaults() {
        let config = Config::with_secret("x".repeat(40));
        assert_eq!(config.jwt.access_ttl(), Duration::from_secs(3600));
        assert_eq!(config.jwt.refresh_ttl(), Duration::from_secs(7 * 86400));
        assert_eq!(config.jwt.leeway_secs, 5);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.is_development());
        assert!(!config.is_production());
        assert!(!config.trust_proxy_headers);
    }

    #[test]
    fn test_sweep_interval_never_zero() {
        let mut config = Config::with_secret("x".repeat(40));
        config.session_sweep_interval_secs = 0;
        assert_eq!(config.session_sweep_interval(), Duration::from_secs(1));
    }
}

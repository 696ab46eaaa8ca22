//! Master Server - identity, session and RBAC core of the scanning control plane
//!
//! # 架构概述
//!
//! - **认证** (`auth`): Argon2 password hashing, JWT access/refresh credentials, middleware
//! - **数据库** (`db`): SQLite-backed principal store (principals, roles, permissions, joins)
//! - **会话** (`session`): ephemeral session store (sessions, password-version cache, revocation markers)
//! - **服务** (`services`): identity, role/permission admin, authorization, session orchestration
//! - **HTTP API** (`api`): thin axum transport over the services
//!
//! # 模块结构
//!
//! ```text
//! master-server/src/
//! ├── core/          # 配置、状态、请求上下文、服务器
//! ├── auth/          # 密码、JWT、中间件
//! ├── db/            # Principal Store
//! ├── session/       # Session Store
//! ├── services/      # 业务服务
//! ├── api/           # HTTP 路由和处理器
//! └── utils/         # 日志、校验
//! ```

pub mod api;
pub mod auth;
pub mod core;
pub mod db;
pub mod services;
pub mod session;
pub mod utils;

// Re-export 公共类型
pub use auth::{CurrentUser, JwtService, PasswordHasher};
pub use core::{Config, RequestContext, Server, ServerState};
pub use utils::{AppError, AppResult};

// Re-export unified error types from shared
pub use utils::{ApiResponse, ErrorCategory, ErrorCode, ErrorKind};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

// Security logging macro - 支持 tracing 格式说明符
#[macro_export]
macro_rules! security_log {
    ($level:expr, $event:expr, $($key:ident = $value:expr),*) => {
        tracing::info!(
            target: "security",
            level = $level,
            event = $event,
            $($key = $value),*
        );
    };
}

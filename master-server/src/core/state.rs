use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::{JwtService, PasswordHasher};
use crate::core::{Config, Result};
use crate::db::DbService;
use crate::services::{AuthzService, IdentityService, RoleService, SessionService};
use crate::session::{MemorySessionStore, SessionStore};
use crate::AppResult;

/// 服务器状态 - 持有所有服务的单例引用
///
/// 使用 Arc 实现浅拷贝，所有权成本极低。
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | db | DbService | Principal Store (SQLite) |
/// | store | Arc<dyn SessionStore> | Session Store |
/// | jwt_service | Arc<JwtService> | 凭证签发与校验 |
/// | authz | Arc<AuthzService> | 授权判定 |
/// | identity | Arc<IdentityService> | 主体生命周期 |
/// | roles | Arc<RoleService> | 角色/权限管理 |
/// | sessions | Arc<SessionService> | 登录、登出、刷新、会话校验 |
/// | shutdown | CancellationToken | 后台任务停止信号 |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub db: DbService,
    pub store: Arc<dyn SessionStore>,
    pub jwt_service: Arc<JwtService>,
    pub authz: Arc<AuthzService>,
    pub identity: Arc<IdentityService>,
    pub roles: Arc<RoleService>,
    pub sessions: Arc<SessionService>,
    pub shutdown: CancellationToken,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("environment", &self.config.environment)
            .field("database_path", &self.config.database_path)
            .finish_non_exhaustive()
    }
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 按顺序初始化：
    /// 1. 数据库 (config.database_path, 含迁移)
    /// 2. 进程内 Session Store
    /// 3. 各服务, 引导管理员密码
    pub async fn initialize(config: &Config) -> Result<Self> {
        let db = DbService::new(&config.database_path).await?;
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        Ok(Self::with_components(config.clone(), db, store, PasswordHasher::default()).await?)
    }

    /// Wire services over already opened stores
    pub async fn with_components(
        config: Config,
        db: DbService,
        store: Arc<dyn SessionStore>,
        hasher: PasswordHasher,
    ) -> AppResult<Self> {
        db.bootstrap_admin(&hasher, &config.bootstrap_admin_password)
            .await?;

        let jwt_service = Arc::new(JwtService::with_config(config.jwt.clone()));
        let authz = Arc::new(AuthzService::new(db.clone(), store.clone()));
        let identity = Arc::new(IdentityService::new(
            db.clone(),
            store.clone(),
            hasher.clone(),
            authz.clone(),
            config.default_reset_password.clone(),
            config.jwt.access_ttl(),
        ));
        let roles = Arc::new(RoleService::new(db.clone(), authz.clone()));
        let sessions = Arc::new(SessionService::new(
            db.clone(),
            store.clone(),
            hasher,
            jwt_service.clone(),
            authz.clone(),
        ));

        Ok(Self {
            config,
            db,
            store,
            jwt_service,
            authz,
            identity,
            roles,
            sessions,
            shutdown: CancellationToken::new(),
        })
    }

    /// 启动后台任务
    ///
    /// - Session Store 过期清理
    pub fn start_background_tasks(&self) -> tokio::task::JoinHandle<()> {
        crate::session::spawn_sweeper(
            self.store.clone(),
            self.config.session_sweep_interval(),
            self.shutdown.child_token(),
        )
    }
}

//! Test fixtures shared by the integration suites
#![allow(dead_code)]

use std::sync::Arc;

use master_server::db::DbService;
use master_server::session::{MemorySessionStore, SessionStore};
use master_server::{Config, PasswordHasher, RequestContext, ServerState};
use shared::models::{LoginRequest, LoginResponse, PrincipalView, RegisterRequest};

pub const SECRET: &str = "integration-secret-that-is-long-enough-for-hs256";
pub const ADMIN_PASSWORD: &str = "Admin@123456";
pub const ALICE_PASSWORD: &str = "P@ssw0rd1";

/// Cheap Argon2 parameters; production defaults take too long per test
pub fn fast_hasher() -> PasswordHasher {
    PasswordHasher::with_params(1024, 1, 1).unwrap()
}

pub async fn state_with(config: Config, store: Arc<dyn SessionStore>) -> ServerState {
    let db = DbService::in_memory().await.unwrap();
    ServerState::with_components(config, db, store, fast_hasher())
        .await
        .unwrap()
}

pub async fn state_with_store(store: Arc<dyn SessionStore>) -> ServerState {
    state_with(Config::with_secret(SECRET), store).await
}

/// Deployed behind a reverse proxy: `X-Forwarded-For` is trusted
pub async fn state_behind_proxy() -> ServerState {
    let mut config = Config::with_secret(SECRET);
    config.trust_proxy_headers = true;
    state_with(config, Arc::new(MemorySessionStore::new())).await
}

pub async fn test_state() -> ServerState {
    state_with_store(Arc::new(MemorySessionStore::new())).await
}

pub fn ctx() -> RequestContext {
    RequestContext::new()
}

pub fn ctx_from(ip: &str) -> RequestContext {
    RequestContext::new().with_client(Some(ip.to_owned()), Some("integration-test".to_owned()))
}

pub async fn register(state: &ServerState, username: &str, email: &str) -> PrincipalView {
    state
        .identity
        .register(
            &ctx(),
            RegisterRequest {
                username: username.into(),
                email: email.into(),
                password: ALICE_PASSWORD.into(),
                nickname: None,
            },
        )
        .await
        .unwrap()
}

pub async fn register_alice(state: &ServerState) -> PrincipalView {
    register(state, "alice", "alice@example.com").await
}

pub async fn login(state: &ServerState, identifier: &str, password: &str) -> LoginResponse {
    state
        .sessions
        .login(
            &ctx(),
            LoginRequest {
                username: identifier.into(),
                password: password.into(),
            },
        )
        .await
        .unwrap()
}

//! 健康检查路由
//!
//! | 路径 | 方法 | 说明 | 认证 |
//! |------|------|------|------|
//! | /health | GET | 简单健康检查 | 无 |
//! | /health/detailed | GET | 组件检查 | 无 |

use std::time::Instant;

use axum::{Router, extract::State, routing::get};
use serde::Serialize;

use crate::core::ServerState;
use crate::utils::ok;
use crate::ApiResponse;

/// 健康检查路由 - 公共路由 (无需认证)
pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/detailed", get(detailed_health))
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
pub struct DetailedHealthResponse {
    status: &'static str,
    version: &'static str,
    checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    principal_store: CheckResult,
    session_store: CheckResult,
}

/// 单项检查结果
#[derive(Serialize)]
pub struct CheckResult {
    status: &'static str,
    latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl CheckResult {
    fn from_outcome<E: std::fmt::Display>(started: Instant, outcome: Result<(), E>) -> Self {
        let latency_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => Self {
                status: "ok",
                latency_ms,
                error: None,
            },
            Err(e) => Self {
                status: "error",
                latency_ms,
                error: Some(e.to_string()),
            },
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

async fn health() -> ApiResponse<HealthResponse> {
    ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn detailed_health(State(state): State<ServerState>) -> ApiResponse<DetailedHealthResponse> {
    let started = Instant::now();
    let db = sqlx::query("SELECT 1")
        .execute(&state.db.pool)
        .await
        .map(|_| ());
    let principal_store = CheckResult::from_outcome(started, db);

    let started = Instant::now();
    let epoch = state.store.rbac_epoch().await.map(|_| ());
    let session_store = CheckResult::from_outcome(started, epoch);

    let status = if principal_store.is_ok() && session_store.is_ok() {
        "ok"
    } else {
        "degraded"
    };
    ok(DetailedHealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        checks: HealthChecks {
            principal_store,
            session_store,
        },
    })
}

//! 核心模块 - 服务器配置、状态、请求上下文和错误定义
//!
//! # 模块结构
//!
//! - [`Config`] - 服务器配置
//! - [`ServerState`] - 服务器状态
//! - [`RequestContext`] - 请求上下文 (deadline + cancellation)
//! - [`Server`] - HTTP 服务器
//! - [`ServerError`] - 服务器错误

pub mod config;
pub mod context;
pub mod error;
pub mod server;
pub mod state;

pub use config::{Config, ConfigError};
pub use context::RequestContext;
pub use error::{Result, ServerError};
pub use server::Server;
pub use state::ServerState;

//! 服务器错误
//!
//! Startup and serve-loop failures. Request-level failures use [`crate::AppError`].

use thiserror::Error;

use super::config::ConfigError;
use crate::AppError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    App(#[from] AppError),
}

pub type Result<T> = std::result::Result<T, ServerError>;

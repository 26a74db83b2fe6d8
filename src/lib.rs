//! 日记应用客户端库
//! 带认证的 HTTP 客户端（单飞令牌刷新）、会话存储与日记业务服务

pub mod auth;
pub mod client;
pub mod config;
pub mod diary;
pub mod error;
pub mod models;
pub mod services;
pub mod telemetry;

pub use client::{ApiClient, ApiRequest};
pub use error::{ClientError, Result};

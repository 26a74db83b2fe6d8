//! 统一错误模型
//! 定义客户端所有错误类型

use reqwest::StatusCode;
use thiserror::Error;

use crate::auth::refresh::RefreshError;
use crate::auth::store::StorageError;

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ClientError>;

/// 客户端错误类型
#[derive(Debug, Error)]
pub enum ClientError {
    /// 后端返回非成功状态码（包括刷新后仍为 401 的情况）
    #[error("HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// 刷新令牌失败，会话已被清除
    #[error("Token refresh failed: {0}")]
    RefreshFailed(#[from] RefreshError),

    #[error("Session storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not signed in")]
    NotSignedIn,
}

impl ClientError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ClientError::Validation(msg.into())
    }

    /// 获取 HTTP 状态码（仅 Http 错误有）
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status_code() == Some(StatusCode::UNAUTHORIZED)
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(StatusCode::NOT_FOUND)
    }

    /// 是否属于认证类错误（调用方应引导用户重新登录）
    pub fn is_auth_error(&self) -> bool {
        match self {
            ClientError::RefreshFailed(_) | ClientError::NotSignedIn => true,
            _ => matches!(
                self.status_code(),
                Some(StatusCode::UNAUTHORIZED) | Some(StatusCode::FORBIDDEN)
            ),
        }
    }

    /// 获取用户友好的错误消息（不包含敏感信息）
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Http { status, .. } => match *status {
                StatusCode::UNAUTHORIZED => "Authentication failed".to_string(),
                StatusCode::FORBIDDEN => "Access denied".to_string(),
                StatusCode::NOT_FOUND => "Resource not found".to_string(),
                StatusCode::BAD_REQUEST => "The server rejected the request".to_string(),
                s if s.is_server_error() => "Server error occurred".to_string(),
                s => format!("Request failed with status {}", s.as_u16()),
            },
            ClientError::Transport(_) => "Could not reach the server".to_string(),
            ClientError::RefreshFailed(_) => "Session expired, please sign in again".to_string(),
            ClientError::NotSignedIn => "Please sign in first".to_string(),
            ClientError::Storage(_) => "Session storage error".to_string(),
            ClientError::Serialization(_) => "Unexpected response from server".to_string(),
            ClientError::Url(_) | ClientError::Config(_) => "Configuration error".to_string(),
            ClientError::Validation(msg) => msg.clone(),
        }
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for ClientError {
    fn from(e: config::ConfigError) -> Self {
        ClientError::Config(e.to_string())
    }
}

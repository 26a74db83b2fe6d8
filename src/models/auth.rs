//! Authentication-related models
//!
//! 携带令牌或密码的类型不实现 `Debug`，避免被日志输出。

use serde::{Deserialize, Serialize};

use crate::auth::store::{CredentialPair, SessionIdentity};

/// Login request
#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub user_id: &'a str,
    pub password: &'a str,
}

/// Login response
#[derive(Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub is_staff: bool,
}

impl LoginResponse {
    pub fn credentials(&self) -> CredentialPair {
        CredentialPair::new(self.access.as_str(), self.refresh.as_str())
    }

    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity {
            user_id: self.user_id.clone(),
            username: self.username.clone().unwrap_or_default(),
            is_staff: self.is_staff,
        }
    }
}

/// Register request
#[derive(Serialize)]
pub struct RegisterRequest<'a> {
    pub user_id: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub password2: &'a str,
}

/// Token refresh request
#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Token refresh response
#[derive(Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    /// 后端开启令牌轮换时返回新的刷新令牌
    #[serde(default)]
    pub refresh: Option<String>,
}

/// 登录后应进入的视图
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landing {
    Admin,
    Home,
}

impl Landing {
    pub fn for_identity(identity: &SessionIdentity) -> Self {
        if identity.is_staff {
            Landing::Admin
        } else {
            Landing::Home
        }
    }
}

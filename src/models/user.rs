//! User models

use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use crate::models::auth::RegisterRequest;

/// 管理端用户列表中的一条记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: String,
    pub is_active: bool,
}

/// 注册成功后返回的账户信息
#[derive(Debug, Clone, Deserialize)]
pub struct RegisteredUser {
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: String,
}

/// Update user request
#[derive(Debug, Serialize)]
pub struct UpdateUserRequest {
    pub is_active: bool,
}

/// 注册表单
///
/// 字段校验由后端负责，字段错误原样返回给调用方。
pub struct RegisterForm {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub password: Secret<String>,
    pub password_confirm: Secret<String>,
}

impl RegisterForm {
    pub fn as_request(&self) -> RegisterRequest<'_> {
        RegisterRequest {
            user_id: &self.user_id,
            username: &self.username,
            email: &self.email,
            password: self.password.expose_secret(),
            password2: self.password_confirm.expose_secret(),
        }
    }
}

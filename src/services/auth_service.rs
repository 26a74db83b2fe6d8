//! 认证服务：登录、注册、登出、当前身份

use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;

use crate::auth::session::SignOutReason;
use crate::auth::store::SessionIdentity;
use crate::client::{ApiClient, ApiRequest};
use crate::error::{ClientError, Result};
use crate::models::auth::{Landing, LoginRequest, LoginResponse};
use crate::models::user::{RegisterForm, RegisteredUser};

/// 登录结果
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub identity: SessionIdentity,
    pub landing: Landing,
}

pub struct AuthService {
    client: Arc<ApiClient>,
}

impl AuthService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// 用户登录
    ///
    /// 成功后令牌与身份信息写入会话存储，并发布 `SignedIn`。
    pub async fn login(&self, user_id: &str, password: &Secret<String>) -> Result<SignedIn> {
        if user_id.trim().is_empty() {
            return Err(ClientError::validation("user id is required"));
        }

        let request = ApiRequest::post("/users/login/").json(&LoginRequest {
            user_id,
            password: password.expose_secret(),
        })?;
        let response: LoginResponse = self.client.send_anonymous(&request).await?;

        let store = self.client.store();
        store.set(&response.credentials())?;
        let identity = response.identity();
        store.set_identity(&identity)?;
        self.client.session().signed_in();

        let landing = Landing::for_identity(&identity);
        tracing::info!(
            user_id = %identity.user_id,
            is_staff = identity.is_staff,
            "Signed in"
        );

        Ok(SignedIn { identity, landing })
    }

    /// 注册新账户；字段错误由后端返回（400 + 字段错误 JSON）
    pub async fn register(&self, form: &RegisterForm) -> Result<RegisteredUser> {
        let request = ApiRequest::post("/users/register/").json(&form.as_request())?;
        let user: RegisteredUser = self.client.send_anonymous(&request).await?;
        tracing::info!(user_id = %user.user_id, "Account registered");
        Ok(user)
    }

    /// 登出：清除会话并发布 `SignedOut(UserRequested)`
    pub fn logout(&self) -> Result<()> {
        self.client.store().clear()?;
        self.client.session().signed_out(SignOutReason::UserRequested);
        tracing::info!("Signed out");
        Ok(())
    }

    /// 当前登录的身份
    pub fn current_identity(&self) -> Result<SessionIdentity> {
        let store = self.client.store();
        if store.get()?.is_none() {
            return Err(ClientError::NotSignedIn);
        }
        store.identity()?.ok_or(ClientError::NotSignedIn)
    }

    pub fn is_signed_in(&self) -> Result<bool> {
        Ok(self.client.store().get()?.is_some())
    }
}

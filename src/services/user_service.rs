//! 用户管理服务（仅管理员账户可用，权限由后端判断）

use std::sync::Arc;

use crate::client::ApiClient;
use crate::error::{ClientError, Result};
use crate::models::user::{UpdateUserRequest, UserRecord};

pub struct UserAdminService {
    client: Arc<ApiClient>,
}

impl UserAdminService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<Vec<UserRecord>> {
        self.client.get("/users/list/").await
    }

    pub async fn set_active(&self, id: i64, is_active: bool) -> Result<UserRecord> {
        let user: UserRecord = self
            .client
            .put(&format!("/users/{}/", id), &UpdateUserRequest { is_active })
            .await?;
        tracing::info!(id, is_active, "User activation changed");
        Ok(user)
    }

    /// 切换启用状态，返回切换后的记录
    pub async fn toggle_active(&self, id: i64) -> Result<UserRecord> {
        let users = self.list().await?;
        let current = users
            .iter()
            .find(|user| user.id == id)
            .map(|user| user.is_active)
            .ok_or_else(|| ClientError::validation(format!("user {} not found", id)))?;
        self.set_active(id, !current).await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.client.delete(&format!("/users/{}/", id)).await?;
        tracing::info!(id, "User deleted");
        Ok(())
    }
}

//! 业务服务层：在带认证的客户端之上按后端接口组织操作

pub mod auth_service;
pub mod diary_service;
pub mod retrospect_service;
pub mod user_service;

pub use auth_service::{AuthService, SignedIn};
pub use diary_service::DiaryService;
pub use retrospect_service::RetrospectService;
pub use user_service::UserAdminService;

use std::sync::Arc;

use crate::client::ApiClient;

/// 共享同一个客户端（同一个刷新协调器）的全部服务
#[derive(Clone)]
pub struct Services {
    pub client: Arc<ApiClient>,
    pub auth: Arc<AuthService>,
    pub diary: Arc<DiaryService>,
    pub retrospect: Arc<RetrospectService>,
    pub users: Arc<UserAdminService>,
}

impl Services {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            auth: Arc::new(AuthService::new(client.clone())),
            diary: Arc::new(DiaryService::new(client.clone())),
            retrospect: Arc::new(RetrospectService::new(client.clone())),
            users: Arc::new(UserAdminService::new(client.clone())),
            client,
        }
    }
}

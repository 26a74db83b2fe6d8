//! 令牌刷新协调
//!
//! [`RefreshCoordinator`] 保证同一客户端实例同时最多只有一个刷新请求：
//! 第一个遇到 401 的请求成为 leader 并发起刷新，其余请求排队等待，
//! leader 完成后队列被一次性清空，每个等待者恰好收到一次结果。

use secrecy::{ExposeSecret, Secret};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::oneshot;
use url::Url;

use crate::auth::store::{CredentialStore, StorageError};
use crate::models::auth::{RefreshRequest, RefreshResponse};

/// 一次刷新的结果：新的访问令牌或失败原因
pub type RefreshOutcome = std::result::Result<Secret<String>, RefreshError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshErrorKind {
    /// 会话中没有刷新令牌
    MissingRefreshToken,
    /// 刷新端点拒绝（令牌无效或过期）
    Rejected,
    Transport,
    MalformedResponse,
    Storage,
    /// 刷新期间会话已被清除（例如用户登出）
    SessionCleared,
    /// leader 未完成就被丢弃
    Abandoned,
}

/// 刷新失败
///
/// 可克隆，同一个失败会分发给所有排队的请求。
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RefreshError {
    kind: RefreshErrorKind,
    status: Option<u16>,
    message: String,
}

impl RefreshError {
    fn new(kind: RefreshErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn missing_refresh_token() -> Self {
        Self::new(RefreshErrorKind::MissingRefreshToken, "no refresh token in session")
    }

    pub fn rejected(status: reqwest::StatusCode) -> Self {
        Self {
            kind: RefreshErrorKind::Rejected,
            status: Some(status.as_u16()),
            message: format!("refresh token rejected with status {}", status.as_u16()),
        }
    }

    pub fn transport(err: reqwest::Error) -> Self {
        Self::new(RefreshErrorKind::Transport, format!("refresh request failed: {}", err))
    }

    pub fn malformed(err: reqwest::Error) -> Self {
        Self::new(
            RefreshErrorKind::MalformedResponse,
            format!("invalid refresh response: {}", err),
        )
    }

    pub fn storage(err: StorageError) -> Self {
        Self::new(RefreshErrorKind::Storage, format!("session storage failed: {}", err))
    }

    pub fn session_cleared() -> Self {
        Self::new(RefreshErrorKind::SessionCleared, "session was cleared during refresh")
    }

    pub fn abandoned() -> Self {
        Self::new(RefreshErrorKind::Abandoned, "refresh was abandoned before completing")
    }

    pub fn kind(&self) -> RefreshErrorKind {
        self.kind
    }

    /// 刷新端点返回的状态码（仅 Rejected）
    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// 单飞刷新协调器
#[derive(Default)]
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    completed_cycles: AtomicU64,
}

/// try_begin_refresh 的结果
pub enum RefreshTicket<'a> {
    /// 当前没有进行中的刷新，调用方负责发起并完成它
    Leader(RefreshLeader<'a>),
    /// 已有刷新进行中，调用方已入队
    Waiter(RefreshWaiter),
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 检查标志并在同一临界区内选出 leader 或入队
    pub fn try_begin_refresh(&self) -> RefreshTicket<'_> {
        let mut state = self.lock();
        if state.in_flight {
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            RefreshTicket::Waiter(RefreshWaiter { rx })
        } else {
            state.in_flight = true;
            RefreshTicket::Leader(RefreshLeader {
                coordinator: self,
                completed: false,
            })
        }
    }

    /// 加入进行中的刷新；没有进行中的刷新时返回 None
    pub fn enqueue_waiter(&self) -> Option<RefreshWaiter> {
        let mut state = self.lock();
        if !state.in_flight {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        state.waiters.push(tx);
        Some(RefreshWaiter { rx })
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().in_flight
    }

    pub fn pending_waiters(&self) -> usize {
        self.lock().waiters.len()
    }

    /// 已完成的刷新周期数（成功或失败）
    pub fn completed_cycles(&self) -> u64 {
        self.completed_cycles.load(Ordering::SeqCst)
    }

    /// 清除标志并清空等待队列，返回被结算的等待者数量
    fn complete_refresh(&self, outcome: &RefreshOutcome) -> usize {
        let waiters = {
            let mut state = self.lock();
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };
        self.completed_cycles.fetch_add(1, Ordering::SeqCst);

        let settled = waiters.len();
        for waiter in waiters {
            let delivered = match outcome {
                Ok(token) => Ok(Secret::new(token.expose_secret().clone())),
                Err(err) => Err(err.clone()),
            };
            // 等待者可能已被丢弃，忽略发送失败
            let _ = waiter.send(delivered);
        }
        settled
    }
}

/// 刷新 leader
///
/// 必须调用 [`RefreshLeader::complete`]；未完成就被丢弃时以 `Abandoned`
/// 结算所有等待者并清除标志。
pub struct RefreshLeader<'a> {
    coordinator: &'a RefreshCoordinator,
    completed: bool,
}

impl RefreshLeader<'_> {
    pub fn complete(mut self, outcome: &RefreshOutcome) -> usize {
        self.completed = true;
        self.coordinator.complete_refresh(outcome)
    }
}

impl Drop for RefreshLeader<'_> {
    fn drop(&mut self) {
        if !self.completed {
            tracing::warn!("Token refresh dropped before completion");
            self.coordinator
                .complete_refresh(&Err(RefreshError::abandoned()));
        }
    }
}

/// 排队等待进行中刷新结果的请求
pub struct RefreshWaiter {
    rx: oneshot::Receiver<RefreshOutcome>,
}

impl RefreshWaiter {
    pub async fn wait(self) -> RefreshOutcome {
        self.rx
            .await
            .unwrap_or_else(|_| Err(RefreshError::abandoned()))
    }
}

/// 刷新协议：把刷新令牌提交到刷新端点换取新的访问令牌
pub struct TokenRefresher {
    http: reqwest::Client,
    endpoint: Url,
}

impl TokenRefresher {
    pub fn new(http: reqwest::Client, endpoint: Url) -> Self {
        Self { http, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// 执行一次刷新，成功时已写回凭证存储
    pub async fn refresh(&self, store: &CredentialStore) -> RefreshOutcome {
        let refresh_token = store
            .refresh_token()
            .map_err(RefreshError::storage)?
            .ok_or_else(RefreshError::missing_refresh_token)?;

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&RefreshRequest {
                refresh: refresh_token.expose_secret(),
            })
            .send()
            .await
            .map_err(RefreshError::transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::rejected(status));
        }

        let body: RefreshResponse = response.json().await.map_err(RefreshError::malformed)?;
        let access = Secret::new(body.access);
        let rotated = body.refresh.map(Secret::new);

        // 只写回提交刷新令牌的那次会话
        let updated = store
            .update_access(&refresh_token, &access, rotated.as_ref())
            .map_err(RefreshError::storage)?;
        if !updated {
            return Err(RefreshError::session_cleared());
        }

        Ok(access)
    }
}

//! 会话状态事件
//!
//! 强制登出（刷新失败）通过这里通知调用方切换到未登录视图。

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutReason {
    /// 进程启动时没有有效会话
    NeverSignedIn,
    /// 用户主动登出
    UserRequested,
    /// 刷新令牌失败，会话被强制清除
    RefreshFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    SignedIn,
    SignedOut(SignOutReason),
}

impl SessionState {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, SessionState::SignedIn)
    }
}

/// 会话事件通道
#[derive(Clone)]
pub struct SessionEvents {
    sender: watch::Sender<SessionState>,
}

impl SessionEvents {
    pub fn new(initial: SessionState) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    pub fn current(&self) -> SessionState {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.sender.subscribe()
    }

    pub fn signed_in(&self) {
        self.publish(SessionState::SignedIn);
    }

    pub fn signed_out(&self, reason: SignOutReason) {
        self.publish(SessionState::SignedOut(reason));
    }

    fn publish(&self, state: SessionState) {
        // 没有订阅者时也要更新当前值
        self.sender.send_replace(state);
        tracing::debug!(?state, "Session state changed");
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new(SessionState::SignedOut(SignOutReason::NeverSignedIn))
    }
}

//! 带认证的 HTTP 客户端
//!
//! 所有业务请求都经过 [`ApiClient::execute`]：
//! - 发送时从凭证存储读取访问令牌，存在则附加 `Authorization: Bearer`
//! - 收到 401 且会话中有刷新令牌时进入刷新流程，刷新成功后用新令牌重放一次
//! - 并发的 401 只触发一次刷新，其余请求排队等待同一结果
//! - 刷新失败时清除会话并发布 `SignedOut(RefreshFailed)`
//!
//! 重放直接走 [`ApiClient::dispatch`]，不会再次进入 401 分支，
//! 因此刷新后仍返回 401 的请求会原样返回给调用方。

use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::auth::refresh::{
    RefreshCoordinator, RefreshErrorKind, RefreshLeader, RefreshOutcome, RefreshTicket,
    TokenRefresher,
};
use crate::auth::session::{SessionEvents, SessionState, SignOutReason};
use crate::auth::store::CredentialStore;
use crate::config::ApiConfig;
use crate::error::{ClientError, Result};

/// 单个 API 请求的描述，可以被重放
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> Result<Self> {
        Ok(self.body(serde_json::to_value(body)?))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// 带认证的 API 客户端
///
/// 刷新状态属于客户端实例；需要在多个任务间共享时用 `Arc` 包装。
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    store: Arc<CredentialStore>,
    refresher: TokenRefresher,
    coordinator: RefreshCoordinator,
    session: SessionEvents,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, store: Arc<CredentialStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Self::with_http(http, config, store)
    }

    /// 使用已构建的 reqwest 客户端
    pub fn with_http(
        http: reqwest::Client,
        config: &ApiConfig,
        store: Arc<CredentialStore>,
    ) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        let refresh_endpoint = join_path(&base_url, &config.refresh_path)?;
        let refresher = TokenRefresher::new(http.clone(), refresh_endpoint);

        let initial = if store.get()?.is_some() {
            SessionState::SignedIn
        } else {
            SessionState::SignedOut(SignOutReason::NeverSignedIn)
        };

        tracing::debug!(
            base_url = %base_url,
            refresh_endpoint = %refresher.endpoint(),
            "API client initialized"
        );

        Ok(Self {
            http,
            base_url,
            store,
            refresher,
            coordinator: RefreshCoordinator::new(),
            session: SessionEvents::new(initial),
        })
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn session(&self) -> &SessionEvents {
        &self.session
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// 执行请求并返回原始响应
    ///
    /// 非 401 的状态码原样返回；只有刷新失败会以错误返回。
    pub async fn execute(&self, request: &ApiRequest) -> Result<reqwest::Response> {
        let sent_with = self.store.access_token()?;
        let response = self.dispatch(request, sent_with.as_ref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        if !self.store.has_refresh_token()? {
            tracing::debug!(path = %request.path, "Unauthorized without refresh token");
            return Ok(response);
        }

        let token = match self.coordinator.try_begin_refresh() {
            RefreshTicket::Leader(leader) => match self.refreshed_since(sent_with.as_ref())? {
                // 请求发出后令牌已被上一轮刷新替换，无需再次刷新
                Some(current) => {
                    tracing::debug!(path = %request.path, "Access token already refreshed");
                    leader.complete(&Ok(Secret::new(current.expose_secret().clone())));
                    current
                }
                None => self.run_refresh(leader).await?,
            },
            RefreshTicket::Waiter(waiter) => {
                tracing::debug!(path = %request.path, "Waiting for in-flight token refresh");
                waiter.wait().await?
            }
        };

        self.dispatch(request, Some(&token)).await
    }

    /// 存储中的访问令牌与请求发出时不同则返回当前令牌
    fn refreshed_since(&self, sent_with: Option<&Secret<String>>) -> Result<Option<Secret<String>>> {
        let current = self.store.access_token()?;
        Ok(current.filter(|current| {
            sent_with.map_or(true, |sent| sent.expose_secret() != current.expose_secret())
        }))
    }

    /// 由 leader 执行刷新，结算所有等待者
    async fn run_refresh(&self, leader: RefreshLeader<'_>) -> RefreshOutcome {
        tracing::info!("Access token rejected, refreshing");
        let start = Instant::now();
        let outcome = self.refresher.refresh(&self.store).await;

        match &outcome {
            Ok(_) => {
                metrics::counter!("diary_client_token_refresh_total", "outcome" => "success")
                    .increment(1);
                tracing::info!(
                    elapsed_ms = start.elapsed().as_millis(),
                    "Token refresh succeeded"
                );
            }
            Err(err) => {
                metrics::counter!("diary_client_token_refresh_total", "outcome" => "failure")
                    .increment(1);
                tracing::warn!(error = %err, kind = ?err.kind(), "Token refresh failed");

                // 刷新期间用户已登出：会话已为空，不再发布强制登出
                if err.kind() != RefreshErrorKind::SessionCleared {
                    if let Err(clear_err) = self.store.clear() {
                        tracing::error!(error = %clear_err, "Failed to clear session");
                    }
                    self.session.signed_out(SignOutReason::RefreshFailed);
                }
            }
        }

        let settled = leader.complete(&outcome);
        if settled > 0 {
            tracing::debug!(waiters = settled, "Released queued requests");
        }
        outcome
    }

    /// 发送一次请求，不处理 401
    async fn dispatch(
        &self,
        request: &ApiRequest,
        access: Option<&Secret<String>>,
    ) -> Result<reqwest::Response> {
        let url = self.url_for(request)?;
        let request_id = Uuid::new_v4().to_string();

        let span = tracing::info_span!(
            "api_request",
            request_id = %request_id,
            method = %request.method,
            path = %request.path,
        );

        async move {
            let start = Instant::now();

            let mut builder = self
                .http
                .request(request.method.clone(), url)
                .header("x-request-id", request_id.as_str());
            if let Some(token) = access {
                builder = builder.bearer_auth(token.expose_secret());
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let result = builder.send().await;
            let elapsed = start.elapsed();
            let method = method_label(&request.method);

            match &result {
                Ok(response) => {
                    let status = response.status().as_u16();
                    metrics::counter!(
                        "diary_client_requests_total",
                        "method" => method,
                        "status" => status_label(status)
                    )
                    .increment(1);
                    metrics::histogram!("diary_client_request_duration_seconds")
                        .record(elapsed.as_secs_f64());

                    tracing::info!(
                        status = status,
                        elapsed_ms = elapsed.as_millis(),
                        "Request completed"
                    );
                }
                Err(err) => {
                    metrics::counter!(
                        "diary_client_requests_total",
                        "method" => method,
                        "status" => "error"
                    )
                    .increment(1);
                    tracing::warn!(error = %err, elapsed_ms = elapsed.as_millis(), "Request failed");
                }
            }

            Ok(result?)
        }
        .instrument(span)
        .await
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url> {
        let mut url = join_path(&self.base_url, &request.path)?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// 执行请求，非成功状态转换为 `ClientError::Http`
    pub async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response> {
        let response = self.execute(request).await?;
        ensure_success(request, response).await
    }

    /// 不附加令牌、不进入刷新流程（登录、注册）
    pub async fn send_anonymous<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        let response = self.dispatch(request, None).await?;
        decode(ensure_success(request, response).await?).await
    }

    /// 执行请求并把成功响应解析为 JSON
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        decode(self.send(request).await?).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json(&ApiRequest::get(path)).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(&ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(&ApiRequest::put(path).json(body)?).await
    }

    /// DELETE，忽略响应体（后端可能返回 204）
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(&ApiRequest::delete(path)).await?;
        Ok(())
    }
}

async fn ensure_success(
    request: &ApiRequest,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::debug!(status = status.as_u16(), path = %request.path, "Request rejected");
    Err(ClientError::Http { status, body })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// 把相对路径拼接到基础地址之后（保留基础地址自身的路径前缀）
fn join_path(base: &Url, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Ok(Url::parse(&joined)?)
}

fn method_label(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        Method::PATCH => "PATCH",
        _ => "UNKNOWN",
    }
}

fn status_label(status: u16) -> &'static str {
    match status {
        200 => "200",
        201 => "201",
        204 => "204",
        400 => "400",
        401 => "401",
        403 => "403",
        404 => "404",
        500 => "500",
        _ => "other",
    }
}

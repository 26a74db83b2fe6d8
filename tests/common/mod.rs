//! 测试公共模块
//! 在 127.0.0.1 随机端口上运行一个进程内的假后端，模拟令牌校验与刷新

#![allow(dead_code)]

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use diary_client::{
    auth::{CredentialPair, CredentialStore},
    client::ApiClient,
    config::ApiConfig,
    services::Services,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const VALID_REFRESH: &str = "refresh-valid";
pub const EXPIRED_ACCESS: &str = "access-expired";
pub const PASSWORD: &str = "correct-horse";
/// /slow/ 校验令牌之后、响应之前的等待时间
pub const SLOW_ROUTE_DELAY: Duration = Duration::from_millis(400);

type Reply = (StatusCode, Json<Value>);

/// 假后端状态
pub struct FakeBackend {
    valid_access: Mutex<String>,
    valid_refresh: Mutex<String>,
    issued: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub refresh_delay: Mutex<Duration>,
    pub refresh_fails: AtomicBool,
    pub rotate_refresh: AtomicBool,
    /// 携带有效令牌的受保护请求数
    pub authorized_hits: AtomicUsize,
    pub always_401_hits: AtomicUsize,
    pub retrospect_queries: Mutex<Vec<HashMap<String, String>>>,
    pub auth_headers: Mutex<Vec<Option<String>>>,
    pub last_edit: Mutex<Option<Value>>,
    pub last_user_update: Mutex<Option<Value>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            valid_access: Mutex::new("access-0".to_string()),
            valid_refresh: Mutex::new(VALID_REFRESH.to_string()),
            issued: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            refresh_delay: Mutex::new(Duration::from_millis(0)),
            refresh_fails: AtomicBool::new(false),
            rotate_refresh: AtomicBool::new(false),
            authorized_hits: AtomicUsize::new(0),
            always_401_hits: AtomicUsize::new(0),
            retrospect_queries: Mutex::new(Vec::new()),
            auth_headers: Mutex::new(Vec::new()),
            last_edit: Mutex::new(None),
            last_user_update: Mutex::new(None),
        })
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    pub fn valid_access(&self) -> String {
        self.valid_access.lock().unwrap().clone()
    }

    pub fn valid_refresh(&self) -> String {
        self.valid_refresh.lock().unwrap().clone()
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), Reply> {
        let header = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        self.auth_headers.lock().unwrap().push(header.clone());

        let expected = format!("Bearer {}", self.valid_access());
        if header.as_deref() == Some(expected.as_str()) {
            self.authorized_hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        } else {
            Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({"detail": "Given token not valid for any token type"})),
            ))
        }
    }
}

/// 启动假后端，返回 API 根地址
pub async fn spawn_backend(backend: Arc<FakeBackend>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().unwrap();

    let app = router(backend);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/api", addr)
}

pub fn api_config(base_url: &str) -> ApiConfig {
    ApiConfig {
        base_url: base_url.to_string(),
        refresh_path: "/token/refresh/".to_string(),
        timeout_secs: 10,
    }
}

/// 会话中只有过期访问令牌与给定刷新令牌的客户端
pub fn client_with_tokens(base_url: &str, access: &str, refresh: &str) -> Arc<ApiClient> {
    let store = Arc::new(CredentialStore::in_memory());
    store.set(&CredentialPair::new(access, refresh)).unwrap();
    Arc::new(ApiClient::new(&api_config(base_url), store).unwrap())
}

pub fn anonymous_client(base_url: &str) -> Arc<ApiClient> {
    Arc::new(ApiClient::new(&api_config(base_url), Arc::new(CredentialStore::in_memory())).unwrap())
}

/// 已登录（访问令牌已过期）的全部服务
pub async fn signed_in_services() -> (Arc<FakeBackend>, Services) {
    let backend = FakeBackend::new();
    let base_url = spawn_backend(backend.clone()).await;
    let client = client_with_tokens(&base_url, EXPIRED_ACCESS, VALID_REFRESH);
    (backend, Services::new(client))
}

fn router(backend: Arc<FakeBackend>) -> Router {
    Router::new()
        .route("/api/token/refresh/", post(refresh))
        .route("/api/users/login/", post(login))
        .route("/api/users/register/", post(register))
        .route("/api/users/list/", get(list_users))
        .route("/api/users/{id}/", put(update_user).delete(delete_user))
        .route("/api/always-401/", get(always_401))
        .route("/api/slow/", get(slow))
        .route("/api/diary/generate/", post(generate_entry))
        .route("/api/diary/entries/", get(feed))
        .route("/api/diary/entries/{id}/", get(entry_detail))
        .route("/api/diary/edit/{id}/", put(edit_entry).delete(delete_entry))
        .route(
            "/api/diary/daily-summary/",
            get(daily_summary).post(generate_summary),
        )
        .route("/api/diary/daily-summary/delete/{id}/", axum::routing::delete(delete_summary))
        .route("/api/diary/missing-summaries/", get(missing_summaries))
        .route("/api/diary/retrospect/", get(retrospect))
        .route("/api/diary/monthly-retrospect/", get(monthly_retrospect))
        .route("/api/diary/monthly-retrospect-llm/", get(monthly_insight))
        .with_state(backend)
}

async fn refresh(State(state): State<Arc<FakeBackend>>, Json(body): Json<Value>) -> Reply {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let delay = *state.refresh_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let presented = body.get("refresh").and_then(Value::as_str).unwrap_or_default();
    if state.refresh_fails.load(Ordering::SeqCst) || presented != state.valid_refresh() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Token is invalid or expired", "code": "token_not_valid"})),
        );
    }

    let n = state.issued.fetch_add(1, Ordering::SeqCst) + 1;
    let access = format!("access-{}", n);
    *state.valid_access.lock().unwrap() = access.clone();

    if state.rotate_refresh.load(Ordering::SeqCst) {
        let rotated = format!("refresh-rotated-{}", n);
        *state.valid_refresh.lock().unwrap() = rotated.clone();
        (StatusCode::OK, Json(json!({"access": access, "refresh": rotated})))
    } else {
        (StatusCode::OK, Json(json!({"access": access})))
    }
}

/// 到达时校验令牌，延迟后才响应：响应到达客户端时令牌可能已被刷新
async fn slow(State(state): State<Arc<FakeBackend>>, headers: HeaderMap) -> Reply {
    let verdict = state.authorize(&headers);
    tokio::time::sleep(SLOW_ROUTE_DELAY).await;
    match verdict {
        Ok(()) => (StatusCode::OK, Json(json!({"slow": true}))),
        Err(reply) => reply,
    }
}

async fn login(State(state): State<Arc<FakeBackend>>, Json(body): Json<Value>) -> Reply {
    let user_id = body.get("user_id").and_then(Value::as_str).unwrap_or_default();
    let password = body.get("password").and_then(Value::as_str).unwrap_or_default();
    if password != PASSWORD {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"non_field_errors": ["password does not match"]})),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "access": state.valid_access(),
            "refresh": state.valid_refresh(),
            "user_id": user_id,
            "username": if user_id == "admin" { Value::Null } else { json!("Kim") },
            "is_staff": user_id == "admin",
        })),
    )
}

async fn register(Json(body): Json<Value>) -> Reply {
    if body.get("password") != body.get("password2") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"password2": ["passwords do not match"]})),
        );
    }
    (
        StatusCode::CREATED,
        Json(json!({
            "user_id": body["user_id"],
            "username": body["username"],
            "email": body["email"],
        })),
    )
}

fn users() -> Value {
    json!([
        {"id": 1, "user_id": "admin", "username": null, "email": "admin@example.com", "is_active": true},
        {"id": 2, "user_id": "kim", "username": "Kim", "email": "kim@example.com", "is_active": true},
    ])
}

async fn list_users(State(state): State<Arc<FakeBackend>>, headers: HeaderMap) -> Reply {
    if let Err(reply) = state.authorize(&headers) {
        return reply;
    }
    (StatusCode::OK, Json(users()))
}

async fn update_user(
    State(state): State<Arc<FakeBackend>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Reply {
    if let Err(reply) = state.authorize(&headers) {
        return reply;
    }
    *state.last_user_update.lock().unwrap() = Some(body.clone());

    let Some(mut user) = users()
        .as_array()
        .and_then(|all| all.iter().find(|u| u["id"] == id).cloned())
    else {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."})));
    };
    user["is_active"] = body["is_active"].clone();
    (StatusCode::OK, Json(user))
}

async fn delete_user(State(state): State<Arc<FakeBackend>>, headers: HeaderMap) -> Response {
    if let Err(reply) = state.authorize(&headers) {
        return reply.into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn always_401(State(state): State<Arc<FakeBackend>>, headers: HeaderMap) -> Reply {
    state.always_401_hits.fetch_add(1, Ordering::SeqCst);
    let _ = state.authorize(&headers);
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "You do not have access"})),
    )
}

fn entry(id: i64, created_at: &str, raw: &str, diary: &str, happiness: u32) -> Value {
    json!({
        "id": id,
        "user": 2,
        "raw_input": raw,
        "generated_diary": diary,
        "emotion": "calm",
        "happiness_score": happiness,
        "joy": 40,
        "anger": 0,
        "sadness": 10,
        "pleasure": 50,
        "hashtags": ["#daily"],
        "is_public": true,
        "created_at": created_at,
    })
}

fn may_first_summary() -> Value {
    json!({
        "id": 100,
        "user": 2,
        "date": "2025-05-01",
        "summary": "",
        "emotion": "calm",
        "happiness_score": 65,
        "joy": 40,
        "anger": 0,
        "sadness": 10,
        "pleasure": 50,
        "hashtags": ["#day"],
        "created_at": "2025-05-01T23:50:00+09:00",
        "raw_input": "",
        "generated_diary": "A calm first of May.",
        // 只包含第一条日记：第二条是生成综合日记之后写的
        "original_inputs": [
            {"raw_input": "morning walk", "diary": "I walked in the morning."}
        ],
    })
}

async fn feed(State(state): State<Arc<FakeBackend>>, headers: HeaderMap) -> Reply {
    if let Err(reply) = state.authorize(&headers) {
        return reply;
    }

    let mut summary = may_first_summary();
    summary["is_summary"] = json!(true);

    (
        StatusCode::OK,
        Json(json!([
            entry(1, "2025-05-01T08:00:00+09:00", "morning walk", "I walked in the morning.", 60),
            entry(2, "2025-05-01T23:30:00+09:00", "late coffee", "Coffee at night.", 70),
            entry(3, "2025-05-02T09:00:00+09:00", "rain", "It rained.", 40),
            summary,
        ])),
    )
}

async fn entry_detail(
    State(state): State<Arc<FakeBackend>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Reply {
    if let Err(reply) = state.authorize(&headers) {
        return reply;
    }
    if id == 1 {
        (
            StatusCode::OK,
            Json(entry(1, "2025-05-01T08:00:00+09:00", "morning walk", "I walked in the morning.", 60)),
        )
    } else {
        (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."})))
    }
}

async fn generate_entry(
    State(state): State<Arc<FakeBackend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    if let Err(reply) = state.authorize(&headers) {
        return reply;
    }
    let input = body["input"].as_str().unwrap_or_default().to_string();
    (
        StatusCode::CREATED,
        Json(entry(4, "2025-05-03T10:00:00+09:00", &input, "Generated diary.", 80)),
    )
}

async fn edit_entry(
    State(state): State<Arc<FakeBackend>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Reply {
    if let Err(reply) = state.authorize(&headers) {
        return reply;
    }
    *state.last_edit.lock().unwrap() = Some(body.clone());

    let mut updated = entry(id, "2025-05-01T08:00:00+09:00", "morning walk", "I walked in the morning.", 60);
    if let Some(raw) = body.get("raw_input") {
        updated["raw_input"] = raw.clone();
        updated["generated_diary"] = json!("Regenerated diary.");
    }
    if let Some(text) = body.get("generated_diary") {
        updated["generated_diary"] = text.clone();
    }
    if let Some(tags) = body.get("hashtags") {
        updated["hashtags"] = tags.clone();
    }
    (StatusCode::OK, Json(updated))
}

async fn delete_entry(State(state): State<Arc<FakeBackend>>, headers: HeaderMap) -> Response {
    if let Err(reply) = state.authorize(&headers) {
        return reply.into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn daily_summary(
    State(state): State<Arc<FakeBackend>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    if let Err(reply) = state.authorize(&headers) {
        return reply;
    }
    match query.get("date").map(String::as_str) {
        Some("2025-05-01") => (StatusCode::OK, Json(may_first_summary())),
        Some(_) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "no daily summary for this date"})),
        ),
        None => (StatusCode::BAD_REQUEST, Json(json!({"error": "date is required"}))),
    }
}

async fn generate_summary(
    State(state): State<Arc<FakeBackend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    if let Err(reply) = state.authorize(&headers) {
        return reply;
    }
    match body["date"].as_str() {
        Some("2025-05-02") => (
            StatusCode::OK,
            Json(json!({
                "id": 101,
                "date": "2025-05-02",
                "generated_diary": "A rainy day.",
                "emotion": "gloomy",
                "happiness_score": 40,
                "joy": 10,
                "anger": 0,
                "sadness": 60,
                "pleasure": 30,
                "hashtags": ["#rain"],
                "original_inputs": [{"raw_input": "rain", "diary": "It rained."}],
            })),
        ),
        _ => (StatusCode::OK, Json(json!({"message": "no entries on this date"}))),
    }
}

async fn delete_summary(State(state): State<Arc<FakeBackend>>, headers: HeaderMap) -> Response {
    if let Err(reply) = state.authorize(&headers) {
        return reply.into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn missing_summaries(State(state): State<Arc<FakeBackend>>, headers: HeaderMap) -> Reply {
    if let Err(reply) = state.authorize(&headers) {
        return reply;
    }
    (
        StatusCode::OK,
        Json(json!({"missing_daily_summaries": ["2025-05-02"]})),
    )
}

async fn retrospect(
    State(state): State<Arc<FakeBackend>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    if let Err(reply) = state.authorize(&headers) {
        return reply;
    }
    state.retrospect_queries.lock().unwrap().push(query.clone());

    let label = query
        .get("period")
        .cloned()
        .unwrap_or_else(|| format!("{}~{}", query["start_date"], query["end_date"]));
    (
        StatusCode::OK,
        Json(json!({
            "summary": format!("retrospect {}", label),
            "average_happiness": 55.5,
            "emotion_summary": {"joy": 30.0, "anger": 5.0, "sadness": 15.0, "pleasure": 50.0},
            "insight": "steady",
            "period": label,
        })),
    )
}

async fn monthly_retrospect(
    State(state): State<Arc<FakeBackend>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    if let Err(reply) = state.authorize(&headers) {
        return reply;
    }
    if query.get("month").map(String::as_str) != Some("5") {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"message": "no entries this month"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "year": 2025,
            "month": 5,
            "average_happiness": 56.7,
            "average_emotions": {"joy": 40, "anger": 0, "sadness": 10, "pleasure": 50},
            "top_hashtags": ["#daily"],
            "summary": "A gentle month.",
            "highlight_entry": {
                "id": 2,
                "created_at": "2025-05-01T23:30:00+09:00",
                "generated_diary": "Coffee at night.",
                "happiness_score": 70,
                "emotion": "calm",
                "hashtags": ["#daily"],
            },
        })),
    )
}

async fn monthly_insight(
    State(state): State<Arc<FakeBackend>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    if let Err(reply) = state.authorize(&headers) {
        return reply;
    }
    let month = query.get("month").cloned().unwrap_or_default();
    if month != "5" {
        return (
            StatusCode::OK,
            Json(json!({
                "summary": format!("no entries in month {}", month),
                "average_happiness": 0,
                "insight": "write more often",
            })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "summary": "May retrospect",
            "average_happiness": 56.7,
            "emotion_summary": {"joy": 40.0, "anger": 0.0, "sadness": 10.0, "pleasure": 50.0},
            "insight": "mostly joyful",
        })),
    )
}

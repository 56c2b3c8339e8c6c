//! HTTP API 服务器
//!
//! 应用、聊天会话和应用文件的 REST 接口，以及 `/ws` 实时通道。
//! 除 `/health` 外的 REST 接口都需要 `Authorization: Bearer <token>`。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        ws::WebSocketUpgrade,
        DefaultBodyLimit, FromRequestParts, Path, Query, State,
    },
    http::{request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};

use crate::app_files::{canonical_file_path, AppFileStore, FileMeta, StoreError};
use crate::auth::{bearer_token, TokenVerifier};
use crate::config::{Config, ServerConfig};
use crate::database::dao::{AppDao, ChatSessionDao};
use crate::database::DbConnection;
use crate::generation::Generator;
use crate::models::{App, ChatSession};
use crate::websocket::{ConnectionRegistry, Gateway, HandshakeParams, MessageRouter, WsStatsSnapshot};

#[derive(Clone)]
pub struct AppState {
    pub db: DbConnection,
    pub store: Arc<AppFileStore>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub gateway: Arc<Gateway>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        config: &Config,
        db: DbConnection,
        verifier: Arc<dyn TokenVerifier>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.server.max_connections));
        let router = Arc::new(MessageRouter::new(generator, config.streaming.clone()));
        let gateway = Arc::new(Gateway::new(
            verifier.clone(),
            db.clone(),
            registry,
            router,
        ));
        Self {
            store: Arc::new(AppFileStore::new(db.clone())),
            db,
            verifier,
            gateway,
            start_time: std::time::Instant::now(),
        }
    }
}

// ============================================================================
// 错误响应
// ============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Authentication required")]
    Unauthorized,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn app_not_found() -> Self {
        Self::NotFound("App not found".to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Path(e) => Self::BadRequest(e.to_string()),
            StoreError::Validation(msg) => Self::BadRequest(msg),
            StoreError::NotFound(path) => Self::NotFound(format!("File not found: {}", path)),
            StoreError::AppNotFound(_) => Self::app_not_found(),
            StoreError::Conflict(path) => Self::Conflict(format!("File already exists: {}", path)),
            StoreError::Database(_) | StoreError::LockPoisoned => {
                tracing::error!("[Server] 存储操作失败: {}", e);
                Self::Internal
            }
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        tracing::error!("[Server] 数据库操作失败: {}", e);
        Self::Internal
    }
}

// 解析细节只记录日志，不回显给客户端
impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        tracing::debug!("[Server] 请求体无效: {}", e.body_text());
        Self::BadRequest("Invalid request body".to_string())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        tracing::debug!("[Server] 查询参数无效: {}", e.body_text());
        Self::BadRequest("Invalid query parameters".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(serde_json::json!({"error": {"message": self.to_string()}})),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// 认证
// ============================================================================

/// 已认证的调用方
pub struct AuthUser(pub String);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(ApiError::Unauthorized)?;
        match state.verifier.verify(token).await {
            Some(user_id) => Ok(AuthUser(user_id)),
            None => Err(ApiError::Unauthorized),
        }
    }
}

/// 读取调用方拥有的应用，不存在或属于其他用户时一律返回 404
fn owned_app(state: &AppState, user_id: &str, app_id: &str) -> ApiResult<App> {
    let conn = state.db.lock().map_err(|_| ApiError::Internal)?;
    match AppDao::get(&conn, app_id)? {
        Some(app) if app.owner_user_id == user_id => Ok(app),
        _ => Err(ApiError::app_not_found()),
    }
}

// ============================================================================
// 路由
// ============================================================================

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let app = Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_upgrade_handler))
        .route("/api/apps", get(list_apps).post(create_app))
        .route("/api/apps/:app_id", get(get_app).delete(delete_app))
        .route("/api/apps/:app_id/chats", get(list_chats).post(create_chat))
        .route(
            "/api/apps/:app_id/files",
            get(list_files).put(write_file).delete(delete_file),
        )
        .route("/api/apps/:app_id/files/content", get(read_file))
        .route("/api/apps/:app_id/files/rename", post(rename_file))
        .route("/api/apps/:app_id/export", get(export_files))
        .route("/api/apps/:app_id/import", post(import_files))
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .with_state(state);

    match cors_layer(&config.cors_origins) {
        Some(cors) => app.layer(cors),
        None => app,
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("[Server] 忽略无效的 CORS 来源: {}", origin);
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

/// 启动服务器，`shutdown` 收到信号后优雅退出
pub async fn run_server(
    config: &Config,
    state: AppState,
    shutdown: oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = build_router(state, &config.server);

    let addr: std::net::SocketAddr =
        format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("[Server] 监听 {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.await;
        })
        .await?;

    tracing::info!("[Server] 已停止");
    Ok(())
}

// ============================================================================
// 处理器
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthStatus {
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
    version: &'static str,
    uptime_secs: u64,
    websocket: WsStatsSnapshot,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = match state.db.lock() {
        Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
        Err(_) => false,
    };
    let (code, status) = if db_ok {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };
    (
        code,
        Json(HealthStatus {
            status,
            timestamp: chrono::Utc::now(),
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: state.start_time.elapsed().as_secs(),
            websocket: state.gateway.registry().snapshot(),
        }),
    )
}

/// WebSocket 升级处理器
///
/// 认证在升级之后进行，失败时通过关闭帧告知客户端。
async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    params: Result<Query<HandshakeParams>, QueryRejection>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let params = params.map(|Query(p)| p).unwrap_or_default();
    let header_token = bearer_token(&headers).map(str::to_string);
    let gateway = state.gateway.clone();

    ws.on_upgrade(move |socket| async move {
        let (sender, receiver) = socket.split();
        gateway.serve(sender, receiver, params, header_token).await;
    })
}

#[derive(Debug, Deserialize)]
struct CreateAppRequest {
    name: String,
}

async fn create_app(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<CreateAppRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<App>)> {
    let Json(request) = payload?;
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }
    let app = App::new(name, user_id);
    {
        let conn = state.db.lock().map_err(|_| ApiError::Internal)?;
        AppDao::insert(&conn, &app)?;
    }
    tracing::info!("[Server] 创建应用: {} ({})", app.name, app.id);
    Ok((StatusCode::CREATED, Json(app)))
}

async fn list_apps(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<Vec<App>>> {
    let conn = state.db.lock().map_err(|_| ApiError::Internal)?;
    Ok(Json(AppDao::list_by_owner(&conn, &user_id)?))
}

async fn get_app(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(app_id): Path<String>,
) -> ApiResult<Json<App>> {
    owned_app(&state, &user_id, &app_id).map(Json)
}

async fn delete_app(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(app_id): Path<String>,
) -> ApiResult<StatusCode> {
    owned_app(&state, &user_id, &app_id)?;
    {
        let conn = state.db.lock().map_err(|_| ApiError::Internal)?;
        AppDao::delete(&conn, &app_id)?;
    }
    tracing::info!("[Server] 删除应用: {}", app_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn create_chat(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(app_id): Path<String>,
) -> ApiResult<(StatusCode, Json<ChatSession>)> {
    owned_app(&state, &user_id, &app_id)?;
    let chat = ChatSession::new(app_id, user_id);
    {
        let conn = state.db.lock().map_err(|_| ApiError::Internal)?;
        ChatSessionDao::insert(&conn, &chat)?;
    }
    Ok((StatusCode::CREATED, Json(chat)))
}

async fn list_chats(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(app_id): Path<String>,
) -> ApiResult<Json<Vec<ChatSession>>> {
    owned_app(&state, &user_id, &app_id)?;
    let conn = state.db.lock().map_err(|_| ApiError::Internal)?;
    Ok(Json(ChatSessionDao::list_by_app(&conn, &app_id)?))
}

#[derive(Debug, Deserialize)]
struct PathQuery {
    path: Option<String>,
}

impl PathQuery {
    fn required(self) -> ApiResult<String> {
        match self.path {
            Some(path) if !path.trim().is_empty() => Ok(path),
            _ => Err(ApiError::BadRequest("path is required".to_string())),
        }
    }
}

#[derive(Debug, Serialize)]
struct FileContent {
    path: String,
    content: String,
}

async fn list_files(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(app_id): Path<String>,
) -> ApiResult<Json<Vec<FileMeta>>> {
    owned_app(&state, &user_id, &app_id)?;
    Ok(Json(state.store.list(&app_id)?))
}

async fn read_file(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(app_id): Path<String>,
    query: Result<Query<PathQuery>, QueryRejection>,
) -> ApiResult<Json<FileContent>> {
    let Query(query) = query?;
    let path = query.required()?;
    owned_app(&state, &user_id, &app_id)?;
    let path = canonical_file_path(&path)?;
    let content = state.store.read(&app_id, &path)?;
    Ok(Json(FileContent { path, content }))
}

#[derive(Debug, Deserialize)]
struct WriteFileRequest {
    path: String,
    content: String,
}

async fn write_file(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(app_id): Path<String>,
    payload: Result<Json<WriteFileRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<FileMeta>)> {
    let Json(request) = payload?;
    owned_app(&state, &user_id, &app_id)?;
    let outcome = state.store.write(&app_id, &request.path, &request.content)?;
    let code = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((code, Json(outcome.meta)))
}

async fn delete_file(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(app_id): Path<String>,
    query: Result<Query<PathQuery>, QueryRejection>,
) -> ApiResult<StatusCode> {
    let Query(query) = query?;
    let path = query.required()?;
    owned_app(&state, &user_id, &app_id)?;
    state.store.delete(&app_id, &path)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    from: String,
    to: String,
}

async fn rename_file(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(app_id): Path<String>,
    payload: Result<Json<RenameRequest>, JsonRejection>,
) -> ApiResult<Json<FileMeta>> {
    let Json(request) = payload?;
    owned_app(&state, &user_id, &app_id)?;
    Ok(Json(state.store.rename(&app_id, &request.from, &request.to)?))
}

#[derive(Debug, Serialize, Deserialize)]
struct FileSet {
    files: BTreeMap<String, String>,
}

async fn export_files(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(app_id): Path<String>,
) -> ApiResult<Json<FileSet>> {
    owned_app(&state, &user_id, &app_id)?;
    Ok(Json(FileSet {
        files: state.store.export(&app_id)?,
    }))
}

async fn import_files(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(app_id): Path<String>,
    payload: Result<Json<FileSet>, JsonRejection>,
) -> ApiResult<Json<Vec<FileMeta>>> {
    let Json(request) = payload?;
    owned_app(&state, &user_id, &app_id)?;
    Ok(Json(state.store.import(&app_id, &request.files)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenVerifier;
    use crate::database::open_in_memory;
    use crate::generation::TemplateGenerator;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let db = open_in_memory().unwrap();
        let verifier = Arc::new(StaticTokenVerifier::new([
            ("tok-alice", "alice"),
            ("tok-bob", "bob"),
        ]));
        let config = Config::default();
        let state = AppState::new(&config, db, verifier, Arc::new(TemplateGenerator::new()));
        build_router(state, &config.server)
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create_app_for(app: &Router, token: &str) -> String {
        let (status, body) = call(app, "POST", "/api/apps", Some(token), Some(json!({"name": "demo"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = app();
        let (status, body) = call(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["websocket"]["activeConnections"], 0);
        assert_eq!(body["websocket"]["activeStreams"], 0);
    }

    #[tokio::test]
    async fn test_requires_bearer_token() {
        let app = app();
        let (status, body) = call(&app, "POST", "/api/apps", None, Some(json!({"name": "x"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "Authentication required");

        let (status, _) = call(&app, "POST", "/api/apps", Some("wrong"), Some(json!({"name": "x"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_file_lifecycle() {
        let app = app();
        let id = create_app_for(&app, "tok-alice").await;
        let files = format!("/api/apps/{}/files", id);

        let (status, body) = call(
            &app,
            "PUT",
            &files,
            Some("tok-alice"),
            Some(json!({"path": "src/App.tsx", "content": "v1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["path"], "/src/App.tsx");

        let (status, _) = call(
            &app,
            "PUT",
            &files,
            Some("tok-alice"),
            Some(json!({"path": "/src/App.tsx", "content": "v2"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &app,
            "GET",
            &format!("/api/apps/{}/files/content?path=/src/App.tsx", id),
            Some("tok-alice"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"path": "/src/App.tsx", "content": "v2"}));

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/apps/{}/files/rename", id),
            Some("tok-alice"),
            Some(json!({"from": "/src/App.tsx", "to": "/src/Main.tsx"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["path"], "/src/Main.tsx");

        let (status, body) = call(&app, "GET", &files, Some("tok-alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, _) = call(
            &app,
            "DELETE",
            &format!("{}?path=/src/Main.tsx", files),
            Some("tok-alice"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = call(
            &app,
            "GET",
            &format!("/api/apps/{}/files/content?path=/src/Main.tsx", id),
            Some("tok-alice"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_traversal_is_bad_request() {
        let app = app();
        let id = create_app_for(&app, "tok-alice").await;
        let (status, _) = call(
            &app,
            "PUT",
            &format!("/api/apps/{}/files", id),
            Some("tok-alice"),
            Some(json!({"path": "../../etc/passwd", "content": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "PUT",
            &format!("/api/apps/{}/files", id),
            Some("tok-alice"),
            Some(json!({"path": "/a.txt"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "GET",
            &format!("/api/apps/{}/files/content", id),
            Some("tok-alice"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rename_conflict() {
        let app = app();
        let id = create_app_for(&app, "tok-alice").await;
        let files = format!("/api/apps/{}/files", id);
        for path in ["/a.txt", "/b.txt"] {
            call(&app, "PUT", &files, Some("tok-alice"), Some(json!({"path": path, "content": path}))).await;
        }
        let (status, _) = call(
            &app,
            "POST",
            &format!("/api/apps/{}/files/rename", id),
            Some("tok-alice"),
            Some(json!({"from": "/a.txt", "to": "/b.txt"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = call(&app, "GET", &format!("/api/apps/{}/export", id), Some("tok-alice"), None).await;
        assert_eq!(body, json!({"files": {"/a.txt": "/a.txt", "/b.txt": "/b.txt"}}));
    }

    #[tokio::test]
    async fn test_import_replaces_file_set() {
        let app = app();
        let id = create_app_for(&app, "tok-alice").await;
        call(
            &app,
            "PUT",
            &format!("/api/apps/{}/files", id),
            Some("tok-alice"),
            Some(json!({"path": "/old.txt", "content": "old"})),
        )
        .await;

        let (status, _) = call(
            &app,
            "POST",
            &format!("/api/apps/{}/import", id),
            Some("tok-alice"),
            Some(json!({"files": {"/ok.txt": "1", "../escape.txt": "2"}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/apps/{}/import", id),
            Some("tok-alice"),
            Some(json!({"files": {"index.html": "<html>", "/src/main.ts": "main"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (_, body) = call(&app, "GET", &format!("/api/apps/{}/export", id), Some("tok-alice"), None).await;
        assert_eq!(
            body,
            json!({"files": {"/index.html": "<html>", "/src/main.ts": "main"}})
        );
    }

    #[tokio::test]
    async fn test_foreign_app_is_not_found() {
        let app = app();
        let id = create_app_for(&app, "tok-alice").await;

        let (status, _) = call(&app, "GET", &format!("/api/apps/{}", id), Some("tok-bob"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "GET", &format!("/api/apps/{}/files", id), Some("tok-bob"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&app, "GET", &format!("/api/apps/{}", id), Some("tok-alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ownerUserId"], "alice");
    }

    #[tokio::test]
    async fn test_delete_app_cascades() {
        let app = app();
        let id = create_app_for(&app, "tok-alice").await;
        let (status, chat) = call(&app, "POST", &format!("/api/apps/{}/chats", id), Some("tok-alice"), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(chat["appId"], id.as_str());

        let (status, _) = call(&app, "DELETE", &format!("/api/apps/{}", id), Some("tok-alice"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, "GET", &format!("/api/apps/{}", id), Some("tok-alice"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_app_validates_name() {
        let app = app();
        let (status, body) = call(&app, "POST", "/api/apps", Some("tok-alice"), Some(json!({"name": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "name is required");

        let (status, _) = call(&app, "POST", "/api/apps", Some("tok-alice"), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_apps_only_returns_own() {
        let app = app();
        let first = create_app_for(&app, "tok-alice").await;
        let second = create_app_for(&app, "tok-alice").await;
        create_app_for(&app, "tok-bob").await;

        let (status, body) = call(&app, "GET", "/api/apps", Some("tok-alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        let mut ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["id"].as_str().unwrap())
            .collect();
        ids.sort();
        let mut expected = vec![first.as_str(), second.as_str()];
        expected.sort();
        assert_eq!(ids, expected);

        let (status, _) = call(&app, "GET", "/api/apps", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_chats() {
        let app = app();
        let id = create_app_for(&app, "tok-alice").await;
        let chats = format!("/api/apps/{}/chats", id);
        let (_, chat) = call(&app, "POST", &chats, Some("tok-alice"), None).await;

        let (status, body) = call(&app, "GET", &chats, Some("tok-alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["id"], chat["id"]);

        let (status, _) = call(&app, "GET", &chats, Some("tok-bob"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_body_hides_parser_details() {
        let app = app();
        let request = Request::builder()
            .method("POST")
            .uri("/api/apps")
            .header("authorization", "Bearer tok-alice")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"name": "#))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"error": {"message": "Invalid request body"}}));

        let (status, body) = call(
            &app,
            "PUT",
            &format!("/api/apps/{}/files", create_app_for(&app, "tok-alice").await),
            Some("tok-alice"),
            Some(json!({"path": 7, "content": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Invalid request body");
    }
}

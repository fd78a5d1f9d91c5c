//! 只读诊断接口
//!
//! - `GET /health`
//! - `GET /sessions`：全部会话快照
//! - `GET /sessions/:id`：单个会话快照，不存在时 404
//! - `GET /tools`：已注册工具名

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};

use super::session::{SessionRegistry, SessionSummary};
use crate::tools::ToolExecutor;

#[derive(Clone)]
pub struct DiagnosticsState {
    pub registry: Arc<SessionRegistry>,
    pub executor: Arc<ToolExecutor>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionsResponse {
    pub active_sessions: usize,
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolsResponse {
    pub tools: Vec<String>,
    pub count: usize,
    pub description: String,
}

/// 创建诊断路由
pub fn create_router(registry: Arc<SessionRegistry>, executor: Arc<ToolExecutor>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/sessions", get(list_sessions))
        .route("/sessions/:id", get(get_session))
        .route("/tools", get(list_tools))
        .with_state(DiagnosticsState { registry, executor })
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_sessions(State(state): State<DiagnosticsState>) -> Json<SessionsResponse> {
    let sessions = state.registry.summaries().await;
    Json(SessionsResponse {
        active_sessions: sessions.len(),
        sessions,
    })
}

async fn get_session(
    State(state): State<DiagnosticsState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSummary>, (StatusCode, Json<serde_json::Value>)> {
    state.registry.summary(&id).await.map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("Session not found: {id}") })),
        )
    })
}

async fn list_tools(State(state): State<DiagnosticsState>) -> Json<ToolsResponse> {
    let mut tools = state.executor.tool_names();
    tools.sort();
    Json(ToolsResponse {
        count: tools.len(),
        tools,
        description: "Available tools for the assistant".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use crate::core::ToolPool;
    use crate::tools::{EchoTool, ToolRegistry};

    fn router(registry: Arc<SessionRegistry>) -> Router {
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool);
        create_router(registry, Arc::new(ToolExecutor::new(tools, 0, ToolPool::new(1))))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn lists_and_fetches_sessions() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let (handle, _) = registry.get_or_create("s1", "alice", tx).await;
        handle.lock().await.log.push_user("hi").unwrap();

        let (status, body) = get_json(router(registry.clone()), "/sessions").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active_sessions"], 1);
        assert_eq!(body["sessions"][0]["id"], "s1");

        let (status, body) = get_json(router(registry.clone()), "/sessions/s1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"], "alice");
        assert_eq!(body["state"], "idle");
        assert_eq!(body["message_count"], 1);
        assert_eq!(body["pending_count"], 0);

        let (status, _) = get_json(router(registry), "/sessions/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = get_json(router(Arc::new(SessionRegistry::new())), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn lists_registered_tools() {
        let (status, body) = get_json(router(Arc::new(SessionRegistry::new())), "/tools").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tools"], serde_json::json!(["echo"]));
        assert_eq!(body["count"], 1);
    }
}

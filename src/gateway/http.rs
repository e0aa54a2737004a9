//! HTTP API：构件历史列表、按文件名取构件、智能体状态
//!
//! 全部只读端点；构件按分类目录列出并以 HTML 直接回给浏览器。

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};

use crate::agents::AgentRegistry;
use crate::artifacts::{ArtifactKind, ArtifactStore};

/// HTTP 层共享状态
pub struct HttpState {
    pub store: Arc<ArtifactStore>,
    pub registry: Arc<AgentRegistry>,
}

pub fn router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/agents", get(api_agents))
        .route("/api/dashboards", get(api_list_dashboards))
        .route("/api/dashboards/:file_name", get(api_get_dashboard))
        .route("/api/reports", get(api_list_reports))
        .route("/api/reports/:file_name", get(api_get_report))
        .route("/api/widgets", get(api_list_widgets))
        .route("/api/widgets/:file_name", get(api_get_widget))
        .with_state(state)
}

/// 启动 HTTP 服务
pub async fn serve(addr: String, state: Arc<HttpState>) -> Result<(), String> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", addr, e))?;
    tracing::info!("HTTP API listening on http://{}", addr);
    axum::serve(listener, router(state))
        .await
        .map_err(|e| format!("HTTP server error: {}", e))
}

async fn api_agents(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let agents: Vec<serde_json::Value> = state
        .registry
        .iter()
        .map(|a| {
            serde_json::json!({
                "name": a.name,
                "category": a.category,
                "description": a.description,
                "tool_count": a.tools.len(),
            })
        })
        .collect();
    Json(agents)
}

async fn list(state: &HttpState, kind: ArtifactKind) -> impl IntoResponse {
    match state.store.list(kind) {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn fetch(state: &HttpState, kind: ArtifactKind, file_name: &str) -> impl IntoResponse {
    match state.store.read(kind, file_name) {
        Ok(html) => (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            Html(html),
        )
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "artifact not found").into_response(),
    }
}

async fn api_list_dashboards(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    list(&state, ArtifactKind::Dashboard).await
}

async fn api_get_dashboard(
    State(state): State<Arc<HttpState>>,
    Path(file_name): Path<String>,
) -> impl IntoResponse {
    fetch(&state, ArtifactKind::Dashboard, &file_name).await
}

async fn api_list_reports(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    list(&state, ArtifactKind::Report).await
}

async fn api_get_report(
    State(state): State<Arc<HttpState>>,
    Path(file_name): Path<String>,
) -> impl IntoResponse {
    fetch(&state, ArtifactKind::Report, &file_name).await
}

async fn api_list_widgets(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    list(&state, ArtifactKind::Widget).await
}

async fn api_get_widget(
    State(state): State<Arc<HttpState>>,
    Path(file_name): Path<String>,
) -> impl IntoResponse {
    fetch(&state, ArtifactKind::Widget, &file_name).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    fn test_state() -> (Arc<HttpState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::new(dir.path()).unwrap());
        let registry = Arc::new(AgentRegistry::new());
        (Arc::new(HttpState { store, registry }), dir)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (state, _dir) = test_state();
        let app = router(state);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/health")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_dashboard_is_404() {
        let (state, _dir) = test_state();
        let app = router(state);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/dashboards/nope.html")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_saved_dashboard_is_served() {
        let (state, _dir) = test_state();
        let name = state
            .store
            .save(
                ArtifactKind::Dashboard,
                "<html><head><title>Fleet</title></head></html>",
            )
            .unwrap();
        let app = router(state);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri(format!("/api/dashboards/{}", name))
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

//! Hive Web API
//!
//! 启动: cargo run --bin hive-web --features web
//! 路由前缀 /api/chat：对话、会话历史、清除会话、会话列表、服务信息、健康检查

#![cfg(feature = "web")]

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;

use hive::config::load_config;
use hive::core::build_service;
use hive::memory::LedgerEntry;
use hive::observability;
use hive::service::{HealthStatus, ServiceInfo};
use hive::{ChatRequest, ChatResponse, ChatService};

type AppState = Arc<ChatService>;

#[derive(Serialize)]
struct HistoryResponse {
    session_id: String,
    messages: Vec<LedgerEntry>,
}

#[derive(Serialize)]
struct ClearResponse {
    session_id: String,
    cleared: bool,
}

#[derive(Serialize)]
struct SessionsResponse {
    sessions: Vec<String>,
    count: usize,
}

/// POST /api/chat
async fn api_chat(
    State(service): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    service
        .chat(req)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

/// GET /api/chat/history/:session_id
async fn api_history(State(service): State<AppState>, Path(session_id): Path<String>) -> Json<HistoryResponse> {
    let messages = service.history(&session_id).await;
    Json(HistoryResponse { session_id, messages })
}

/// DELETE /api/chat/session/:session_id
async fn api_clear_session(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ClearResponse>, (StatusCode, String)> {
    if service.clear_session(&session_id).await {
        Ok(Json(ClearResponse {
            session_id,
            cleared: true,
        }))
    } else {
        Err((StatusCode::NOT_FOUND, format!("session {session_id} not found")))
    }
}

/// GET /api/chat/sessions
async fn api_sessions(State(service): State<AppState>) -> Json<SessionsResponse> {
    let sessions = service.active_sessions().await;
    let count = sessions.len();
    Json(SessionsResponse { sessions, count })
}

/// GET /api/chat/info
async fn api_info(State(service): State<AppState>) -> Json<ServiceInfo> {
    Json(service.service_info().await)
}

/// GET /api/chat/health
async fn api_health(State(service): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let health = service.health_check().await;
    let status = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

fn router(service: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(api_chat))
        .route("/api/chat/history/:session_id", get(api_history))
        .route("/api/chat/session/:session_id", delete(api_clear_session))
        .route("/api/chat/sessions", get(api_sessions))
        .route("/api/chat/info", get(api_info))
        .route("/api/chat/health", get(api_health))
        .with_state(service)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let service = Arc::new(build_service(&cfg).context("Failed to build service")?);
    let app = router(service);

    let addr = cfg.web.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("hive-web listening on http://{}", addr);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

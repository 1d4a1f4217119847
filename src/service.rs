//! 服务边界：ChatService
//!
//! 校验请求、补全 session_id 与历史、调用执行引擎并整理响应；会话历史 / 清除 / 列表直接透传到会话账本。
//! CLI 与 Web 两个入口共用这一层。

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::config::AppSection;
use crate::memory::{ConversationWindow, LedgerEntry, Message};
use crate::tools::RepoRef;
use crate::workflow::{ExecutionEngine, Request, RunMode, WorkerRole};

const HEALTH_PROBE_QUERY: &str = "health check";
const HEALTH_PROBE_SESSION: &str = "__health_probe__";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("message must not be empty")]
    EmptyMessage,

    #[error("message is too long ({len} > {max} characters)")]
    MessageTooLong { len: usize, max: usize },

    #[error("invalid repository: {0}")]
    InvalidRepository(String),
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub history: Option<Vec<Message>>,
    /// 提供时进入议题分析流水线
    #[serde(default)]
    pub repository: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    pub agent_used: String,
    pub reasoning_trace: Vec<String>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub nodes: Vec<String>,
    pub capabilities: Vec<String>,
    pub active_sessions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub detail: String,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

pub struct ChatService {
    engine: Arc<ExecutionEngine>,
    name: String,
    max_message_length: usize,
    history_limit: usize,
}

impl ChatService {
    pub fn new(engine: Arc<ExecutionEngine>, app: &AppSection, history_limit: usize) -> Self {
        Self {
            engine,
            name: app.name.clone(),
            max_message_length: app.max_message_length,
            history_limit,
        }
    }

    fn validate(&self, message: &str) -> Result<(), ServiceError> {
        if message.trim().is_empty() {
            return Err(ServiceError::EmptyMessage);
        }
        let len = message.chars().count();
        if len > self.max_message_length {
            return Err(ServiceError::MessageTooLong {
                len,
                max: self.max_message_length,
            });
        }
        Ok(())
    }

    pub async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ServiceError> {
        self.validate(&req.message)?;

        let mode = match req.repository.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            Some(repo) => {
                RepoRef::parse(repo).map_err(|_| ServiceError::InvalidRepository(repo.to_string()))?;
                RunMode::IssueAnalysis {
                    repository: repo.to_string(),
                }
            }
            None => RunMode::Chat,
        };

        let session_id = req
            .session_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let history = match req.history {
            Some(history) => history,
            None => self
                .engine
                .ledger()
                .history(&session_id)
                .await
                .iter()
                .map(LedgerEntry::to_message)
                .collect(),
        };
        let history = ConversationWindow::from_messages(history, self.history_limit).into_messages();

        let request = Request::new(req.message, session_id.clone())
            .with_history(history)
            .with_mode(mode);

        let started = Instant::now();
        let result = self.engine.execute(request).await;

        let agent_used = result
            .route
            .last()
            .copied()
            .unwrap_or(WorkerRole::General)
            .tag()
            .to_string();

        let mut metadata = result.metadata;
        metadata.insert(
            "total_latency_ms".into(),
            json!(started.elapsed().as_millis() as u64),
        );
        metadata.insert(
            "agent_route".into(),
            json!(result.route.iter().map(|r| r.tag()).collect::<Vec<_>>()),
        );
        metadata.insert("workflow_success".into(), json!(result.success));

        Ok(ChatResponse {
            response: result.response,
            session_id,
            agent_used,
            reasoning_trace: result.trace,
            metadata,
        })
    }

    pub async fn history(&self, session_id: &str) -> Vec<LedgerEntry> {
        self.engine.ledger().history(session_id).await
    }

    pub async fn clear_session(&self, session_id: &str) -> bool {
        self.engine.ledger().clear(session_id).await
    }

    pub async fn active_sessions(&self) -> Vec<String> {
        self.engine
            .ledger()
            .sessions()
            .await
            .into_iter()
            .filter(|s| s != HEALTH_PROBE_SESSION)
            .collect()
    }

    pub async fn service_info(&self) -> ServiceInfo {
        let nodes = self
            .engine
            .workers()
            .roles()
            .into_iter()
            .map(|r| r.tag().to_string())
            .collect();
        ServiceInfo {
            name: self.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            nodes,
            capabilities: vec![
                "intent_classification".into(),
                "worker_routing".into(),
                "retry_and_fallback".into(),
                "multi_worker_aggregation".into(),
                "issue_analysis_pipeline".into(),
                "session_history".into(),
            ],
            active_sessions: self.active_sessions().await.len(),
        }
    }

    /// 用探测请求跑一遍引擎；探测会话随后清除
    pub async fn health_check(&self) -> HealthStatus {
        let probe = Request::new(HEALTH_PROBE_QUERY, HEALTH_PROBE_SESSION);
        let result = self.engine.execute(probe).await;
        self.engine.ledger().clear(HEALTH_PROBE_SESSION).await;

        if result.success {
            HealthStatus {
                status: "healthy".into(),
                detail: format!("probe answered via {:?}", result.route.iter().map(|r| r.tag()).collect::<Vec<_>>()),
            }
        } else {
            HealthStatus {
                status: "unhealthy".into(),
                detail: result
                    .metadata
                    .get("errors")
                    .map(Value::to_string)
                    .unwrap_or_else(|| "probe failed".into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::memory::InMemoryLedger;
    use crate::tools::OfflineSearch;
    use crate::workers::{GeneralWorker, LlmHandle, WebSearchWorker, WorkerRegistry};
    use crate::workflow::EngineSettings;

    fn service() -> ChatService {
        let llm = LlmHandle::new(Arc::new(MockLlmClient), Default::default());
        let registry = WorkerRegistry::new()
            .with(GeneralWorker::new(llm.clone()))
            .with(WebSearchWorker::new(llm, Arc::new(OfflineSearch), 5));
        let engine = ExecutionEngine::new(
            registry,
            Arc::new(InMemoryLedger::default()),
            EngineSettings::default(),
        );
        let app = AppSection {
            max_message_length: 50,
            ..AppSection::default()
        };
        ChatService::new(Arc::new(engine), &app, 20)
    }

    #[tokio::test]
    async fn test_chat_generates_session_and_records_history() {
        let service = service();
        let resp = service.chat(ChatRequest::new("hello")).await.unwrap();
        assert!(!resp.session_id.is_empty());
        assert_eq!(resp.agent_used, "general");
        assert_eq!(resp.metadata["workflow_success"], json!(true));
        assert_eq!(resp.metadata["agent_route"], json!(["general"]));
        assert!(resp.metadata.contains_key("total_latency_ms"));

        let history = service.history(&resp.session_id).await;
        assert_eq!(history.len(), 2);
        assert_eq!(service.active_sessions().await, vec![resp.session_id.clone()]);
        assert!(service.clear_session(&resp.session_id).await);
        assert!(!service.clear_session(&resp.session_id).await);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let service = service();
        assert_eq!(
            service.chat(ChatRequest::new("   ")).await.unwrap_err(),
            ServiceError::EmptyMessage
        );
        assert!(matches!(
            service.chat(ChatRequest::new("x".repeat(51))).await.unwrap_err(),
            ServiceError::MessageTooLong { len: 51, max: 50 }
        ));
        let req = ChatRequest {
            repository: Some("not-a-repo".into()),
            ..ChatRequest::new("analyze")
        };
        assert!(matches!(
            service.chat(req).await.unwrap_err(),
            ServiceError::InvalidRepository(_)
        ));
    }

    #[tokio::test]
    async fn test_search_without_results_still_succeeds() {
        let service = service();
        let resp = service
            .chat(ChatRequest::new("오늘 뉴스").session("s1"))
            .await
            .unwrap();
        assert_eq!(resp.agent_used, "search");
        assert_eq!(resp.response, "No results found for \"오늘 뉴스\".");
    }

    #[tokio::test]
    async fn test_info_and_health() {
        let service = service();
        let health = service.health_check().await;
        assert!(health.is_healthy(), "{}", health.detail);
        let info = service.service_info().await;
        assert_eq!(info.nodes, vec!["search", "general"]);
        assert_eq!(info.active_sessions, 0);
    }
}

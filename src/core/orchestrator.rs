//! 装配：根据配置与环境变量创建 LLM、搜索后端、代码托管客户端，注册 Worker，构建执行引擎
//!
//! 缺少密钥时降级为离线协作者（Mock LLM、空搜索后端）并打 warn 日志，服务仍可启动。

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::llm::{GenerationParams, LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::{InMemoryLedger, SessionLedger};
use crate::service::ChatService;
use crate::tools::{GitHubClient, OfflineSearch, SearchBackend, SourceHost, TavilyClient, ToolError};
use crate::workers::{
    CriticWorker, DocLookupWorker, GeneralWorker, LlmHandle, PlannerWorker, ReporterWorker,
    ResearcherWorker, ResolverWorker, WebSearchWorker, WorkerRegistry,
};
use crate::workflow::{EngineSettings, ExecutionEngine};

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty());

    match (provider.as_str(), api_key) {
        ("mock", _) => {
            tracing::info!("Using Mock LLM");
            Arc::new(MockLlmClient)
        }
        (_, Some(key)) => {
            tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
            Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                Some(&key),
            ))
        }
        (_, None) => {
            tracing::warn!("OPENAI_API_KEY not set, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

/// Tavily（有 TAVILY_API_KEY 时）或离线搜索
pub fn create_search_backend(cfg: &AppConfig) -> Arc<dyn SearchBackend> {
    match TavilyClient::from_env(&cfg.search.search_depth, cfg.search.timeout_secs) {
        Some(Ok(client)) => {
            tracing::info!("Using Tavily web search");
            Arc::new(client)
        }
        Some(Err(e)) => {
            tracing::warn!("Tavily client init failed ({}), using offline search", e);
            Arc::new(OfflineSearch)
        }
        None => {
            tracing::warn!("TAVILY_API_KEY not set, using offline search");
            Arc::new(OfflineSearch)
        }
    }
}

pub fn create_source_host(cfg: &AppConfig) -> Result<Arc<dyn SourceHost>, ToolError> {
    if std::env::var("GITHUB_TOKEN").is_err() {
        tracing::warn!("GITHUB_TOKEN not set, source host requests are anonymous");
    }
    Ok(Arc::new(GitHubClient::from_env(
        cfg.source.api_base.clone(),
        cfg.source.timeout_secs,
    )?))
}

/// 注册全部 Worker（code 角色预留，不注册）
pub fn build_registry(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
    search: Arc<dyn SearchBackend>,
    source: Arc<dyn SourceHost>,
) -> WorkerRegistry {
    let params = GenerationParams {
        temperature: cfg.llm.temperature,
        max_tokens: Some(cfg.llm.max_tokens),
    };
    let handle = LlmHandle::new(llm, params).with_timeout(Duration::from_secs(cfg.llm.timeout_secs));

    WorkerRegistry::new()
        .with(DocLookupWorker::new(handle.clone()))
        .with(WebSearchWorker::new(handle.clone(), search, cfg.search.max_results))
        .with(GeneralWorker::new(handle.clone()))
        .with(PlannerWorker::new(handle.clone(), Arc::clone(&source)))
        .with(ResearcherWorker::new(source, cfg.source.max_files))
        .with(ResolverWorker::new(handle.clone()))
        .with(CriticWorker::new(handle.clone()))
        .with(ReporterWorker::new(handle))
}

/// 由配置构建完整的执行引擎
pub fn build_engine(cfg: &AppConfig) -> Result<ExecutionEngine, ToolError> {
    let llm = create_llm_from_config(cfg);
    let search = create_search_backend(cfg);
    let source = create_source_host(cfg)?;
    let ledger: Arc<dyn SessionLedger> = Arc::new(InMemoryLedger::new(cfg.session.max_entries));
    let registry = build_registry(cfg, llm, search, source);
    Ok(ExecutionEngine::new(
        registry,
        ledger,
        EngineSettings::from(&cfg.routing),
    ))
}

/// 由配置构建 ChatService（CLI 与 Web 入口共用）
pub fn build_service(cfg: &AppConfig) -> Result<ChatService, ToolError> {
    let engine = build_engine(cfg)?;
    Ok(ChatService::new(
        Arc::new(engine),
        &cfg.app,
        cfg.session.max_entries,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkerRole;

    #[test]
    fn test_registry_has_every_role_but_code() {
        let cfg = AppConfig::default();
        let source = create_source_host(&cfg).unwrap();
        let registry = build_registry(&cfg, Arc::new(MockLlmClient), Arc::new(OfflineSearch), source);
        let roles = registry.roles();
        assert_eq!(roles.len(), WorkerRole::ALL.len() - 1);
        assert!(!roles.contains(&WorkerRole::Code));
    }

    #[tokio::test]
    async fn test_mock_provider_engine_answers_offline() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        let engine = build_engine(&cfg).unwrap();
        let result = engine.execute(crate::workflow::Request::new("hello", "s")).await;
        assert!(result.success);
        assert_eq!(result.response, "Echo from Mock: hello");
    }
}

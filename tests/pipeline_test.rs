//! 议题分析流水线集成测试：Planner → Researcher → Resolver → Critic → Reporter

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use hive::llm::{GenerationParams, LlmClient, ScriptedLlmClient};
use hive::memory::InMemoryLedger;
use hive::tools::{CodeMatch, DirEntry, IssueDetail, IssueSummary, RepoRef, SourceHost, ToolError};
use hive::workers::{
    CriticWorker, LlmHandle, PlannerWorker, ReporterWorker, ResearcherWorker, ResolverWorker,
    WorkerRegistry,
};
use hive::workflow::{EngineSettings, ExecutionEngine, ExecutionResult, Request, RunMode, WorkerRole};

const PLAN: &str = r#"Here is the plan:
```json
{"approach": "guard empty config", "steps": ["validate config on load", "add regression test"], "risks": ["breaking defaults"], "affected_files": ["src/config.rs"]}
```"#;

const RESOLUTION: &str = "Add an emptiness check to load_config in src/config.rs that returns a \
descriptive error instead of panicking, and cover the empty file case with a unit test.";

const APPROVE: &str = r#"{"verdict": "approve", "score": 8.5, "summary": "solid", "items": []}"#;
const REVISE_RESEARCH: &str =
    r#"{"verdict": "revise_research", "score": 4, "summary": "missing call sites", "items": ["check callers"]}"#;
const REVISE_RESOLUTION: &str =
    r#"{"verdict": "revise_resolution", "score": 5, "summary": "no rollback", "items": ["add rollback"]}"#;
const REVISE_PLAN: &str =
    r#"{"verdict": "revise_plan", "score": 2, "summary": "wrong component", "items": []}"#;
const REPORT: &str = "# Issue analysis\n\nThe crash comes from an unchecked empty config.";

/// 只读代码托管桩：search_code 前 `empty_searches` 次返回空结果
struct StubHost {
    files: Vec<(&'static str, &'static str)>,
    empty_searches: usize,
    searches: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl StubHost {
    fn new(files: Vec<(&'static str, &'static str)>, empty_searches: usize) -> Self {
        Self {
            files,
            empty_searches,
            searches: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SourceHost for StubHost {
    async fn list_issues(&self, _: &RepoRef, _: &str, _: &[String]) -> Result<Vec<IssueSummary>, ToolError> {
        Ok(vec![IssueSummary {
            number: 7,
            title: "Crash on empty config".into(),
            state: "open".into(),
            labels: vec![],
            html_url: "https://github.com/octo/widgets/issues/7".into(),
        }])
    }

    async fn get_issue(&self, _: &RepoRef, number: u64) -> Result<IssueDetail, ToolError> {
        Err(ToolError::Status {
            status: 404,
            body: format!("issue {number}"),
        })
    }

    async fn read_file(&self, _: &RepoRef, path: &str, _: Option<&str>) -> Result<String, ToolError> {
        self.files
            .iter()
            .find(|(p, _)| *p == path)
            .map(|(_, c)| c.to_string())
            .ok_or_else(|| ToolError::Status {
                status: 404,
                body: path.to_string(),
            })
    }

    async fn list_directory(&self, _: &RepoRef, _: &str, _: Option<&str>) -> Result<Vec<DirEntry>, ToolError> {
        Ok(vec![])
    }

    async fn search_code(&self, _: &RepoRef, query: &str, _: Option<&str>) -> Result<Vec<CodeMatch>, ToolError> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.searches.fetch_add(1, Ordering::SeqCst) < self.empty_searches {
            return Ok(vec![]);
        }
        Ok(vec![CodeMatch {
            name: "config.rs".into(),
            path: "src/config.rs".into(),
            html_url: String::new(),
        }])
    }
}

fn engine(llm: Arc<ScriptedLlmClient>, host: StubHost) -> ExecutionEngine {
    engine_with_host(llm, Arc::new(host))
}

fn engine_with_host(llm: Arc<ScriptedLlmClient>, host: Arc<StubHost>) -> ExecutionEngine {
    let llm: Arc<dyn LlmClient> = llm;
    let handle = LlmHandle::new(llm, GenerationParams::default());
    let source: Arc<dyn SourceHost> = host;
    let registry = WorkerRegistry::new()
        .with(PlannerWorker::new(handle.clone(), Arc::clone(&source)))
        .with(ResearcherWorker::new(source, 5))
        .with(ResolverWorker::new(handle.clone()))
        .with(CriticWorker::new(handle.clone()))
        .with(ReporterWorker::new(handle));
    ExecutionEngine::new(registry, Arc::new(InMemoryLedger::default()), EngineSettings::default())
}

async fn analyze(engine: &ExecutionEngine) -> ExecutionResult {
    let request = Request::new("why does the app crash on an empty config?", "issue").with_mode(
        RunMode::IssueAnalysis {
            repository: "https://github.com/octo/widgets".into(),
        },
    );
    engine.execute(request).await
}

#[tokio::test]
async fn test_full_pipeline_reaches_report() {
    let llm = Arc::new(ScriptedLlmClient::from_texts([PLAN, RESOLUTION, APPROVE, REPORT]));
    let host = StubHost::new(vec![("src/config.rs", "pub fn load_config() {}")], 0);
    let result = analyze(&engine(Arc::clone(&llm), host)).await;

    assert!(result.success, "{:?}", result.trace);
    assert_eq!(
        result.route,
        vec![
            WorkerRole::Planner,
            WorkerRole::Researcher,
            WorkerRole::Resolver,
            WorkerRole::Critic,
            WorkerRole::Reporter,
        ]
    );
    assert_eq!(result.response, REPORT);
    assert_eq!(result.metadata["mode"], json!("issue_analysis"));
    assert_eq!(result.metadata["retry_count"], json!(0));

    // Resolver 看到了 Researcher 读取的文件内容
    let prompts = llm.prompts();
    assert!(prompts[0].contains("#7 Crash on empty config"));
    assert!(prompts[1].contains("pub fn load_config() {}"));
}

#[tokio::test]
async fn test_critic_sends_back_to_research() {
    let llm = Arc::new(ScriptedLlmClient::from_texts([
        PLAN,
        RESOLUTION,
        REVISE_RESEARCH,
        RESOLUTION,
        APPROVE,
        REPORT,
    ]));
    let host = Arc::new(StubHost::new(vec![("src/config.rs", "pub fn load_config() {}")], 0));
    let result = analyze(&engine_with_host(llm, Arc::clone(&host))).await;

    assert!(result.success);
    assert_eq!(
        result.route,
        vec![
            WorkerRole::Planner,
            WorkerRole::Researcher,
            WorkerRole::Resolver,
            WorkerRole::Critic,
            WorkerRole::Researcher,
            WorkerRole::Resolver,
            WorkerRole::Critic,
            WorkerRole::Reporter,
        ]
    );
    assert_eq!(result.metadata["retry_count"], json!(1));
    // 第二轮研究额外查了评审指出的条目
    assert_eq!(
        *host.queries.lock().unwrap(),
        vec!["guard empty config", "guard empty config", "check callers"]
    );
}

#[tokio::test]
async fn test_repeated_resolution_send_backs_still_report() {
    let llm = Arc::new(ScriptedLlmClient::from_texts([
        PLAN,
        RESOLUTION,
        REVISE_RESOLUTION,
        RESOLUTION,
        REVISE_RESOLUTION,
        RESOLUTION,
        REVISE_RESOLUTION,
        RESOLUTION,
        REVISE_RESOLUTION,
        REPORT,
    ]));
    let host = StubHost::new(vec![("src/config.rs", "pub fn load_config() {}")], 0);
    let result = analyze(&engine(llm, host)).await;

    assert!(result.success, "{:?}", result.trace);
    assert_eq!(result.route.len(), 11);
    assert_eq!(result.route.last(), Some(&WorkerRole::Reporter));
    assert_eq!(result.metadata["retry_count"], json!(3));
    assert_eq!(result.response, REPORT);
}

#[tokio::test]
async fn test_repeated_plan_send_backs_still_report() {
    let mut replies = Vec::new();
    for _ in 0..4 {
        replies.extend([PLAN, RESOLUTION, REVISE_PLAN]);
    }
    replies.push(REPORT);
    let llm = Arc::new(ScriptedLlmClient::from_texts(replies));
    let host = StubHost::new(vec![("src/config.rs", "pub fn load_config() {}")], 0);
    let result = analyze(&engine(llm, host)).await;

    assert!(result.success, "{:?}", result.trace);
    assert_eq!(result.route.len(), 17);
    assert_eq!(result.metadata["iterations"], json!(17));
    assert_eq!(result.route.last(), Some(&WorkerRole::Reporter));
    assert!(result.failure_kind().is_none());
}

#[tokio::test]
async fn test_scenario_e_empty_research_is_rerun_not_advanced() {
    let llm = Arc::new(ScriptedLlmClient::from_texts([PLAN, RESOLUTION, APPROVE, REPORT]));
    // 没有可读文件，第一次代码搜索为空
    let host = StubHost::new(vec![], 1);
    let result = analyze(&engine(llm, host)).await;

    assert!(result.success);
    assert_eq!(&result.route[..3], &[WorkerRole::Planner, WorkerRole::Researcher, WorkerRole::Researcher]);
    assert_eq!(result.route[3], WorkerRole::Resolver);
    assert_eq!(result.metadata["retry_count"], json!(1));
}

#[tokio::test]
async fn test_malformed_critic_falls_through_to_reporter() {
    let llm = Arc::new(ScriptedLlmClient::from_texts([
        PLAN,
        RESOLUTION,
        "Looks fine to me, ship it.",
        REPORT,
    ]));
    let host = StubHost::new(vec![("src/config.rs", "pub fn load_config() {}")], 0);
    let result = analyze(&engine(Arc::clone(&llm), host)).await;

    assert!(result.success);
    assert_eq!(result.route.last(), Some(&WorkerRole::Reporter));
    assert_eq!(result.metadata["retry_count"], json!(0));
    assert_eq!(result.metadata["final_state"], json!("DONE"));
    // Reporter 收到了分析过程中的错误
    let prompts = llm.prompts();
    assert!(prompts[3].contains("Malformed output from critic"));
}

#[tokio::test]
async fn test_research_that_never_finds_anything_escalates() {
    let llm = Arc::new(ScriptedLlmClient::from_texts([PLAN]));
    let host = StubHost::new(vec![], usize::MAX);
    let result = analyze(&engine(llm, host)).await;

    assert!(!result.success);
    assert_eq!(result.metadata["final_state"], json!("FAILED"));
    assert_eq!(result.metadata["needs_human_review"], json!(true));
    assert_eq!(result.metadata["retry_count"], json!(3));
    assert!(!result.route.contains(&WorkerRole::Resolver));
}

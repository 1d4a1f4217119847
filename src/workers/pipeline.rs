//! 议题分析流水线：Planner → Researcher → Resolver → Critic → Reporter
//!
//! 只读分析：各阶段只调用 SourceHost 的读取接口，产出计划、调研发现、方案、评审与报告。
//! Planner / Critic 要求 LLM 返回 JSON，解析失败即 MalformedOutput。

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::{RunState, WorkerError};
use crate::tools::{RepoRef, SourceHost};
use crate::workers::parse::parse_json_output;
use crate::workers::{
    LlmHandle, ResearchFinding, ResolutionPlan, ReviewFeedback, ReviewVerdict, Worker, WorkerOutput,
};
use crate::workflow::{verdict_target, Request, RunMode, WorkerRole};

const PLANNER_PROMPT: &str = "You plan the resolution of software issues. Reply with one JSON object: \
{\"approach\": string, \"steps\": [string], \"risks\": [string], \"affected_files\": [string]}.";

const RESOLVER_PROMPT: &str = "You draft a concrete resolution proposal for a software issue from a plan \
and research findings. Describe the code changes in detail. Do not claim to have applied them.";

const CRITIC_PROMPT: &str = "You review a proposed issue resolution. Reply with one JSON object: \
{\"verdict\": \"approve\" | \"revise_plan\" | \"revise_research\" | \"revise_resolution\", \
\"score\": number 0-10, \"summary\": string, \"items\": [string]}.";

const REPORTER_PROMPT: &str = "You write the final issue analysis report in Markdown: summary, plan, \
findings, proposed resolution and review notes.";

/// 每个文件摘录的最大字符数
const EXCERPT_CHARS: usize = 1200;
const MAX_CODE_MATCHES: usize = 5;
const MAX_LISTED_ISSUES: usize = 10;
const MAX_FOLLOWUPS: usize = 3;

/// 从运行模式取出仓库引用
fn repository(state: &RunState) -> Result<RepoRef, WorkerError> {
    match &state.mode {
        RunMode::IssueAnalysis { repository } => {
            RepoRef::parse(repository).map_err(|e| WorkerError::SourceHost(e.to_string()))
        }
        RunMode::Chat => Err(WorkerError::SourceHost(
            "issue analysis requires a repository".to_string(),
        )),
    }
}

/// 若最新评审把流水线打回到 role，返回评审意见（供重做时参考）
fn feedback_for(state: &RunState, role: WorkerRole) -> Option<String> {
    let review = state.latest_review()?;
    (review.verdict != ReviewVerdict::Approve && verdict_target(review.verdict) == role)
        .then(|| WorkerOutput::Review(review.clone()).render())
}

/// Critic 打回 Researcher 时要求补查的条目；没有条目时用评审摘要
fn research_followups(state: &RunState) -> Vec<String> {
    let Some(review) = state.latest_review() else {
        return Vec::new();
    };
    if verdict_target(review.verdict) != WorkerRole::Researcher {
        return Vec::new();
    }
    let items: Vec<String> = review
        .items
        .iter()
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .take(MAX_FOLLOWUPS)
        .collect();
    if items.is_empty() && !review.summary.trim().is_empty() {
        return vec![review.summary.trim().to_string()];
    }
    items
}

/// 形如 src/config.rs 的条目按文件读取，其余按代码搜索
fn looks_like_path(item: &str) -> bool {
    !item.contains(char::is_whitespace) && (item.contains('/') || item.contains('.'))
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("\n...[truncated]");
    }
    out
}

fn section(title: &str, body: &str) -> String {
    format!("## {title}\n{}\n\n", body.trim())
}

/// 分析上下文：计划 / 调研发现 / 方案
fn analysis_context(state: &RunState) -> String {
    let mut ctx = String::new();
    if let Some(plan) = &state.plan {
        ctx.push_str(&section("Plan", &WorkerOutput::Plan(plan.clone()).render()));
    }
    if !state.findings.is_empty() {
        ctx.push_str(&section(
            "Findings",
            &WorkerOutput::Findings(state.findings.clone()).render(),
        ));
    }
    if let Some(resolution) = &state.resolution {
        ctx.push_str(&section("Proposed resolution", resolution));
    }
    ctx
}

/// Planner：结合仓库的 open 议题制定解决计划
pub struct PlannerWorker {
    llm: LlmHandle,
    source: Arc<dyn SourceHost>,
}

impl PlannerWorker {
    pub fn new(llm: LlmHandle, source: Arc<dyn SourceHost>) -> Self {
        Self { llm, source }
    }
}

#[async_trait]
impl Worker for PlannerWorker {
    fn role(&self) -> WorkerRole {
        WorkerRole::Planner
    }

    async fn process(&self, request: &Request, state: &RunState) -> Result<WorkerOutput, WorkerError> {
        let repo = repository(state)?;
        let issues = self
            .source
            .list_issues(&repo, "open", &[])
            .await
            .map_err(|e| WorkerError::SourceHost(e.to_string()))?;

        let mut prompt = format!("Repository: {repo}\nRequest: {}\n\nOpen issues:\n", request.query);
        if issues.is_empty() {
            prompt.push_str("(none)\n");
        }
        for issue in issues.iter().take(MAX_LISTED_ISSUES) {
            let labels: Vec<&str> = issue.labels.iter().map(|l| l.name.as_str()).collect();
            let _ = writeln!(prompt, "#{} {} [{}]", issue.number, issue.title, labels.join(", "));
        }
        if let Some(feedback) = feedback_for(state, WorkerRole::Planner) {
            prompt.push_str(&format!("\nReviewer feedback on the previous plan:\n{feedback}\n"));
        }

        let reply = self.llm.ask(PLANNER_PROMPT, &[], &prompt).await?;
        let plan: ResolutionPlan = parse_json_output(WorkerRole::Planner, &reply)?;
        Ok(WorkerOutput::Plan(plan))
    }
}

/// Researcher：读取计划涉及的文件，并按计划思路搜索代码；单个读取失败只记日志
pub struct ResearcherWorker {
    source: Arc<dyn SourceHost>,
    max_files: usize,
}

impl ResearcherWorker {
    pub fn new(source: Arc<dyn SourceHost>, max_files: usize) -> Self {
        Self { source, max_files }
    }
}

#[async_trait]
impl Worker for ResearcherWorker {
    fn role(&self) -> WorkerRole {
        WorkerRole::Researcher
    }

    async fn process(&self, request: &Request, state: &RunState) -> Result<WorkerOutput, WorkerError> {
        let repo = repository(state)?;
        let mut findings = Vec::new();

        let (files, search_query) = match &state.plan {
            Some(plan) => (plan.affected_files.as_slice(), plan.approach.as_str()),
            None => (&[][..], request.query.as_str()),
        };

        for path in files.iter().take(self.max_files) {
            match self.source.read_file(&repo, path, None).await {
                Ok(content) => findings.push(ResearchFinding {
                    topic: format!("File {path}"),
                    detail: excerpt(&content, EXCERPT_CHARS),
                    source: Some(path.clone()),
                }),
                Err(e) => tracing::warn!(repo = %repo, path = %path, error = %e, "failed to read file"),
            }
        }

        if !search_query.trim().is_empty() {
            match self.source.search_code(&repo, search_query, None).await {
                Ok(matches) => {
                    findings.extend(matches.into_iter().take(MAX_CODE_MATCHES).map(|m| {
                        ResearchFinding {
                            topic: format!("Code match {}", m.name),
                            detail: m.path,
                            source: Some(m.html_url).filter(|u| !u.is_empty()),
                        }
                    }))
                }
                Err(e) => tracing::warn!(repo = %repo, error = %e, "code search failed"),
            }
        }

        for item in research_followups(state) {
            if looks_like_path(&item) {
                if files.iter().take(self.max_files).any(|f| *f == item) {
                    continue;
                }
                match self.source.read_file(&repo, &item, None).await {
                    Ok(content) => findings.push(ResearchFinding {
                        topic: format!("Follow-up file {item}"),
                        detail: excerpt(&content, EXCERPT_CHARS),
                        source: Some(item.clone()),
                    }),
                    Err(e) => tracing::warn!(repo = %repo, path = %item, error = %e, "failed to read follow-up file"),
                }
                continue;
            }
            match self.source.search_code(&repo, &item, None).await {
                Ok(matches) => findings.extend(matches.into_iter().take(MAX_CODE_MATCHES).map(|m| {
                    ResearchFinding {
                        topic: format!("Follow-up \"{item}\": {}", m.name),
                        detail: m.path,
                        source: Some(m.html_url).filter(|u| !u.is_empty()),
                    }
                })),
                Err(e) => tracing::warn!(repo = %repo, query = %item, error = %e, "follow-up code search failed"),
            }
        }

        tracing::debug!(repo = %repo, findings = findings.len(), "research completed");
        Ok(WorkerOutput::Findings(findings))
    }
}

/// Resolver：基于计划与调研发现起草方案（只给出方案，不修改仓库）
pub struct ResolverWorker {
    llm: LlmHandle,
}

impl ResolverWorker {
    pub fn new(llm: LlmHandle) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Worker for ResolverWorker {
    fn role(&self) -> WorkerRole {
        WorkerRole::Resolver
    }

    async fn process(&self, request: &Request, state: &RunState) -> Result<WorkerOutput, WorkerError> {
        let mut prompt = format!("Request: {}\n\n{}", request.query, analysis_context(state));
        if let Some(feedback) = feedback_for(state, WorkerRole::Resolver) {
            prompt.push_str(&section("Reviewer feedback on the previous resolution", &feedback));
        }
        let resolution = self.llm.ask(RESOLVER_PROMPT, &[], &prompt).await?;
        Ok(WorkerOutput::Resolution(resolution))
    }
}

/// Critic：评审方案并给出四路裁决
pub struct CriticWorker {
    llm: LlmHandle,
}

impl CriticWorker {
    pub fn new(llm: LlmHandle) -> Self {
        Self { llm }
    }
}

#[derive(Deserialize)]
struct CriticReply {
    verdict: ReviewVerdict,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    items: Vec<String>,
}

#[async_trait]
impl Worker for CriticWorker {
    fn role(&self) -> WorkerRole {
        WorkerRole::Critic
    }

    async fn process(&self, request: &Request, state: &RunState) -> Result<WorkerOutput, WorkerError> {
        let prompt = format!("Request: {}\n\n{}", request.query, analysis_context(state));
        let reply = self.llm.ask(CRITIC_PROMPT, &[], &prompt).await?;
        let parsed: CriticReply = parse_json_output(WorkerRole::Critic, &reply)?;
        Ok(WorkerOutput::Review(ReviewFeedback {
            verdict: parsed.verdict,
            score: parsed.score.clamp(0.0, 10.0),
            summary: parsed.summary,
            items: parsed.items,
        }))
    }
}

/// Reporter：汇总所有产物，输出 Markdown 报告
pub struct ReporterWorker {
    llm: LlmHandle,
}

impl ReporterWorker {
    pub fn new(llm: LlmHandle) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Worker for ReporterWorker {
    fn role(&self) -> WorkerRole {
        WorkerRole::Reporter
    }

    async fn process(&self, request: &Request, state: &RunState) -> Result<WorkerOutput, WorkerError> {
        let mut prompt = format!("Request: {}\n\n{}", request.query, analysis_context(state));
        if let Some(review) = state.latest_review() {
            prompt.push_str(&section("Review", &WorkerOutput::Review(review.clone()).render()));
        }
        if !state.errors.is_empty() {
            prompt.push_str(&section("Issues during analysis", &state.errors.join("\n")));
        }
        let report = self.llm.ask(REPORTER_PROMPT, &[], &prompt).await?;
        if report.trim().is_empty() {
            return Err(WorkerError::MalformedOutput {
                role: WorkerRole::Reporter,
                detail: "empty report".to_string(),
            });
        }
        Ok(WorkerOutput::Report(report))
    }
}

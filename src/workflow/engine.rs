//! 执行引擎
//!
//! 驱动 Supervisor 状态机直到终态：分类 → 路由 → 执行 Worker → 决策 → （聚合）→ DONE / FAILED。
//! 每个请求一个顺序运行；Worker 调用可以挂起，不会阻塞其他请求。
//! - 迭代上限：统计 Worker 执行次数，与重试预算相互独立；流水线模式下自动放宽到预算允许的最长路径
//! - 请求级截止时间：整个请求共用一个 deadline，每次 Worker 调用都受其约束
//! - Worker panic 被捕获并按普通失败处理
//! - 只在终态向会话账本追加一次（用户问题 + 最终回复）

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::RoutingSection;
use crate::core::{FailureKind, RunPhase, RunState, WorkerError};
use crate::memory::{LedgerRole, SessionLedger};
use crate::workers::{WorkerOutput, WorkerRegistry};
use crate::workflow::{
    aggregate, ExecutionResult, IntentClassifier, Request, RouteAction, RoutingDecision, RunMode,
    Supervisor, WorkerRole, PIPELINE,
};

/// 引擎参数（对应配置中的 [routing] 段）
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_retries: u32,
    pub max_iterations: u32,
    pub request_timeout: Duration,
    pub multi_agent: bool,
    pub apology: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&RoutingSection::default())
    }
}

impl From<&RoutingSection> for EngineSettings {
    fn from(routing: &RoutingSection) -> Self {
        Self {
            max_retries: routing.max_retries,
            max_iterations: routing.max_iterations,
            request_timeout: routing.request_timeout(),
            multi_agent: routing.multi_agent,
            apology: routing.apology.clone(),
        }
    }
}

/// 执行引擎：持有分类器、Supervisor、Worker 注册表与会话账本
pub struct ExecutionEngine {
    classifier: IntentClassifier,
    supervisor: Supervisor,
    workers: WorkerRegistry,
    ledger: Arc<dyn SessionLedger>,
    settings: EngineSettings,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl ExecutionEngine {
    pub fn new(workers: WorkerRegistry, ledger: Arc<dyn SessionLedger>, settings: EngineSettings) -> Self {
        Self {
            classifier: IntentClassifier::new(settings.multi_agent),
            supervisor: Supervisor::new(settings.max_retries),
            workers,
            ledger,
            settings,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn SessionLedger> {
        &self.ledger
    }

    pub fn workers(&self) -> &WorkerRegistry {
        &self.workers
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// 执行单个请求直到终态；永不 panic、永不返回 Err
    pub async fn execute(&self, request: Request) -> ExecutionResult {
        self.execute_with_cancel(request, CancellationToken::new()).await
    }

    /// 同 execute；cancel 被触发时中止进行中的 Worker 并进入 FAILED
    pub async fn execute_with_cancel(&self, request: Request, cancel: CancellationToken) -> ExecutionResult {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.settings.request_timeout;
        let mut state = self.initial_state(&request);
        let ceiling = self.iteration_ceiling(&request.mode);

        while !state.phase.is_terminal() {
            match state.phase {
                RunPhase::Aggregating => self.run_aggregation(&mut state),
                phase => match phase.pending_role() {
                    Some(_) if state.iterations >= ceiling => {
                        state.set_meta("failure_kind", FailureKind::Runaway.as_str());
                        let decision = RoutingDecision::new(
                            RouteAction::Escalate,
                            None,
                            format!("iteration ceiling reached ({ceiling})"),
                        );
                        self.supervisor.apply(&mut state, &decision);
                    }
                    Some(role) => self.step(&request, &mut state, role, deadline, &cancel).await,
                    None => {
                        // Executing 只在 step 内部短暂存在
                        let decision = RoutingDecision::new(
                            RouteAction::Escalate,
                            None,
                            format!("unexpected phase {phase}"),
                        );
                        self.supervisor.apply(&mut state, &decision);
                    }
                },
            }
        }

        let result = self.finish(state, started);
        self.ledger.append(&request.session_id, LedgerRole::User, &request.query).await;
        self.ledger
            .append(&request.session_id, LedgerRole::Assistant, &result.response)
            .await;
        result
    }

    fn initial_state(&self, request: &Request) -> RunState {
        match &request.mode {
            RunMode::Chat => {
                let c = self.classifier.classify(&request.query);
                let mut state = RunState::new(request, c.primary_role);
                state.needs_multi_agent = c.needs_multi_agent;
                if c.needs_multi_agent {
                    state.pending = c.candidate_roles.iter().skip(1).copied().collect();
                }
                state.set_meta("classified_role", c.primary_role.tag());
                state.set_meta("confidence", c.confidence);
                state.set_meta(
                    "candidate_roles",
                    c.candidate_roles.iter().map(|r| r.tag()).collect::<Vec<_>>(),
                );
                state.log(format!(
                    "{} intent classified as {} (confidence {:.2}{})",
                    c.primary_role.icon(),
                    c.primary_role,
                    c.confidence,
                    if c.needs_multi_agent { ", multi-agent" } else { "" }
                ));
                tracing::info!(
                    session_id = %request.session_id,
                    role = %c.primary_role,
                    confidence = c.confidence,
                    multi_agent = c.needs_multi_agent,
                    "intent classified"
                );
                state
            }
            RunMode::IssueAnalysis { repository } => {
                let mut state = RunState::new(request, WorkerRole::Planner);
                state.set_meta("repository", repository.clone());
                state.log(format!("issue analysis for {repository}: starting at planner"));
                state
            }
        }
    }

    /// 迭代上限。流水线模式下不低于重试预算允许的最长路径：
    /// 完整走一遍，加上每次打回最多重跑 Planner 到 Critic 四个阶段
    pub fn iteration_ceiling(&self, mode: &RunMode) -> u32 {
        match mode {
            RunMode::Chat => self.settings.max_iterations,
            RunMode::IssueAnalysis { .. } => {
                let stages = PIPELINE.len() as u32;
                let longest = stages.saturating_add((stages - 1).saturating_mul(self.settings.max_retries));
                self.settings.max_iterations.max(longest)
            }
        }
    }

    /// 角色没有注册 Worker 时换成它的回退角色，并记录替换
    fn resolve_role(&self, state: &mut RunState, role: WorkerRole) -> WorkerRole {
        if self.workers.contains(role) {
            return role;
        }
        match role.fallback().filter(|fb| self.workers.contains(*fb)) {
            Some(substitute) => {
                state.log(format!("{role} has no worker; substituting {substitute}"));
                substitute
            }
            None => role,
        }
    }

    async fn step(
        &self,
        request: &Request,
        state: &mut RunState,
        role: WorkerRole,
        deadline: tokio::time::Instant,
        cancel: &CancellationToken,
    ) {
        let role = self.resolve_role(state, role);
        state.phase = RunPhase::Executing(role);
        state.current_role = Some(role);
        state.route.push(role);
        state.iterations += 1;

        let started = Instant::now();
        let outcome = self.run_worker(role, request, state, deadline, cancel).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        state.set_meta(format!("{}_latency_ms", role.tag()), latency_ms);

        let decision = match outcome {
            Ok(output) => {
                tracing::info!(
                    session_id = %state.session_id,
                    role = %role,
                    latency_ms,
                    output = output.kind(),
                    "worker completed"
                );
                state.log(format!("{} {role} completed in {latency_ms} ms", role.icon()));
                state.record_output(role, output);
                self.supervisor.decide(state, role, None)
            }
            Err(err) => {
                tracing::warn!(
                    session_id = %state.session_id,
                    role = %role,
                    retry_count = state.retry_count,
                    error = %err,
                    "worker failed"
                );
                state.record_error(role, err.clone());
                self.supervisor.decide(state, role, Some(&err))
            }
        };

        match decision.action {
            RouteAction::Retry => tracing::warn!(
                session_id = %state.session_id,
                role = %role,
                next = ?decision.next_role,
                retry_count = state.retry_count + 1,
                "{}", decision.reasoning
            ),
            _ => tracing::info!(
                session_id = %state.session_id,
                role = %role,
                action = ?decision.action,
                next = ?decision.next_role,
                "{}", decision.reasoning
            ),
        }
        self.supervisor.apply(state, &decision);
    }

    async fn run_worker(
        &self,
        role: WorkerRole,
        request: &Request,
        state: &RunState,
        deadline: tokio::time::Instant,
        cancel: &CancellationToken,
    ) -> Result<WorkerOutput, WorkerError> {
        let Some(worker) = self.workers.get(role) else {
            return Err(WorkerError::Unavailable(role));
        };

        let fut = AssertUnwindSafe(worker.process(request, state)).catch_unwind();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WorkerError::Cancelled),
            res = tokio::time::timeout_at(deadline, fut) => match res {
                Err(_) => Err(WorkerError::DeadlineExceeded),
                Ok(Err(payload)) => Err(WorkerError::Panicked(panic_message(payload.as_ref()))),
                Ok(Ok(result)) => result,
            },
        }
    }

    fn run_aggregation(&self, state: &mut RunState) {
        let decision = match aggregate(&state.outputs) {
            Ok(text) => {
                state.response = text;
                RoutingDecision::new(
                    RouteAction::Finish,
                    None,
                    format!("aggregated outputs from {}", state.outputs.roles().iter().map(|r| r.tag()).collect::<Vec<_>>().join(", ")),
                )
            }
            Err(e) => {
                state.errors.push(e.to_string());
                RoutingDecision::new(RouteAction::Escalate, None, e.to_string())
            }
        };
        self.supervisor.apply(state, &decision);
    }

    fn finish(&self, mut state: RunState, started: Instant) -> ExecutionResult {
        let success = state.phase == RunPhase::Done;
        let total_ms = started.elapsed().as_millis() as u64;

        if !success && !state.metadata.contains_key("failure_kind") {
            let kind = state
                .last_error
                .as_ref()
                .map(WorkerError::failure_kind)
                .unwrap_or(FailureKind::Exhausted);
            state.set_meta("failure_kind", kind.as_str());
        }
        state.set_meta("final_state", state.phase.to_string());
        state.set_meta("mode", state.mode.as_str());
        state.set_meta("retry_count", state.retry_count);
        state.set_meta("iterations", state.iterations);
        state.set_meta("needs_human_review", state.needs_human_review);
        state.set_meta("execution_ms", total_ms);
        state.set_meta(
            "errors",
            Value::Array(state.errors.iter().cloned().map(Value::String).collect()),
        );
        state.log(format!("final state: {}", state.phase));

        let response = if success {
            state.response.clone()
        } else {
            tracing::error!(
                session_id = %state.session_id,
                route = ?state.route.iter().map(|r| r.tag()).collect::<Vec<_>>(),
                retry_count = state.retry_count,
                failure_kind = ?state.metadata.get("failure_kind"),
                "request failed"
            );
            self.settings.apology.clone()
        };

        ExecutionResult {
            response,
            trace: state.reasoning,
            route: state.route,
            success,
            metadata: state.metadata,
        }
    }
}

//! Supervisor：状态机迁移
//!
//! 每次 Worker 执行后，`decide` 基于 RunState 与执行结果给出 RoutingDecision（纯函数），
//! `apply` 再把决策落到 RunState 上。对话模式按 重试/回退 → 聚合 → 完成 → 下一个候选 的顺序判定；
//! 议题分析模式在每次前进前额外检查该阶段的质量门，Critic 的裁决决定打回哪个上游阶段。

use crate::core::{RecoveryAction, RecoveryEngine, RunPhase, RunState, WorkerError};
use crate::workers::ReviewVerdict;
use crate::workflow::{RouteAction, RoutingDecision, WorkerRole, PIPELINE};

/// 质量门：(阶段, 谓词, 说明)。谓词必须成立才能离开该阶段
pub type QualityGate = (WorkerRole, fn(&RunState) -> bool, &'static str);

/// Resolver 方案的最小长度
pub const MIN_RESOLUTION_CHARS: usize = 100;

pub const QUALITY_GATES: &[QualityGate] = &[
    (WorkerRole::Planner, gate_plan, "resolution plan with at least one step"),
    (WorkerRole::Researcher, gate_findings, "at least one research finding"),
    (WorkerRole::Resolver, gate_resolution, "resolution of at least 100 characters"),
    (WorkerRole::Critic, gate_review, "at least one review feedback entry"),
    (WorkerRole::Reporter, gate_report, "non-empty report"),
];

fn gate_plan(state: &RunState) -> bool {
    state.plan.as_ref().is_some_and(|p| !p.steps.is_empty())
}

fn gate_findings(state: &RunState) -> bool {
    !state.findings.is_empty()
}

fn gate_resolution(state: &RunState) -> bool {
    state
        .resolution
        .as_ref()
        .is_some_and(|r| r.trim().chars().count() >= MIN_RESOLUTION_CHARS)
}

fn gate_review(state: &RunState) -> bool {
    !state.reviews.is_empty()
}

fn gate_report(state: &RunState) -> bool {
    state.report.as_ref().is_some_and(|r| !r.trim().is_empty())
}

/// 查找某阶段的质量门
pub fn quality_gate(role: WorkerRole) -> Option<&'static QualityGate> {
    QUALITY_GATES.iter().find(|(r, _, _)| *r == role)
}

/// 流水线中 role 的下一阶段
pub fn next_stage(role: WorkerRole) -> Option<WorkerRole> {
    let idx = PIPELINE.iter().position(|r| *r == role)?;
    PIPELINE.get(idx + 1).copied()
}

/// Critic 裁决 → 目标阶段
pub fn verdict_target(verdict: ReviewVerdict) -> WorkerRole {
    match verdict {
        ReviewVerdict::Approve => WorkerRole::Reporter,
        ReviewVerdict::RevisePlan => WorkerRole::Planner,
        ReviewVerdict::ReviseResearch => WorkerRole::Researcher,
        ReviewVerdict::ReviseResolution => WorkerRole::Resolver,
    }
}

/// 路由器 / 监督者
#[derive(Debug, Clone)]
pub struct Supervisor {
    max_retries: u32,
    recovery: RecoveryEngine,
}

impl Supervisor {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            recovery: RecoveryEngine::new(),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn has_budget(&self, state: &RunState) -> bool {
        state.retry_count < self.max_retries
    }

    /// 根据刚执行完的 role 及其结果决定下一步
    pub fn decide(&self, state: &RunState, role: WorkerRole, error: Option<&WorkerError>) -> RoutingDecision {
        match error {
            Some(err) => self.decide_on_error(state, role, err),
            None if state.mode.is_pipeline() => self.decide_pipeline(state, role),
            None => self.decide_chat(state, role),
        }
    }

    fn decide_on_error(&self, state: &RunState, role: WorkerRole, err: &WorkerError) -> RoutingDecision {
        match self.recovery.handle(err, role, &state.mode) {
            RecoveryAction::SafeDefault(target) => RoutingDecision::new(
                RouteAction::Continue,
                Some(target),
                format!("{role} produced malformed output; continuing with safe default {target}"),
            ),
            RecoveryAction::Abort => RoutingDecision::new(
                RouteAction::Escalate,
                None,
                format!("{role} failed and cannot be recovered: {err}"),
            ),
            _ if !self.has_budget(state) => RoutingDecision::new(
                RouteAction::Escalate,
                None,
                format!(
                    "{role} failed and retry budget is exhausted ({}/{}): {err}",
                    state.retry_count, self.max_retries
                ),
            ),
            RecoveryAction::Fallback(target) => RoutingDecision::new(
                RouteAction::Retry,
                Some(target),
                format!("{role} failed ({err}); falling back to {target}"),
            ),
            RecoveryAction::Retry => RoutingDecision::new(
                RouteAction::Retry,
                Some(role),
                format!("{role} failed ({err}); retrying"),
            ),
        }
    }

    fn decide_chat(&self, state: &RunState, role: WorkerRole) -> RoutingDecision {
        if state.needs_multi_agent && state.pending.is_empty() && state.outputs.len() > 1 {
            return RoutingDecision::new(
                RouteAction::Aggregate,
                None,
                format!("{} workers contributed; aggregating", state.outputs.len()),
            );
        }
        match state.pending.front() {
            None => RoutingDecision::new(RouteAction::Finish, None, format!("{role} completed")),
            Some(next) => RoutingDecision::new(
                RouteAction::Continue,
                Some(*next),
                format!("{role} completed; routing to next candidate {next}"),
            ),
        }
    }

    fn decide_pipeline(&self, state: &RunState, role: WorkerRole) -> RoutingDecision {
        if let Some((_, gate, requirement)) = quality_gate(role) {
            if !gate(state) {
                if !self.has_budget(state) {
                    return RoutingDecision::new(
                        RouteAction::Escalate,
                        None,
                        format!("{role} quality gate failed ({requirement}) and retry budget is exhausted"),
                    );
                }
                return RoutingDecision::new(
                    RouteAction::Retry,
                    Some(role),
                    format!("{role} quality gate failed: requires {requirement}"),
                );
            }
        }

        match role {
            WorkerRole::Reporter => {
                RoutingDecision::new(RouteAction::Finish, None, "report completed".to_string())
            }
            WorkerRole::Critic => {
                let Some(review) = state.latest_review() else {
                    return RoutingDecision::new(
                        RouteAction::Continue,
                        Some(WorkerRole::Reporter),
                        "no review available; continuing to reporter",
                    );
                };
                let target = verdict_target(review.verdict);
                if target == WorkerRole::Reporter {
                    RoutingDecision::new(
                        RouteAction::Continue,
                        Some(target),
                        format!("critic approved (score {:.1}); continuing to reporter", review.score),
                    )
                } else if self.has_budget(state) {
                    RoutingDecision::new(
                        RouteAction::Retry,
                        Some(target),
                        format!("critic verdict {}; sending back to {target}", review.verdict.as_str()),
                    )
                } else {
                    RoutingDecision::new(
                        RouteAction::Continue,
                        Some(WorkerRole::Reporter),
                        format!(
                            "critic verdict {} but retry budget is exhausted; continuing to reporter",
                            review.verdict.as_str()
                        ),
                    )
                }
            }
            _ => match next_stage(role) {
                Some(next) => RoutingDecision::new(
                    RouteAction::Continue,
                    Some(next),
                    format!("{role} passed quality gate; advancing to {next}"),
                ),
                None => RoutingDecision::new(RouteAction::Finish, None, format!("{role} completed")),
            },
        }
    }

    /// 把决策落到状态上
    pub fn apply(&self, state: &mut RunState, decision: &RoutingDecision) {
        state.log(decision.reasoning.clone());
        let current = state.current_role;

        match (decision.action, decision.next_role) {
            (RouteAction::Continue, Some(next)) => {
                if state.pending.front() == Some(&next) {
                    state.pending.pop_front();
                }
                state.phase = RunPhase::Routing(next);
            }
            (RouteAction::Retry, Some(next)) => {
                if state.retry_count >= self.max_retries {
                    // retry_count 不得超过 max_retries
                    self.fail(state);
                    return;
                }
                state.retry_count += 1;
                state.phase = if current == Some(next) {
                    RunPhase::Retrying {
                        role: next,
                        attempt: state.retry_count,
                    }
                } else if current.and_then(|r| r.fallback()) == Some(next) {
                    RunPhase::Fallback(next)
                } else {
                    RunPhase::Routing(next)
                };
            }
            (RouteAction::Aggregate, _) => state.phase = RunPhase::Aggregating,
            (RouteAction::Finish, _) => {
                state.phase = RunPhase::Done;
                state.complete = true;
            }
            (RouteAction::Escalate, _) | (RouteAction::Continue | RouteAction::Retry, None) => {
                self.fail(state)
            }
        }
    }

    fn fail(&self, state: &mut RunState) {
        state.phase = RunPhase::Failed;
        state.complete = true;
        state.needs_human_review = true;
    }
}

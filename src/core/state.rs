//! 运行状态：单次请求在状态机中流转的可变记录
//!
//! RunState 由 ExecutionEngine 为每个请求新建，只被 Supervisor / ExecutionEngine 修改，请求结束即丢弃。

use std::collections::VecDeque;
use std::fmt;

use serde_json::{Map, Value};

use crate::core::WorkerError;
use crate::workers::{ResearchFinding, ResolutionPlan, ReviewFeedback, WorkerOutput};
use crate::workflow::{Request, RoleOutputs, RunMode, WorkerRole};

/// 状态机阶段；Done / Failed 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Routing(WorkerRole),
    Executing(WorkerRole),
    Retrying { role: WorkerRole, attempt: u32 },
    Fallback(WorkerRole),
    Aggregating,
    Done,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }

    /// 下一个待执行的角色（Routing / Retrying / Fallback）
    pub fn pending_role(&self) -> Option<WorkerRole> {
        match self {
            RunPhase::Routing(role) | RunPhase::Fallback(role) => Some(*role),
            RunPhase::Retrying { role, .. } => Some(*role),
            _ => None,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Routing(role) => write!(f, "ROUTING({role})"),
            RunPhase::Executing(role) => write!(f, "EXECUTING({role})"),
            RunPhase::Retrying { role, attempt } => write!(f, "RETRYING({role}, {attempt})"),
            RunPhase::Fallback(role) => write!(f, "FALLBACK({role})"),
            RunPhase::Aggregating => f.write_str("AGGREGATING"),
            RunPhase::Done => f.write_str("DONE"),
            RunPhase::Failed => f.write_str("FAILED"),
        }
    }
}

/// 单次请求的运行状态
#[derive(Debug, Clone)]
pub struct RunState {
    pub session_id: String,
    pub mode: RunMode,
    pub phase: RunPhase,
    pub current_role: Option<WorkerRole>,
    /// 已执行的角色（按执行顺序，含重试）
    pub route: Vec<WorkerRole>,
    pub response: String,
    pub outputs: RoleOutputs,
    /// 人类可读的推理轨迹
    pub reasoning: Vec<String>,
    pub errors: Vec<String>,
    pub last_error: Option<WorkerError>,
    pub retry_count: u32,
    pub needs_multi_agent: bool,
    /// 多 Worker 模式下尚未执行的候选角色
    pub pending: VecDeque<WorkerRole>,
    pub complete: bool,
    pub needs_human_review: bool,
    /// 已执行的 Worker 次数（迭代上限计数）
    pub iterations: u32,
    pub metadata: Map<String, Value>,

    // 议题分析流水线的类型化产物（质量门在这些字段上判断）
    pub plan: Option<ResolutionPlan>,
    pub findings: Vec<ResearchFinding>,
    pub resolution: Option<String>,
    pub reviews: Vec<ReviewFeedback>,
    pub report: Option<String>,
}

impl RunState {
    pub fn new(request: &Request, initial_role: WorkerRole) -> Self {
        Self {
            session_id: request.session_id.clone(),
            mode: request.mode.clone(),
            phase: RunPhase::Routing(initial_role),
            current_role: None,
            route: Vec::new(),
            response: String::new(),
            outputs: RoleOutputs::new(),
            reasoning: Vec::new(),
            errors: Vec::new(),
            last_error: None,
            retry_count: 0,
            needs_multi_agent: false,
            pending: VecDeque::new(),
            complete: false,
            needs_human_review: false,
            iterations: 0,
            metadata: Map::new(),
            plan: None,
            findings: Vec::new(),
            resolution: None,
            reviews: Vec::new(),
            report: None,
        }
    }

    pub fn log(&mut self, entry: impl Into<String>) {
        self.reasoning.push(entry.into());
    }

    /// 记录成功输出：文本写入 outputs / response，类型化产物写入对应字段
    pub fn record_output(&mut self, role: WorkerRole, output: WorkerOutput) {
        let text = output.render();
        self.outputs.upsert(role, text.clone());
        self.response = text;
        self.last_error = None;
        match output {
            WorkerOutput::Answer(_) => {}
            WorkerOutput::Plan(plan) => self.plan = Some(plan),
            // 重新调研时以最新一轮结果为准
            WorkerOutput::Findings(findings) => self.findings = findings,
            WorkerOutput::Resolution(text) => self.resolution = Some(text),
            WorkerOutput::Review(review) => self.reviews.push(review),
            WorkerOutput::Report(text) => self.report = Some(text),
        }
    }

    pub fn record_error(&mut self, role: WorkerRole, err: WorkerError) {
        self.errors.push(format!("{role}: {err}"));
        self.last_error = Some(err);
    }

    pub fn latest_review(&self) -> Option<&ReviewFeedback> {
        self.reviews.last()
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::ReviewVerdict;

    #[test]
    fn test_phase_display() {
        assert_eq!(RunPhase::Routing(WorkerRole::DocLookup).to_string(), "ROUTING(rag)");
        assert_eq!(
            RunPhase::Retrying {
                role: WorkerRole::General,
                attempt: 2
            }
            .to_string(),
            "RETRYING(general, 2)"
        );
        assert!(RunPhase::Failed.is_terminal());
        assert_eq!(RunPhase::Aggregating.pending_role(), None);
    }

    #[test]
    fn test_record_output_updates_typed_fields() {
        let request = Request::new("q", "s");
        let mut state = RunState::new(&request, WorkerRole::Planner);
        state.record_output(
            WorkerRole::Researcher,
            WorkerOutput::Findings(vec![ResearchFinding {
                topic: "t".into(),
                detail: "d".into(),
                source: None,
            }]),
        );
        assert_eq!(state.findings.len(), 1);
        state.record_output(WorkerRole::Researcher, WorkerOutput::Findings(vec![]));
        assert!(state.findings.is_empty());

        state.record_output(
            WorkerRole::Critic,
            WorkerOutput::Review(ReviewFeedback {
                verdict: ReviewVerdict::Approve,
                score: 8.0,
                summary: "ok".into(),
                items: vec![],
            }),
        );
        assert_eq!(state.latest_review().map(|r| r.verdict), Some(ReviewVerdict::Approve));
        assert_eq!(state.outputs.len(), 2);
    }
}

//! 错误恢复引擎
//!
//! 根据 WorkerError 与失败角色返回 RecoveryAction，供 Supervisor 决定是重试、回退、走安全默认还是终止。
//! 是否还有重试预算由 Supervisor 判断，这里只负责「该怎么恢复」。

use crate::core::{RecoveryAction, WorkerError};
use crate::workflow::{RunMode, WorkerRole};

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &WorkerError, role: WorkerRole, mode: &RunMode) -> RecoveryAction {
        match err {
            WorkerError::Cancelled | WorkerError::DeadlineExceeded => RecoveryAction::Abort,
            // 流水线中格式错误的输出直接交给 Reporter 收尾；Reporter 自身出错则按普通失败处理
            WorkerError::MalformedOutput { .. }
                if mode.is_pipeline() && role != WorkerRole::Reporter =>
            {
                RecoveryAction::SafeDefault(WorkerRole::Reporter)
            }
            WorkerError::Unavailable(_) => match role.fallback() {
                Some(fallback) => RecoveryAction::Fallback(fallback),
                None => RecoveryAction::Abort,
            },
            _ => match role.fallback() {
                Some(fallback) => RecoveryAction::Fallback(fallback),
                None => RecoveryAction::Retry,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    fn issue_mode() -> RunMode {
        RunMode::IssueAnalysis {
            repository: "octo/repo".to_string(),
        }
    }

    #[test]
    fn test_transient_error_on_doc_lookup_falls_back_to_general() {
        let engine = RecoveryEngine::new();
        let err = WorkerError::Llm(LlmError::RateLimited { retry_after_ms: 1000 });
        let action = engine.handle(&err, WorkerRole::DocLookup, &RunMode::Chat);
        assert_eq!(action, RecoveryAction::Fallback(WorkerRole::General));
    }

    #[test]
    fn test_general_retries_itself() {
        let engine = RecoveryEngine::new();
        let err = WorkerError::Llm(LlmError::Timeout);
        let action = engine.handle(&err, WorkerRole::General, &RunMode::Chat);
        assert_eq!(action, RecoveryAction::Retry);
    }

    #[test]
    fn test_malformed_pipeline_output_defaults_to_reporter() {
        let engine = RecoveryEngine::new();
        let err = WorkerError::MalformedOutput {
            role: WorkerRole::Critic,
            detail: "not json".to_string(),
        };
        let action = engine.handle(&err, WorkerRole::Critic, &issue_mode());
        assert_eq!(action, RecoveryAction::SafeDefault(WorkerRole::Reporter));
    }

    #[test]
    fn test_malformed_reporter_output_retries() {
        let engine = RecoveryEngine::new();
        let err = WorkerError::MalformedOutput {
            role: WorkerRole::Reporter,
            detail: "empty".to_string(),
        };
        let action = engine.handle(&err, WorkerRole::Reporter, &issue_mode());
        assert_eq!(action, RecoveryAction::Retry);
    }

    #[test]
    fn test_deadline_and_cancel_abort() {
        let engine = RecoveryEngine::new();
        for err in [WorkerError::DeadlineExceeded, WorkerError::Cancelled] {
            let action = engine.handle(&err, WorkerRole::WebSearch, &RunMode::Chat);
            assert_eq!(action, RecoveryAction::Abort);
        }
    }

    #[test]
    fn test_unavailable_pipeline_role_aborts() {
        let engine = RecoveryEngine::new();
        let err = WorkerError::Unavailable(WorkerRole::Planner);
        let action = engine.handle(&err, WorkerRole::Planner, &issue_mode());
        assert_eq!(action, RecoveryAction::Abort);
    }
}

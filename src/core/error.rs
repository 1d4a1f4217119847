//! Worker 错误类型、失败分类与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 WorkerError 决定 Retry / Fallback / SafeDefault / Abort。

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::llm::LlmError;
use crate::workflow::WorkerRole;

/// 单个 Worker 执行失败的原因（后端、搜索、代码托管、输出格式、超时、panic 等）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkerError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search backend error: {0}")]
    Search(String),

    #[error("Source host error: {0}")]
    SourceHost(String),

    /// 上游输出无法解析为该角色的类型化结果
    #[error("Malformed output from {role}: {detail}")]
    MalformedOutput { role: WorkerRole, detail: String },

    /// 请求级截止时间已到
    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    #[error("No worker registered for role {0}")]
    Unavailable(WorkerRole),

    #[error("Worker panicked: {0}")]
    Panicked(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl WorkerError {
    /// 终止时写入 metadata.failure_kind 的分类
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            WorkerError::DeadlineExceeded => FailureKind::Transient,
            WorkerError::Cancelled => FailureKind::Cancelled,
            WorkerError::MalformedOutput { .. } => FailureKind::Malformed,
            _ => FailureKind::Exhausted,
        }
    }
}

/// 终止失败的种类（所有种类共用同一个响应信封）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Transient,
    Exhausted,
    Malformed,
    Runaway,
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transient => "transient",
            FailureKind::Exhausted => "exhausted",
            FailureKind::Malformed => "malformed",
            FailureKind::Runaway => "runaway",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 同一角色重试（消耗一次重试预算）
    Retry,
    /// 切换到依赖更少的角色（消耗一次重试预算）
    Fallback(WorkerRole),
    /// 以安全默认路由继续，不消耗重试预算
    SafeDefault(WorkerRole),
    /// 终止当前请求
    Abort,
}

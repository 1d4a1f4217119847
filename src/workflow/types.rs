//! 编排类型定义
//!
//! 定义 Worker 角色、角色元数据表、请求、路由决策与执行结果等核心数据类型

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::memory::Message;

/// Worker 角色（封闭枚举，运行时不可扩展）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerRole {
    #[serde(rename = "rag")]
    DocLookup,
    #[serde(rename = "search")]
    WebSearch,
    /// 预留角色，没有对应 Worker，路由时替换为回退角色
    #[serde(rename = "code")]
    Code,
    #[serde(rename = "general")]
    General,
    #[serde(rename = "planner")]
    Planner,
    #[serde(rename = "researcher")]
    Researcher,
    #[serde(rename = "resolver")]
    Resolver,
    #[serde(rename = "critic")]
    Critic,
    #[serde(rename = "reporter")]
    Reporter,
}

/// 角色元数据（表驱动，路由逻辑只查表，不对角色做特判）
#[derive(Debug, Clone, Copy)]
pub struct RoleInfo {
    pub role: WorkerRole,
    pub tag: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
    /// 失败时的回退角色；None 表示同角色重试
    pub fallback: Option<WorkerRole>,
}

pub const ROLE_TABLE: &[RoleInfo] = &[
    RoleInfo {
        role: WorkerRole::DocLookup,
        tag: "rag",
        icon: "📚",
        description: "Document and API guide lookup",
        fallback: Some(WorkerRole::General),
    },
    RoleInfo {
        role: WorkerRole::WebSearch,
        tag: "search",
        icon: "🔍",
        description: "Web search for recent information",
        fallback: Some(WorkerRole::General),
    },
    RoleInfo {
        role: WorkerRole::Code,
        tag: "code",
        icon: "💻",
        description: "Code execution (reserved)",
        fallback: Some(WorkerRole::General),
    },
    RoleInfo {
        role: WorkerRole::General,
        tag: "general",
        icon: "💬",
        description: "General conversation",
        fallback: None,
    },
    RoleInfo {
        role: WorkerRole::Planner,
        tag: "planner",
        icon: "🗺️",
        description: "Builds a resolution plan for repository issues",
        fallback: None,
    },
    RoleInfo {
        role: WorkerRole::Researcher,
        tag: "researcher",
        icon: "🔬",
        description: "Collects findings from repository sources",
        fallback: None,
    },
    RoleInfo {
        role: WorkerRole::Resolver,
        tag: "resolver",
        icon: "🛠️",
        description: "Drafts a resolution proposal",
        fallback: None,
    },
    RoleInfo {
        role: WorkerRole::Critic,
        tag: "critic",
        icon: "🧐",
        description: "Reviews the resolution and routes feedback",
        fallback: None,
    },
    RoleInfo {
        role: WorkerRole::Reporter,
        tag: "reporter",
        icon: "📝",
        description: "Writes the final analysis report",
        fallback: None,
    },
];

impl WorkerRole {
    pub const ALL: [WorkerRole; 9] = [
        WorkerRole::DocLookup,
        WorkerRole::WebSearch,
        WorkerRole::Code,
        WorkerRole::General,
        WorkerRole::Planner,
        WorkerRole::Researcher,
        WorkerRole::Resolver,
        WorkerRole::Critic,
        WorkerRole::Reporter,
    ];

    pub fn info(&self) -> &'static RoleInfo {
        // ROLE_TABLE 与 ALL 一一对应且顺序一致
        &ROLE_TABLE[*self as usize]
    }

    pub fn tag(&self) -> &'static str {
        self.info().tag
    }

    pub fn icon(&self) -> &'static str {
        self.info().icon
    }

    pub fn description(&self) -> &'static str {
        self.info().description
    }

    pub fn fallback(&self) -> Option<WorkerRole> {
        self.info().fallback
    }

    pub fn from_tag(tag: &str) -> Option<WorkerRole> {
        ROLE_TABLE
            .iter()
            .find(|info| info.tag.eq_ignore_ascii_case(tag.trim()))
            .map(|info| info.role)
    }

    pub fn is_pipeline(&self) -> bool {
        PIPELINE.contains(self)
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// 五阶段议题分析流水线的推进顺序
pub const PIPELINE: [WorkerRole; 5] = [
    WorkerRole::Planner,
    WorkerRole::Researcher,
    WorkerRole::Resolver,
    WorkerRole::Critic,
    WorkerRole::Reporter,
];

/// 运行模式：普通对话，或针对某个仓库的议题分析流水线
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Chat,
    IssueAnalysis { repository: String },
}

impl RunMode {
    pub fn is_pipeline(&self) -> bool {
        matches!(self, RunMode::IssueAnalysis { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Chat => "chat",
            RunMode::IssueAnalysis { .. } => "issue_analysis",
        }
    }
}

/// 单次请求（创建后不可变，运行期间由 ExecutionEngine 持有）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub query: String,
    pub session_id: String,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub mode: RunMode,
}

impl Request {
    pub fn new(query: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: session_id.into(),
            history: Vec::new(),
            context: Map::new(),
            mode: RunMode::Chat,
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }
}

/// 路由动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteAction {
    Continue,
    Retry,
    Aggregate,
    Finish,
    Escalate,
}

/// 一次 Supervisor 评估的输出（状态迁移标签，不持久化）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub action: RouteAction,
    pub next_role: Option<WorkerRole>,
    pub reasoning: String,
}

impl RoutingDecision {
    pub fn new(action: RouteAction, next_role: Option<WorkerRole>, reasoning: impl Into<String>) -> Self {
        Self {
            action,
            next_role,
            reasoning: reasoning.into(),
        }
    }
}

/// 执行结果（成功与各类失败共用同一信封）
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub response: String,
    pub trace: Vec<String>,
    pub route: Vec<WorkerRole>,
    pub success: bool,
    pub metadata: Map<String, Value>,
}

impl ExecutionResult {
    pub fn failure_kind(&self) -> Option<&str> {
        self.metadata.get("failure_kind").and_then(Value::as_str)
    }
}

/// 角色 → 文本输出，保持首次写入顺序（聚合时按调用顺序拼接）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoleOutputs {
    entries: Vec<(WorkerRole, String)>,
}

impl RoleOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已存在的角色原位覆盖，不改变顺序
    pub fn upsert(&mut self, role: WorkerRole, output: impl Into<String>) {
        let output = output.into();
        match self.entries.iter_mut().find(|(r, _)| *r == role) {
            Some(entry) => entry.1 = output,
            None => self.entries.push((role, output)),
        }
    }

    pub fn get(&self, role: WorkerRole) -> Option<&str> {
        self.entries
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, output)| output.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (WorkerRole, &str)> {
        self.entries.iter().map(|(r, o)| (*r, o.as_str()))
    }

    pub fn roles(&self) -> Vec<WorkerRole> {
        self.entries.iter().map(|(r, _)| *r).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(WorkerRole, S)> for RoleOutputs {
    fn from_iter<I: IntoIterator<Item = (WorkerRole, S)>>(iter: I) -> Self {
        let mut outputs = RoleOutputs::new();
        for (role, output) in iter {
            outputs.upsert(role, output);
        }
        outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_table_matches_enum_order() {
        for role in WorkerRole::ALL {
            assert_eq!(role.info().role, role);
        }
        assert_eq!(ROLE_TABLE.len(), WorkerRole::ALL.len());
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(WorkerRole::DocLookup.fallback(), Some(WorkerRole::General));
        assert_eq!(WorkerRole::WebSearch.fallback(), Some(WorkerRole::General));
        assert_eq!(WorkerRole::Code.fallback(), Some(WorkerRole::General));
        assert_eq!(WorkerRole::General.fallback(), None);
        assert!(PIPELINE.iter().all(|r| r.fallback().is_none()));
    }

    #[test]
    fn test_tags_roundtrip_through_serde() {
        for role in WorkerRole::ALL {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.tag()));
            assert_eq!(WorkerRole::from_tag(role.tag()), Some(role));
        }
        assert_eq!(WorkerRole::from_tag("unknown"), None);
    }

    #[test]
    fn test_role_outputs_keep_first_insertion_order() {
        let mut outputs = RoleOutputs::new();
        outputs.upsert(WorkerRole::WebSearch, "a");
        outputs.upsert(WorkerRole::DocLookup, "b");
        outputs.upsert(WorkerRole::WebSearch, "c");
        assert_eq!(outputs.roles(), vec![WorkerRole::WebSearch, WorkerRole::DocLookup]);
        assert_eq!(outputs.get(WorkerRole::WebSearch), Some("c"));
    }
}

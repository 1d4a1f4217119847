//! Worker：每个角色一个实现，`process` 可能在网络 I/O 上挂起，也可能失败
//!
//! - chat：文档查询 / Web 搜索 / 通用对话
//! - pipeline：议题分析五阶段（Planner → Researcher → Resolver → Critic → Reporter）

pub mod chat;
pub mod output;
pub mod parse;
pub mod pipeline;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{RunState, WorkerError};
use crate::llm::{GenerationParams, LlmClient, LlmError};
use crate::memory::Message;
use crate::workflow::{Request, WorkerRole};

pub use chat::{DocLookupWorker, GeneralWorker, WebSearchWorker};
pub use output::{ResearchFinding, ResolutionPlan, ReviewFeedback, ReviewVerdict, WorkerOutput};
pub use pipeline::{CriticWorker, PlannerWorker, ReporterWorker, ResearcherWorker, ResolverWorker};

/// Worker trait：角色 + 异步处理
#[async_trait]
pub trait Worker: Send + Sync {
    fn role(&self) -> WorkerRole;

    /// state 只读：流水线阶段从中读取上游产物（计划、调研发现、评审意见）
    async fn process(&self, request: &Request, state: &RunState) -> Result<WorkerOutput, WorkerError>;
}

/// Worker 注册表：按角色存储 Arc<dyn Worker>
#[derive(Default, Clone)]
pub struct WorkerRegistry {
    workers: HashMap<WorkerRole, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, worker: impl Worker + 'static) {
        self.register_arc(Arc::new(worker));
    }

    pub fn register_arc(&mut self, worker: Arc<dyn Worker>) {
        self.workers.insert(worker.role(), worker);
    }

    pub fn with(mut self, worker: impl Worker + 'static) -> Self {
        self.register(worker);
        self
    }

    pub fn get(&self, role: WorkerRole) -> Option<Arc<dyn Worker>> {
        self.workers.get(&role).cloned()
    }

    pub fn contains(&self, role: WorkerRole) -> bool {
        self.workers.contains_key(&role)
    }

    /// 已注册角色（按角色表顺序）
    pub fn roles(&self) -> Vec<WorkerRole> {
        WorkerRole::ALL
            .into_iter()
            .filter(|r| self.workers.contains_key(r))
            .collect()
    }
}

/// LLM 调用的公共部分：客户端 + 采样参数 + 单次调用超时
#[derive(Clone)]
pub struct LlmHandle {
    llm: Arc<dyn LlmClient>,
    params: GenerationParams,
    timeout: Option<Duration>,
}

impl LlmHandle {
    pub fn new(llm: Arc<dyn LlmClient>, params: GenerationParams) -> Self {
        Self {
            llm,
            params,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// system + 历史 + 本轮 prompt
    pub async fn ask(&self, system: &str, history: &[Message], prompt: &str) -> Result<String, WorkerError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system));
        messages.extend(history.iter().cloned());
        messages.push(Message::user(prompt));

        let call = self.llm.complete(&messages, &self.params);
        let reply = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| LlmError::Timeout)?,
            None => call.await,
        };
        Ok(reply?)
    }
}

//! 对话类 Worker：文档查询、Web 搜索、通用对话

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{RunState, WorkerError};
use crate::tools::{SearchBackend, SearchHit};
use crate::workers::{LlmHandle, Worker, WorkerOutput};
use crate::workflow::{Request, WorkerRole};

const DOC_LOOKUP_PROMPT: &str = "You are a documentation assistant. Answer questions about APIs, guides \
and manuals precisely, citing the relevant section or usage example when you can.";

const WEB_SEARCH_PROMPT: &str = "You answer questions about recent events using the supplied web search \
results. Prefer the most recent and highest-scored sources and say so when the results are insufficient.";

const GENERAL_PROMPT: &str = "You are a helpful assistant. Answer clearly and concisely.";

/// 文档 / API 指南查询
pub struct DocLookupWorker {
    llm: LlmHandle,
}

impl DocLookupWorker {
    pub fn new(llm: LlmHandle) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Worker for DocLookupWorker {
    fn role(&self) -> WorkerRole {
        WorkerRole::DocLookup
    }

    async fn process(&self, request: &Request, _state: &RunState) -> Result<WorkerOutput, WorkerError> {
        let answer = self
            .llm
            .ask(DOC_LOOKUP_PROMPT, &request.history, &request.query)
            .await?;
        Ok(WorkerOutput::Answer(answer))
    }
}

/// Web 搜索：先查搜索后端，再让 LLM 基于结果作答；无结果时直接给出「未找到」回答
pub struct WebSearchWorker {
    llm: LlmHandle,
    search: Arc<dyn SearchBackend>,
    max_results: usize,
}

impl WebSearchWorker {
    pub fn new(llm: LlmHandle, search: Arc<dyn SearchBackend>, max_results: usize) -> Self {
        Self {
            llm,
            search,
            max_results,
        }
    }
}

fn format_hits(hits: &[SearchHit]) -> String {
    let mut out = String::new();
    for (i, hit) in hits.iter().enumerate() {
        let _ = write!(out, "[{}] {} ({})", i + 1, hit.title, hit.url);
        if let Some(date) = hit.published_date.as_deref().filter(|d| !d.is_empty()) {
            let _ = write!(out, " - {date}");
        }
        let _ = writeln!(out, "\n{}\n", hit.content.trim());
    }
    out
}

pub fn no_results_answer(query: &str) -> String {
    format!("No results found for \"{}\".", query.trim())
}

#[async_trait]
impl Worker for WebSearchWorker {
    fn role(&self) -> WorkerRole {
        WorkerRole::WebSearch
    }

    async fn process(&self, request: &Request, _state: &RunState) -> Result<WorkerOutput, WorkerError> {
        let hits = self
            .search
            .search(&request.query, self.max_results)
            .await
            .map_err(|e| WorkerError::Search(e.to_string()))?;

        tracing::debug!(backend = self.search.name(), hits = hits.len(), "web search results");
        if hits.is_empty() {
            return Ok(WorkerOutput::Answer(no_results_answer(&request.query)));
        }

        let prompt = format!(
            "Search results:\n\n{}\nQuestion: {}",
            format_hits(&hits),
            request.query
        );
        let mut answer = self.llm.ask(WEB_SEARCH_PROMPT, &request.history, &prompt).await?;

        answer.push_str("\n\nSources:");
        for hit in &hits {
            let _ = write!(answer, "\n- {} ({})", hit.title, hit.url);
        }
        Ok(WorkerOutput::Answer(answer))
    }
}

/// 通用对话：依赖最少，是所有对话角色的回退目标
pub struct GeneralWorker {
    llm: LlmHandle,
}

impl GeneralWorker {
    pub fn new(llm: LlmHandle) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Worker for GeneralWorker {
    fn role(&self) -> WorkerRole {
        WorkerRole::General
    }

    async fn process(&self, request: &Request, _state: &RunState) -> Result<WorkerOutput, WorkerError> {
        let answer = self
            .llm
            .ask(GENERAL_PROMPT, &request.history, &request.query)
            .await?;
        Ok(WorkerOutput::Answer(answer))
    }
}

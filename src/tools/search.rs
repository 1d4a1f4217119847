//! Web 搜索后端
//!
//! SearchBackend：query → 排序后的摘要列表。空结果是合法结果，不是错误。
//! TavilyClient 通过 POST /search 调用 Tavily；OfflineSearch 在没有 TAVILY_API_KEY 时使用，始终返回空。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::tools::ToolError;

const TAVILY_API_BASE: &str = "https://api.tavily.com";
const USER_AGENT: &str = concat!("hive/", env!("CARGO_PKG_VERSION"));

/// 一条搜索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub published_date: Option<String>,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ToolError>;
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// 解析 Tavily 响应体并按 score 降序排列
fn parse_tavily_response(body: &str) -> Result<Vec<SearchHit>, ToolError> {
    let parsed: TavilyResponse =
        serde_json::from_str(body).map_err(|e| ToolError::Decode(e.to_string()))?;
    let mut hits = parsed.results;
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(hits)
}

/// Tavily 搜索客户端
pub struct TavilyClient {
    client: Client,
    api_key: String,
    api_base: String,
    search_depth: String,
}

impl TavilyClient {
    pub fn new(api_key: impl Into<String>, search_depth: impl Into<String>, timeout_secs: u64) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            api_base: TAVILY_API_BASE.to_string(),
            search_depth: search_depth.into(),
        })
    }

    /// 从 TAVILY_API_KEY 构建；未设置时返回 None
    pub fn from_env(search_depth: &str, timeout_secs: u64) -> Option<Result<Self, ToolError>> {
        let key = std::env::var("TAVILY_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
        Some(Self::new(key, search_depth, timeout_secs))
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl SearchBackend for TavilyClient {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ToolError> {
        let payload = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "search_depth": self.search_depth,
            "max_results": max_results,
            "include_answer": false,
            "include_images": false,
        });

        let resp = self
            .client
            .post(format!("{}/search", self.api_base.trim_end_matches('/')))
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ToolError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut hits = parse_tavily_response(&body)?;
        hits.truncate(max_results);
        tracing::debug!(backend = "tavily", query = %query, hits = hits.len(), "search completed");
        Ok(hits)
    }
}

/// 离线搜索后端：始终返回空结果
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineSearch;

#[async_trait]
impl SearchBackend for OfflineSearch {
    fn name(&self) -> &str {
        "offline"
    }

    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<SearchHit>, ToolError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tavily_response_maps_fields() {
        let body = r#"{
            "answer": null,
            "results": [
                {"title": "B", "url": "https://b", "content": "bb", "score": 0.4},
                {"title": "A", "url": "https://a", "content": "aa", "score": 0.9, "published_date": "2024-05-01"}
            ]
        }"#;
        let hits = parse_tavily_response(body).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "A");
        assert_eq!(hits[0].published_date.as_deref(), Some("2024-05-01"));
        assert_eq!(hits[1].published_date, None);
    }

    #[test]
    fn test_parse_missing_results_is_empty() {
        assert!(parse_tavily_response("{}").unwrap().is_empty());
        assert!(matches!(parse_tavily_response("not json"), Err(ToolError::Decode(_))));
    }

    #[tokio::test]
    async fn test_offline_search_is_empty() {
        let hits = OfflineSearch.search("anything", 5).await.unwrap();
        assert!(hits.is_empty());
    }
}

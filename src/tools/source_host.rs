//! 代码托管只读 API
//!
//! SourceHost 只暴露读取接口（议题列表 / 详情、文件内容、目录、代码搜索），没有任何写入方法：
//! 议题分析流水线只做分析，从不修改外部仓库。GitHubClient 基于 REST API 实现。

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use crate::tools::ToolError;

const USER_AGENT: &str = concat!("hive/", env!("CARGO_PKG_VERSION"));
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";

/// owner/name 形式的仓库引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// 接受 `owner/name`、`https://github.com/owner/name(.git)` 等形式
    pub fn parse(input: &str) -> Result<Self, ToolError> {
        let trimmed = input.trim().trim_end_matches('/');
        let path = match trimmed.split_once("github.com/") {
            Some((_, rest)) => rest,
            None => trimmed,
        };
        let mut parts = path.split('/').filter(|p| !p.is_empty());
        match (parts.next(), parts.next()) {
            (Some(owner), Some(name)) => Ok(Self {
                owner: owner.to_string(),
                name: name.trim_end_matches(".git").to_string(),
            }),
            _ => Err(ToolError::InvalidRepository(input.to_string())),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueLabel {
    pub name: String,
}

/// 议题摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueSummary {
    pub number: u64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<IssueLabel>,
    #[serde(default)]
    pub html_url: String,
}

/// 议题详情
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueDetail {
    pub number: u64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<IssueLabel>,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub html_url: String,
}

/// 目录项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    /// file / dir / symlink / submodule
    #[serde(rename = "type")]
    pub kind: String,
}

/// 代码搜索命中
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeMatch {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub html_url: String,
}

#[derive(Debug, Deserialize)]
struct CodeSearchResponse {
    #[serde(default)]
    items: Vec<CodeMatch>,
}

/// 只读代码托管接口
#[async_trait]
pub trait SourceHost: Send + Sync {
    async fn list_issues(
        &self,
        repo: &RepoRef,
        state: &str,
        labels: &[String],
    ) -> Result<Vec<IssueSummary>, ToolError>;

    async fn get_issue(&self, repo: &RepoRef, number: u64) -> Result<IssueDetail, ToolError>;

    async fn read_file(&self, repo: &RepoRef, path: &str, git_ref: Option<&str>) -> Result<String, ToolError>;

    async fn list_directory(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Vec<DirEntry>, ToolError>;

    async fn search_code(
        &self,
        repo: &RepoRef,
        query: &str,
        language: Option<&str>,
    ) -> Result<Vec<CodeMatch>, ToolError>;
}

/// 代码搜索查询串（`query repo:owner/name language:x`）
fn code_search_query(repo: &RepoRef, query: &str, language: Option<&str>) -> String {
    let mut q = format!("{} repo:{}", query.trim(), repo);
    if let Some(lang) = language.filter(|l| !l.trim().is_empty()) {
        q.push_str(&format!(" language:{}", lang.trim()));
    }
    q
}

/// GitHub REST 客户端；GITHUB_TOKEN 可选（无 token 时受匿名限流约束）
pub struct GitHubClient {
    client: Client,
    api_base: String,
}

impl GitHubClient {
    pub fn new(api_base: impl Into<String>, token: Option<String>, timeout_secs: u64) -> Result<Self, ToolError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_MEDIA_TYPE));
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|_| ToolError::InvalidCredential("GITHUB_TOKEN"))?;
            headers.insert(AUTHORIZATION, value);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_env(api_base: impl Into<String>, timeout_secs: u64) -> Result<Self, ToolError> {
        Self::new(api_base, std::env::var("GITHUB_TOKEN").ok(), timeout_secs)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    async fn send_text(&self, req: RequestBuilder) -> Result<String, ToolError> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ToolError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ToolError> {
        let body = self.send_text(req).await?;
        serde_json::from_str(&body).map_err(|e| ToolError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SourceHost for GitHubClient {
    async fn list_issues(
        &self,
        repo: &RepoRef,
        state: &str,
        labels: &[String],
    ) -> Result<Vec<IssueSummary>, ToolError> {
        let mut query = vec![("state", state.to_string()), ("per_page", "30".to_string())];
        if !labels.is_empty() {
            query.push(("labels", labels.join(",")));
        }
        let req = self.client.get(self.url(&format!("repos/{repo}/issues"))).query(&query);
        let issues: Vec<IssueSummary> = self.get_json(req).await?;
        tracing::debug!(repo = %repo, count = issues.len(), "listed issues");
        Ok(issues)
    }

    async fn get_issue(&self, repo: &RepoRef, number: u64) -> Result<IssueDetail, ToolError> {
        let req = self.client.get(self.url(&format!("repos/{repo}/issues/{number}")));
        self.get_json(req).await
    }

    async fn read_file(&self, repo: &RepoRef, path: &str, git_ref: Option<&str>) -> Result<String, ToolError> {
        let mut req = self
            .client
            .get(self.url(&format!("repos/{repo}/contents/{}", path.trim_start_matches('/'))))
            .header(ACCEPT, RAW_MEDIA_TYPE);
        if let Some(r) = git_ref {
            req = req.query(&[("ref", r)]);
        }
        self.send_text(req).await
    }

    async fn list_directory(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Vec<DirEntry>, ToolError> {
        let mut req = self
            .client
            .get(self.url(&format!("repos/{repo}/contents/{}", path.trim_matches('/'))));
        if let Some(r) = git_ref {
            req = req.query(&[("ref", r)]);
        }
        self.get_json(req).await
    }

    async fn search_code(
        &self,
        repo: &RepoRef,
        query: &str,
        language: Option<&str>,
    ) -> Result<Vec<CodeMatch>, ToolError> {
        let q = code_search_query(repo, query, language);
        let req = self.client.get(self.url("search/code")).query(&[("q", q.as_str())]);
        let resp: CodeSearchResponse = self.get_json(req).await?;
        Ok(resp.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_ref_parse_forms() {
        let expected = RepoRef {
            owner: "octo".into(),
            name: "hello".into(),
        };
        assert_eq!(RepoRef::parse("octo/hello").unwrap(), expected);
        assert_eq!(RepoRef::parse("https://github.com/octo/hello").unwrap(), expected);
        assert_eq!(RepoRef::parse("https://github.com/octo/hello.git/").unwrap(), expected);
        assert_eq!(expected.to_string(), "octo/hello");
    }

    #[test]
    fn test_repo_ref_rejects_single_segment() {
        assert!(matches!(
            RepoRef::parse("https://github.com/octo"),
            Err(ToolError::InvalidRepository(_))
        ));
        assert!(RepoRef::parse("").is_err());
    }

    #[test]
    fn test_code_search_query() {
        let repo = RepoRef::parse("octo/hello").unwrap();
        assert_eq!(
            code_search_query(&repo, "parse_config", Some("rust")),
            "parse_config repo:octo/hello language:rust"
        );
        assert_eq!(code_search_query(&repo, "x", Some(" ")), "x repo:octo/hello");
    }

    #[test]
    fn test_issue_deserializes_without_optional_fields() {
        let issue: IssueSummary =
            serde_json::from_str(r#"{"number": 7, "title": "Crash", "state": "open"}"#).unwrap();
        assert_eq!(issue.number, 7);
        assert!(issue.labels.is_empty());

        let entry: DirEntry =
            serde_json::from_str(r#"{"name": "src", "path": "src", "type": "dir"}"#).unwrap();
        assert_eq!(entry.kind, "dir");
    }
}

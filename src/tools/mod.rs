//! 外部协作者：Web 搜索后端与只读代码托管 API

pub mod search;
pub mod source_host;

use thiserror::Error;

pub use search::{OfflineSearch, SearchBackend, SearchHit, TavilyClient};
pub use source_host::{
    CodeMatch, DirEntry, GitHubClient, IssueDetail, IssueLabel, IssueSummary, RepoRef, SourceHost,
};

/// 搜索与代码托管 HTTP 调用的错误
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid repository reference: {0}")]
    InvalidRepository(String),

    #[error("Invalid credential in {0}")]
    InvalidCredential(&'static str),
}

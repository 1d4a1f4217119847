//! Hive - Rust 多 Worker 编排服务
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: Worker 错误与恢复、运行状态、装配
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / Scripted）
//! - **memory**: 对话消息与会话账本
//! - **observability**: tracing 初始化
//! - **service**: ChatService 服务边界（CLI / Web 共用）
//! - **tools**: Web 搜索后端与只读代码托管 API
//! - **workers**: 各角色 Worker（对话类 + 议题分析流水线）
//! - **workflow**: 意图分类、Supervisor 状态机、聚合、执行引擎

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod service;
pub mod tools;
pub mod workers;
pub mod workflow;

pub use service::{ChatRequest, ChatResponse, ChatService, ServiceError};
pub use workflow::{ExecutionEngine, ExecutionResult, Request, WorkerRole};

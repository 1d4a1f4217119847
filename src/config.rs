//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__ROUTING__MAX_RETRIES=5`）。
//! 密钥（OPENAI_API_KEY / TAVILY_API_KEY / GITHUB_TOKEN）只从环境变量读取，不进配置文件。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub routing: RoutingSection,
    pub session: SessionSection,
    pub search: SearchSection,
    pub source: SourceSection,
    pub web: WebSection,
}

/// [app] 段：服务名与单条消息长度上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub max_message_length: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "hive".to_string(),
            max_message_length: 10_000,
        }
    }
}

/// [llm] 段：后端选择、模型与采样参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / mock；openai 且无 OPENAI_API_KEY 时降级为 mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// 单次 LLM 调用超时（秒）
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            temperature: 0.7,
            max_tokens: 2000,
            timeout_secs: 30,
        }
    }
}

/// [routing] 段：重试预算、迭代上限、请求超时、多 Worker 聚合开关
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingSection {
    pub max_retries: u32,
    pub max_iterations: u32,
    pub request_timeout_secs: u64,
    pub multi_agent: bool,
    /// 失败时返回给用户的道歉文案
    pub apology: String,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_iterations: 10,
            request_timeout_secs: 60,
            multi_agent: false,
            apology: "Sorry, something went wrong while processing your request. Please try again later."
                .to_string(),
        }
    }
}

impl RoutingSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// [session] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// 每个会话保留的账本条目数
    pub max_entries: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self { max_entries: 20 }
    }
}

/// [search] 段：Web 搜索（Tavily）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub max_results: usize,
    /// basic / advanced
    pub search_depth: String,
    pub timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            max_results: 5,
            search_depth: "basic".to_string(),
            timeout_secs: 15,
        }
    }
}

/// [source] 段：代码托管只读 API（GitHub）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    pub api_base: String,
    pub timeout_secs: u64,
    /// Researcher 单次最多读取的文件数
    pub max_files: usize,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            timeout_secs: 15,
            max_files: 5,
        }
    }
}

/// [web] 段：hive-web 监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSection {
    pub host: String,
    pub port: u16,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl WebSection {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

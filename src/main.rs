//! Hive CLI
//!
//! 用法：
//! - `hive "API 사용법을 알려줘"`：单次提问
//! - `hive --repo https://github.com/owner/repo "analyze crash on startup"`：议题分析
//! - `hive`：交互模式（/history、/clear、/quit）

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use hive::config::load_config;
use hive::core::build_service;
use hive::observability;
use hive::{ChatRequest, ChatResponse, ChatService};

const NO_SESSION: &str = "(no session yet)";

#[derive(Parser, Debug)]
#[command(name = "hive", version, about = "Multi-worker orchestration CLI")]
struct Cli {
    /// 问题；省略时进入交互模式
    query: Vec<String>,

    /// 会话 ID（省略时自动生成）
    #[arg(short, long)]
    session: Option<String>,

    /// 仓库 URL 或 owner/name，启用议题分析流水线
    #[arg(long)]
    repo: Option<String>,

    /// 额外的配置文件
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 以 JSON 输出完整响应
    #[arg(long)]
    json: bool,
}

fn print_response(resp: &ChatResponse, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(resp)?);
    } else {
        println!("[{}] {}", resp.agent_used, resp.response);
        for line in &resp.reasoning_trace {
            tracing::debug!("trace: {}", line);
        }
    }
    Ok(())
}

async fn ask(service: &ChatService, cli: &Cli, session: Option<String>, message: String) -> anyhow::Result<ChatResponse> {
    let req = ChatRequest {
        message,
        session_id: session,
        history: None,
        repository: cli.repo.clone(),
    };
    let resp = service.chat(req).await.context("Request rejected")?;
    print_response(&resp, cli.json)?;
    Ok(resp)
}

/// 执行 /history、/clear；返回要打印的行。不是会话命令时返回 None
async fn session_command(service: &ChatService, command: &str, session: &mut Option<String>) -> Option<Vec<String>> {
    let lines = match command {
        "/history" => match session.as_deref() {
            Some(id) => service
                .history(id)
                .await
                .into_iter()
                .map(|entry| {
                    format!(
                        "{} [{}] {}",
                        entry.timestamp.format("%H:%M:%S"),
                        entry.role.as_str(),
                        entry.content
                    )
                })
                .collect(),
            None => vec![NO_SESSION.to_string()],
        },
        "/clear" => match session.take() {
            Some(id) => {
                let cleared = service.clear_session(&id).await;
                vec![format!("session {id} cleared: {cleared}")]
            }
            None => vec![NO_SESSION.to_string()],
        },
        _ => return None,
    };
    Some(lines)
}

async fn repl(service: &ChatService, cli: &Cli) -> anyhow::Result<()> {
    let mut session = cli.session.clone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            _ => {}
        }
        if let Some(output) = session_command(service, line, &mut session).await {
            for out in output {
                println!("{out}");
            }
            continue;
        }
        match ask(service, cli, session.clone(), line.to_string()).await {
            Ok(resp) => session = Some(resp.session_id),
            Err(e) => eprintln!("error: {e:#}"),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let cli = Cli::parse();

    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    let service = build_service(&cfg).context("Failed to build service")?;

    if cli.query.is_empty() {
        repl(&service, &cli).await
    } else {
        let message = cli.query.join(" ");
        ask(&service, &cli, cli.session.clone(), message).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive::config::AppConfig;

    fn service() -> ChatService {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        build_service(&cfg).unwrap()
    }

    #[tokio::test]
    async fn test_session_commands_without_session_agree() {
        let service = service();
        let mut session = None;
        let history = session_command(&service, "/history", &mut session).await.unwrap();
        let clear = session_command(&service, "/clear", &mut session).await.unwrap();
        assert_eq!(history, vec![NO_SESSION.to_string()]);
        assert_eq!(clear, history);
    }

    #[tokio::test]
    async fn test_clear_drops_active_session() {
        let service = service();
        let resp = service.chat(ChatRequest::new("hello")).await.unwrap();
        let mut session = Some(resp.session_id.clone());

        let history = session_command(&service, "/history", &mut session).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].ends_with("[user] hello"));

        let clear = session_command(&service, "/clear", &mut session).await.unwrap();
        assert_eq!(clear, vec![format!("session {} cleared: true", resp.session_id)]);
        assert!(session.is_none());
        assert!(session_command(&service, "hello", &mut session).await.is_none());
    }
}

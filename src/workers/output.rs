//! Worker 输出：按角色区分的类型化结果
//!
//! 对话角色产出 Answer；流水线各阶段产出各自的结构（计划、调研发现、方案、评审、报告），
//! 由 Supervisor 在质量门上检查，不再在角色之间传递自由格式的 JSON。

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Planner 产出的解决计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResolutionPlan {
    pub approach: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub affected_files: Vec<String>,
}

/// Researcher 的一条调研发现
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchFinding {
    pub topic: String,
    pub detail: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// Critic 的四路裁决：打回某个上游阶段，或批准交给 Reporter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approve,
    RevisePlan,
    ReviseResearch,
    ReviseResolution,
}

impl ReviewVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewVerdict::Approve => "approve",
            ReviewVerdict::RevisePlan => "revise_plan",
            ReviewVerdict::ReviseResearch => "revise_research",
            ReviewVerdict::ReviseResolution => "revise_resolution",
        }
    }
}

/// Critic 产出的评审反馈
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewFeedback {
    pub verdict: ReviewVerdict,
    /// 0-10
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub items: Vec<String>,
}

/// 一次 Worker 执行的结果
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutput {
    Answer(String),
    Plan(ResolutionPlan),
    Findings(Vec<ResearchFinding>),
    Resolution(String),
    Review(ReviewFeedback),
    Report(String),
}

impl WorkerOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerOutput::Answer(_) => "answer",
            WorkerOutput::Plan(_) => "plan",
            WorkerOutput::Findings(_) => "findings",
            WorkerOutput::Resolution(_) => "resolution",
            WorkerOutput::Review(_) => "review",
            WorkerOutput::Report(_) => "report",
        }
    }

    /// 渲染为可聚合 / 可展示的文本
    pub fn render(&self) -> String {
        match self {
            WorkerOutput::Answer(text)
            | WorkerOutput::Resolution(text)
            | WorkerOutput::Report(text) => text.clone(),
            WorkerOutput::Plan(plan) => {
                let mut out = format!("Approach: {}\n", plan.approach);
                for (i, step) in plan.steps.iter().enumerate() {
                    let _ = writeln!(out, "{}. {}", i + 1, step);
                }
                if !plan.affected_files.is_empty() {
                    let _ = writeln!(out, "Files: {}", plan.affected_files.join(", "));
                }
                if !plan.risks.is_empty() {
                    let _ = writeln!(out, "Risks: {}", plan.risks.join("; "));
                }
                out.trim_end().to_string()
            }
            WorkerOutput::Findings(findings) => findings
                .iter()
                .map(|f| match &f.source {
                    Some(source) => format!("- {}: {} ({})", f.topic, f.detail, source),
                    None => format!("- {}: {}", f.topic, f.detail),
                })
                .collect::<Vec<_>>()
                .join("\n"),
            WorkerOutput::Review(review) => {
                let mut out = format!(
                    "Verdict: {} (score {:.1})\n{}",
                    review.verdict.as_str(),
                    review.score,
                    review.summary
                );
                for item in &review.items {
                    let _ = write!(out, "\n- {item}");
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plan_numbers_steps() {
        let plan = ResolutionPlan {
            approach: "Patch the parser".into(),
            steps: vec!["reproduce".into(), "fix".into()],
            risks: vec![],
            affected_files: vec!["src/parser.rs".into()],
        };
        let text = WorkerOutput::Plan(plan).render();
        assert!(text.starts_with("Approach: Patch the parser"));
        assert!(text.contains("1. reproduce\n2. fix"));
        assert!(text.contains("Files: src/parser.rs"));
    }

    #[test]
    fn test_verdict_parses_snake_case() {
        let v: ReviewVerdict = serde_json::from_str("\"revise_research\"").unwrap();
        assert_eq!(v, ReviewVerdict::ReviseResearch);
        assert!(serde_json::from_str::<ReviewVerdict>("\"redo\"").is_err());
    }
}

//! 意图分类
//!
//! 纯函数：对小写化后的查询做关键词集合匹配，按固定优先级（文档 > 代码 > 搜索 > 通用）选出主角色。
//! 优先级以数据表 KEYWORD_PRIORITY 表达，便于单独测试与扩展；无任何命中时返回 General，永不失败。

use serde::Serialize;

use crate::workflow::WorkerRole;

/// (角色, 关键词集合)，按优先级从高到低排列
pub const KEYWORD_PRIORITY: &[(WorkerRole, &[&str])] = &[
    (
        WorkerRole::DocLookup,
        &[
            "문서", "api", "가이드", "매뉴얼", "설명서", "찾아", "검색", "사용법", "방법", "어떻게",
        ],
    ),
    (
        WorkerRole::Code,
        &[
            "코드", "실행", "프로그램", "계산", "함수", "python", "javascript", "실행해", "계산해",
        ],
    ),
    (
        WorkerRole::WebSearch,
        &["최신", "뉴스", "검색", "인터넷", "웹", "현재", "오늘", "요즘", "트렌드"],
    ),
];

/// 无命中时的置信度
const DEFAULT_CONFIDENCE: f32 = 0.5;
const MAX_CONFIDENCE: f32 = 0.95;

/// 分类结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub primary_role: WorkerRole,
    /// 所有命中的角色（按表中优先级，去重）
    pub candidate_roles: Vec<WorkerRole>,
    pub needs_multi_agent: bool,
    pub confidence: f32,
}

/// 意图分类器
#[derive(Debug, Clone, Default)]
pub struct IntentClassifier {
    /// 是否允许多 Worker 聚合
    multi_agent: bool,
}

impl IntentClassifier {
    pub fn new(multi_agent: bool) -> Self {
        Self { multi_agent }
    }

    pub fn classify(&self, query: &str) -> Classification {
        let lowered = query.to_lowercase();

        let mut candidates: Vec<(WorkerRole, usize)> = Vec::new();
        for (role, keywords) in KEYWORD_PRIORITY {
            let hits = keywords.iter().filter(|k| lowered.contains(*k)).count();
            if hits > 0 && !candidates.iter().any(|(r, _)| r == role) {
                candidates.push((*role, hits));
            }
        }

        let Some(&(primary_role, hits)) = candidates.first() else {
            return Classification {
                primary_role: WorkerRole::General,
                candidate_roles: Vec::new(),
                needs_multi_agent: false,
                confidence: DEFAULT_CONFIDENCE,
            };
        };

        let candidate_roles: Vec<WorkerRole> = candidates.iter().map(|(r, _)| *r).collect();
        Classification {
            primary_role,
            needs_multi_agent: self.multi_agent && candidate_roles.len() >= 2,
            candidate_roles,
            confidence: (0.6 + 0.1 * hits as f32).min(MAX_CONFIDENCE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_keyword_defaults_to_general() {
        let classifier = IntentClassifier::default();
        for query in ["안녕하세요", "hello there", "", "   "] {
            let c = classifier.classify(query);
            assert_eq!(c.primary_role, WorkerRole::General);
            assert!(c.candidate_roles.is_empty());
            assert!(!c.needs_multi_agent);
            assert_eq!(c.confidence, 0.5);
        }
    }

    #[test]
    fn test_api_usage_routes_to_doc_lookup() {
        let c = IntentClassifier::default().classify("API 사용법을 알려줘");
        assert_eq!(c.primary_role, WorkerRole::DocLookup);
        assert_eq!(c.candidate_roles, vec![WorkerRole::DocLookup]);
        // "api" + "사용법"
        assert!((c.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_priority_doc_beats_code_beats_search() {
        let classifier = IntentClassifier::default();
        assert_eq!(
            classifier.classify("python 코드 문서").primary_role,
            WorkerRole::DocLookup
        );
        assert_eq!(
            classifier.classify("오늘 뉴스 코드로 정리").primary_role,
            WorkerRole::Code
        );
        assert_eq!(
            classifier.classify("오늘 최신 뉴스").primary_role,
            WorkerRole::WebSearch
        );
    }

    #[test]
    fn test_shared_keyword_prefers_doc_lookup() {
        // "검색" 同时属于文档与搜索集合
        let c = IntentClassifier::default().classify("검색");
        assert_eq!(c.primary_role, WorkerRole::DocLookup);
        assert_eq!(c.candidate_roles, vec![WorkerRole::DocLookup, WorkerRole::WebSearch]);
    }

    #[test]
    fn test_multi_agent_requires_opt_in_and_two_candidates() {
        let query = "최신 api 문서";
        assert!(!IntentClassifier::new(false).classify(query).needs_multi_agent);
        let c = IntentClassifier::new(true).classify(query);
        assert!(c.needs_multi_agent);
        assert_eq!(c.candidate_roles, vec![WorkerRole::DocLookup, WorkerRole::WebSearch]);
        assert!(!IntentClassifier::new(true).classify("api").needs_multi_agent);
    }

    #[test]
    fn test_confidence_is_capped() {
        let c = IntentClassifier::default().classify("문서 api 가이드 매뉴얼 설명서 찾아 사용법");
        assert!((c.confidence - 0.95).abs() < 1e-6);
    }
}

//! 阶段与工作流形态
//!
//! 工作流形态在任务创建时一次性分类，中途绝不重评，防止阶段判定振荡。
//! 形态决定必经阶段序列；典型文档装配任务为 Search → Extract → Assemble → Done。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static TARGET_URL_RE: OnceLock<Regex> = OnceLock::new();
static COUNT_RE: OnceLock<Regex> = OnceLock::new();

/// 任务阶段；声明顺序即推进顺序（历史单调非降依赖于此）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Navigate,
    Search,
    Extract,
    Assemble,
    Done,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }
}

/// 工作流形态：必经阶段序列的选择依据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskShape {
    /// 取题材数据并装配文档（新闻汇总、保存到文件等）
    DocumentAssembly,
    /// 查看某站点并建一个类似的页面
    SiteReplication,
    /// 纯导航（go to X）
    Navigation,
    /// 单步对话，无阶段机
    Conversation,
}

impl TaskShape {
    /// 该形态的必经阶段序列（不含 Init / 终态）
    pub fn sequence(self) -> &'static [Phase] {
        match self {
            TaskShape::DocumentAssembly => &[Phase::Search, Phase::Extract, Phase::Assemble],
            TaskShape::SiteReplication => &[Phase::Navigate, Phase::Extract, Phase::Assemble],
            TaskShape::Navigation => &[Phase::Navigate],
            TaskShape::Conversation => &[],
        }
    }

    pub fn is_multi_step(self) -> bool {
        !matches!(self, TaskShape::Conversation)
    }
}

const NAV_WORDS: [&str; 7] = [
    "go to", "visit", "navigate to", "open", "browse to", "look at", "check out",
];
const CREATE_WORDS: [&str; 6] = ["create", "make", "build", "generate", "write", "save"];
const PAGE_WORDS: [&str; 7] = [
    "webpage", "page", "website", "html", "file", "txt", "document",
];
const TOPIC_WORDS: [&str; 5] = ["news", "headlines", "articles", "trending", "search"];
const SUMMARY_WORDS: [&str; 4] = ["summary", "summarize", "top", "give me"];
const MIMIC_WORDS: [&str; 5] = [
    "mimic", "copy the design", "similar to", "inspired by", "style of",
];

fn contains_any(lower: &str, words: &[&str]) -> bool {
    words.iter().any(|w| lower.contains(w))
}

/// 从任务描述中提取目标 URL（导航/复刻形态）
pub fn extract_target_url(description: &str) -> Option<String> {
    let re = TARGET_URL_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:https?://)?(?:[a-z0-9][a-z0-9-]*\.)+[a-z]{2,}(?:/[^\s]*)?").unwrap()
    });
    let raw = re.find(description)?.as_str();
    if raw.starts_with("http://") || raw.starts_with("https://") {
        Some(raw.to_string())
    } else {
        Some(format!("https://{}", raw))
    }
}

/// 一次性形态分类：混合「看站点 + 建页面」优先归 SiteReplication，
/// 题材 + 装配意图归 DocumentAssembly，带目标域名的导航归 Navigation，其余为对话
pub fn classify(description: &str) -> (TaskShape, Option<String>) {
    let lower = description.to_lowercase();
    let target = extract_target_url(description);

    let has_nav = contains_any(&lower, &NAV_WORDS);
    let has_create = contains_any(&lower, &CREATE_WORDS);
    let has_page = contains_any(&lower, &PAGE_WORDS);
    let has_topic = contains_any(&lower, &TOPIC_WORDS);
    let has_summary = contains_any(&lower, &SUMMARY_WORDS);
    let has_mimic = contains_any(&lower, &MIMIC_WORDS);

    if target.is_some() && ((has_nav && has_create && has_page) || (has_mimic && has_page)) {
        return (TaskShape::SiteReplication, target);
    }
    if has_topic && (has_create || has_page || has_summary) {
        return (TaskShape::DocumentAssembly, target);
    }
    if has_nav && target.is_some() {
        return (TaskShape::Navigation, target);
    }
    (TaskShape::Conversation, None)
}

/// 派生搜索查询：新闻类任务按原样提取「top N」条数，默认 10
pub fn derive_search_query(description: &str) -> String {
    let lower = description.to_lowercase();
    if lower.contains("news") || lower.contains("headlines") {
        let re = COUNT_RE.get_or_init(|| Regex::new(r"\b(\d{1,3})\b").unwrap());
        let count = re
            .captures(&lower)
            .and_then(|c| c[1].parse::<u32>().ok())
            .unwrap_or(10);
        return format!("top {} world news today", count);
    }
    description.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_document_assembly() {
        let (shape, _) = classify("save the top 5 news headlines to a txt file");
        assert_eq!(shape, TaskShape::DocumentAssembly);
        assert_eq!(
            shape.sequence(),
            &[Phase::Search, Phase::Extract, Phase::Assemble]
        );
    }

    #[test]
    fn test_classify_site_replication() {
        let (shape, target) = classify("look at github.com and build a similar webpage");
        assert_eq!(shape, TaskShape::SiteReplication);
        assert_eq!(target.as_deref(), Some("https://github.com"));
    }

    #[test]
    fn test_classify_simple_navigation() {
        let (shape, target) = classify("go to example.com");
        assert_eq!(shape, TaskShape::Navigation);
        assert_eq!(target.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn test_classify_conversation() {
        let (shape, target) = classify("what is the capital of France?");
        assert_eq!(shape, TaskShape::Conversation);
        assert!(target.is_none());
        assert!(!shape.is_multi_step());
    }

    #[test]
    fn test_phase_order_is_monotone() {
        assert!(Phase::Init < Phase::Search);
        assert!(Phase::Search < Phase::Extract);
        assert!(Phase::Extract < Phase::Assemble);
        assert!(Phase::Assemble < Phase::Done);
    }

    #[test]
    fn test_derive_search_query_news_count() {
        assert_eq!(
            derive_search_query("save top 5 news to a file"),
            "top 5 world news today"
        );
        assert_eq!(
            derive_search_query("collect news headlines"),
            "top 10 world news today"
        );
    }
}

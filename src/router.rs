//! 请求路由
//!
//! 按可配置关键词集把请求分类到专职工作者。命中冲突时优先级固定：
//! 「看站点又要建东西」的混合请求归文件工作者，带域名的导航归浏览工作者，
//! 无法归类不是错误，落到通用工作者即可。
//!
//! 会话复用策略：同类工作者 + 活的指派 + 任务未到终态 → 延续（保留记忆）；
//! 其余一律重新指派并把记忆重置回种子系统消息，防止跨任务污染。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RouterSection;
use crate::core::session::Session;
use crate::task::phase::extract_target_url;

/// 工作者类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    Browser,
    File,
    Planner,
    Code,
    General,
}

/// 一次路由产出的工作者指派
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerAssignment {
    pub session_id: Uuid,
    pub kind: WorkerKind,
}

/// 关键词路由器；关键词集来自配置，可整体覆盖
#[derive(Debug, Clone)]
pub struct Router {
    keywords: RouterSection,
}

impl Router {
    pub fn new(keywords: RouterSection) -> Self {
        Self { keywords }
    }

    fn score(text: &str, words: &[String]) -> usize {
        words.iter().filter(|w| text.contains(w.as_str())).count()
    }

    /// 分类请求到工作者类别；得分与固定优先级共同决定
    pub fn classify(&self, request: &str) -> WorkerKind {
        let lower = request.to_lowercase();
        let has_domain = extract_target_url(request).is_some();
        let nav = Self::score(&lower, &self.keywords.navigation_keywords);
        let file = Self::score(&lower, &self.keywords.file_keywords);
        let browser = Self::score(&lower, &self.keywords.browser_keywords);
        let code = Self::score(&lower, &self.keywords.code_keywords);
        let planner = Self::score(&lower, &self.keywords.planner_keywords);

        // 混合请求（导航 + 建文件/页面）最终产物是文件，归 File
        if nav > 0 && file > 0 {
            return WorkerKind::File;
        }
        if nav > 0 && has_domain {
            return WorkerKind::Browser;
        }
        if file > 0 {
            return WorkerKind::File;
        }
        if browser > 0 || has_domain {
            return WorkerKind::Browser;
        }
        if code > 0 {
            return WorkerKind::Code;
        }
        if planner > 0 {
            return WorkerKind::Planner;
        }
        WorkerKind::General
    }

    /// 路由并应用复用/重置策略；返回本次生效的指派
    pub fn route(&self, session: &mut Session, request: &str) -> WorkerAssignment {
        let kind = self.classify(request);
        let reusable = session
            .assignment
            .map(|a| a.kind == kind)
            .unwrap_or(false)
            && session
                .task
                .as_ref()
                .map(|t| !t.phase().is_terminal())
                .unwrap_or(false);
        if reusable {
            let assignment = session.assignment.unwrap_or(WorkerAssignment {
                session_id: session.id,
                kind,
            });
            tracing::debug!(session_id = %session.id, kind = ?kind, "reusing worker assignment");
            return assignment;
        }
        session.drop_finished_task();
        session.task = None;
        session.memory.reset_to_seed();
        let assignment = WorkerAssignment {
            session_id: session.id,
            kind,
        };
        session.assignment = Some(assignment);
        tracing::info!(session_id = %session.id, kind = ?kind, "fresh worker assignment");
        assignment
    }
}
